//! RAR probe: walks the block headers of RAR 1.5–4.x and RAR 5.0 archives.
//!
//! No decompression happens here. Encryption and multi-volume position are
//! both announced in headers, so a header walk answers everything the sweep
//! asks: encrypted headers, encrypted file entries, and "this is not the
//! first volume". CRCs are not verified; a structure that cannot be walked
//! is reported as [`Inspection::Corrupt`].

#![allow(missing_docs)]

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use super::{ContainerProbe, Inspection};

pub const RAR4_SIGNATURE: [u8; 7] = *b"Rar!\x1a\x07\x00";
pub const RAR5_SIGNATURE: [u8; 8] = *b"Rar!\x1a\x07\x01\x00";

// RAR 4 block types.
const R4_MAIN: u8 = 0x73;
const R4_FILE: u8 = 0x74;
const R4_END: u8 = 0x7B;

// RAR 4 main header flags.
const MHD_VOLUME: u16 = 0x0001;
const MHD_NEWNUMBERING: u16 = 0x0010;
const MHD_PASSWORD: u16 = 0x0080;
const MHD_FIRSTVOLUME: u16 = 0x0100;

// RAR 4 file header flags.
const LHD_SPLIT_BEFORE: u16 = 0x0001;
const LHD_PASSWORD: u16 = 0x0004;
const LHD_LARGE: u16 = 0x0100;
const LONG_BLOCK: u16 = 0x8000;

const R4_BASE_HEADER: usize = 7;
const R4_FILE_FIXED: usize = 25;

// RAR 5 header types.
const R5_MAIN: u64 = 1;
const R5_FILE: u64 = 2;
const R5_ENCRYPTION: u64 = 4;
const R5_END: u64 = 5;

// RAR 5 common header flags.
const HFL_EXTRA: u64 = 0x0001;
const HFL_DATA: u64 = 0x0002;
const HFL_SPLIT_BEFORE: u64 = 0x0008;

// RAR 5 main archive flags.
const MHFL_VOLNUMBER: u64 = 0x0002;

const R5_EXTRA_CRYPT: u64 = 0x01;
const R5_MAX_HEADER: u64 = 2 * 1024 * 1024;

/// Header-walking RAR probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct RarProbe;

impl ContainerProbe for RarProbe {
    fn inspect(&self, path: &Path) -> io::Result<Inspection> {
        let file = File::open(path)?;
        inspect_reader(BufReader::new(file))
    }
}

/// Inspect a RAR stream of either generation.
pub fn inspect_reader<R: Read + Seek>(mut reader: R) -> io::Result<Inspection> {
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut signature = [0u8; 8];
    let read = read_up_to(&mut reader, &mut signature)?;

    let walked = if read == RAR5_SIGNATURE.len() && signature == RAR5_SIGNATURE {
        walk_rar5(&mut reader, len)
    } else if read >= RAR4_SIGNATURE.len() && signature[..7] == RAR4_SIGNATURE {
        walk_rar4(&mut reader, len)
    } else {
        return Ok(Inspection::WrongType);
    };

    match walked {
        Err(e) if matches!(e.kind(), ErrorKind::UnexpectedEof | ErrorKind::InvalidData) => {
            Ok(Inspection::Corrupt(e.to_string()))
        }
        other => other,
    }
}

// ──────────────────── RAR 1.5 – 4.x ────────────────────

fn walk_rar4<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<Inspection> {
    let mut pos = RAR4_SIGNATURE.len() as u64;

    // Archives written without an end block simply stop at EOF.
    while pos < len {
        reader.seek(SeekFrom::Start(pos))?;
        let mut base = [0u8; R4_BASE_HEADER];
        reader.read_exact(&mut base)?;
        let head_type = base[2];
        let flags = u16::from_le_bytes([base[3], base[4]]);
        let head_size = u16::from_le_bytes([base[5], base[6]]);
        if usize::from(head_size) < R4_BASE_HEADER {
            return Err(invalid("block header shorter than its base fields"));
        }
        let mut body = vec![0u8; usize::from(head_size) - R4_BASE_HEADER];
        reader.read_exact(&mut body)?;

        let mut data_size = 0u64;
        match head_type {
            R4_MAIN => {
                if flags & MHD_PASSWORD != 0 {
                    return Ok(Inspection::PasswordRequired);
                }
                let volume = flags & MHD_VOLUME != 0;
                if volume && flags & MHD_NEWNUMBERING != 0 && flags & MHD_FIRSTVOLUME == 0 {
                    return Ok(Inspection::NeedFirstVolume);
                }
            }
            R4_FILE => {
                if body.len() < R4_FILE_FIXED {
                    return Err(invalid("file header truncated"));
                }
                if flags & LHD_SPLIT_BEFORE != 0 {
                    return Ok(Inspection::NeedFirstVolume);
                }
                if flags & LHD_PASSWORD != 0 {
                    return Ok(Inspection::PasswordRequired);
                }
                data_size = u64::from(le_u32(&body[0..4]));
                if flags & LHD_LARGE != 0 {
                    let high = body
                        .get(R4_FILE_FIXED..R4_FILE_FIXED + 4)
                        .ok_or_else(|| invalid("large file header truncated"))?;
                    data_size |= u64::from(le_u32(high)) << 32;
                }
            }
            R4_END => return Ok(Inspection::Unprotected),
            _ => {
                if flags & LONG_BLOCK != 0 {
                    let add = body
                        .get(0..4)
                        .ok_or_else(|| invalid("long block without size"))?;
                    data_size = u64::from(le_u32(add));
                }
            }
        }

        pos = pos
            .checked_add(u64::from(head_size))
            .and_then(|p| p.checked_add(data_size))
            .ok_or_else(|| invalid("block offset overflow"))?;
    }

    Ok(Inspection::Unprotected)
}

// ──────────────────── RAR 5.0 ────────────────────

fn walk_rar5<R: Read + Seek>(reader: &mut R, len: u64) -> io::Result<Inspection> {
    let mut pos = RAR5_SIGNATURE.len() as u64;

    while pos < len {
        reader.seek(SeekFrom::Start(pos))?;
        let mut crc = [0u8; 4];
        reader.read_exact(&mut crc)?;
        let (header_size, size_len) = read_vint(reader)?;
        if header_size == 0 || header_size > R5_MAX_HEADER {
            return Err(invalid("header size out of range"));
        }
        let mut header = vec![0u8; usize::try_from(header_size).map_err(|_| invalid("header size"))?];
        reader.read_exact(&mut header)?;

        let mut fields = Fields::new(&header);
        let head_type = fields.vint()?;
        let flags = fields.vint()?;
        let extra_size = if flags & HFL_EXTRA != 0 { fields.vint()? } else { 0 };
        let data_size = if flags & HFL_DATA != 0 { fields.vint()? } else { 0 };

        match head_type {
            R5_MAIN => {
                let archive_flags = fields.vint()?;
                if archive_flags & MHFL_VOLNUMBER != 0 {
                    return Ok(Inspection::NeedFirstVolume);
                }
            }
            R5_ENCRYPTION => return Ok(Inspection::PasswordRequired),
            R5_FILE => {
                if flags & HFL_SPLIT_BEFORE != 0 {
                    return Ok(Inspection::NeedFirstVolume);
                }
                if file_is_encrypted(&header, extra_size)? {
                    return Ok(Inspection::PasswordRequired);
                }
            }
            R5_END => return Ok(Inspection::Unprotected),
            _ => {}
        }

        pos = pos
            .checked_add(4 + size_len as u64)
            .and_then(|p| p.checked_add(header_size))
            .and_then(|p| p.checked_add(data_size))
            .ok_or_else(|| invalid("header offset overflow"))?;
    }

    Ok(Inspection::Unprotected)
}

/// The extra area sits at the tail of the header; look for a crypt record.
fn file_is_encrypted(header: &[u8], extra_size: u64) -> io::Result<bool> {
    let extra_len = usize::try_from(extra_size).map_err(|_| invalid("extra area size"))?;
    let start = header
        .len()
        .checked_sub(extra_len)
        .ok_or_else(|| invalid("extra area larger than header"))?;

    let mut records = Fields::new(&header[start..]);
    while !records.is_empty() {
        let record_size = records.vint()?;
        let record_start = records.pos;
        let record_type = records.vint()?;
        if record_type == R5_EXTRA_CRYPT {
            return Ok(true);
        }
        let consumed = (records.pos - record_start) as u64;
        let rest = record_size
            .checked_sub(consumed)
            .ok_or_else(|| invalid("extra record shorter than its type"))?;
        records.skip(rest)?;
    }
    Ok(false)
}

struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn vint(&mut self) -> io::Result<u64> {
        let (value, used) = decode_vint(&self.buf[self.pos.min(self.buf.len())..])?;
        self.pos += used;
        Ok(value)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let n = usize::try_from(n).map_err(|_| invalid("skip length"))?;
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| invalid("field runs past header end"))?;
        self.pos = end;
        Ok(())
    }
}

/// RAR 5 variable-length integer: 7 bits per byte, high bit continues.
fn decode_vint(bytes: &[u8]) -> io::Result<(u64, usize)> {
    let mut value = 0u64;
    for (i, byte) in bytes.iter().take(10).enumerate() {
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(invalid("unterminated vint"))
}

fn read_vint<R: Read>(reader: &mut R) -> io::Result<(u64, usize)> {
    let mut value = 0u64;
    for i in 0..10 {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        value |= u64::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(invalid("unterminated vint"))
}

// ──────────────────── helpers ────────────────────

fn le_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // ── RAR 4 fixture builders ──

    fn r4_block(head_type: u8, flags: u16, body: &[u8]) -> Vec<u8> {
        let size = u16::try_from(R4_BASE_HEADER + body.len()).unwrap();
        let mut out = vec![0, 0, head_type];
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    fn r4_main(flags: u16) -> Vec<u8> {
        r4_block(R4_MAIN, flags, &[0u8; 6])
    }

    fn r4_file(flags: u16, name: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&u32::try_from(data.len()).unwrap().to_le_bytes());
        body.extend_from_slice(&u32::try_from(data.len()).unwrap().to_le_bytes());
        body.push(3); // host OS: unix
        body.extend_from_slice(&[0u8; 4]); // file crc
        body.extend_from_slice(&[0u8; 4]); // ftime
        body.push(29); // unpack version
        body.push(0x30); // method: store
        body.extend_from_slice(&u16::try_from(name.len()).unwrap().to_le_bytes());
        body.extend_from_slice(&[0u8; 4]); // attributes
        body.extend_from_slice(name.as_bytes());
        let mut out = r4_block(R4_FILE, flags | LONG_BLOCK, &body);
        out.extend_from_slice(data);
        out
    }

    fn r4_archive(blocks: &[Vec<u8>]) -> Vec<u8> {
        let mut out = RAR4_SIGNATURE.to_vec();
        for block in blocks {
            out.extend_from_slice(block);
        }
        out
    }

    fn r4_end() -> Vec<u8> {
        r4_block(R4_END, 0x4000, &[])
    }

    fn inspect(bytes: Vec<u8>) -> Inspection {
        inspect_reader(Cursor::new(bytes)).unwrap()
    }

    #[test]
    fn rar4_plain_archive_is_unprotected() {
        let bytes = r4_archive(&[
            r4_main(0),
            r4_file(0, "a.txt", b"hello"),
            r4_file(0, "b.txt", b"world!"),
            r4_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::Unprotected);
    }

    #[test]
    fn rar4_without_end_block_is_unprotected() {
        let bytes = r4_archive(&[r4_main(0), r4_file(0, "a.txt", b"hello")]);
        assert_eq!(inspect(bytes), Inspection::Unprotected);
    }

    #[test]
    fn rar4_encrypted_entry_needs_password() {
        let bytes = r4_archive(&[
            r4_main(0),
            r4_file(0, "a.txt", b"hello"),
            r4_file(LHD_PASSWORD, "secret.txt", b"xxxxxxxx"),
            r4_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::PasswordRequired);
    }

    #[test]
    fn rar4_encrypted_headers_need_password() {
        let mut bytes = r4_archive(&[r4_main(MHD_PASSWORD)]);
        bytes.extend_from_slice(&[0xA5; 64]);
        assert_eq!(inspect(bytes), Inspection::PasswordRequired);
    }

    #[test]
    fn rar4_later_volume_needs_first_volume() {
        let flags = MHD_VOLUME | MHD_NEWNUMBERING;
        let bytes = r4_archive(&[r4_main(flags), r4_file(0, "a.txt", b"hello"), r4_end()]);
        assert_eq!(inspect(bytes), Inspection::NeedFirstVolume);
    }

    #[test]
    fn rar4_first_volume_is_inspected_normally() {
        let flags = MHD_VOLUME | MHD_NEWNUMBERING | MHD_FIRSTVOLUME;
        let bytes = r4_archive(&[r4_main(flags), r4_file(0, "a.txt", b"hello"), r4_end()]);
        assert_eq!(inspect(bytes), Inspection::Unprotected);
    }

    #[test]
    fn rar4_continued_entry_needs_first_volume() {
        let bytes = r4_archive(&[
            r4_main(MHD_VOLUME),
            r4_file(LHD_SPLIT_BEFORE, "big.bin", b"tail"),
            r4_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::NeedFirstVolume);
    }

    #[test]
    fn rar4_truncated_data_is_corrupt() {
        let mut bytes = r4_archive(&[r4_main(0), r4_file(0, "a.txt", b"hello")]);
        // Cut into the middle of the file header.
        bytes.truncate(RAR4_SIGNATURE.len() + 13 + 10);
        assert!(matches!(inspect(bytes), Inspection::Corrupt(_)));
    }

    #[test]
    fn rar4_undersized_header_is_corrupt() {
        let mut bytes = RAR4_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0, 0, R4_MAIN, 0, 0, 3, 0]);
        assert!(matches!(inspect(bytes), Inspection::Corrupt(_)));
    }

    // ── RAR 5 fixture builders ──

    fn vint(mut value: u64) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                out.push(byte);
                return out;
            }
            out.push(byte | 0x80);
        }
    }

    fn r5_header(head_type: u64, flags: u64, body: &[u8], extra: &[u8], data: &[u8]) -> Vec<u8> {
        let mut flags = flags;
        if !extra.is_empty() {
            flags |= HFL_EXTRA;
        }
        if !data.is_empty() {
            flags |= HFL_DATA;
        }
        let mut fields = vint(head_type);
        fields.extend(vint(flags));
        if !extra.is_empty() {
            fields.extend(vint(extra.len() as u64));
        }
        if !data.is_empty() {
            fields.extend(vint(data.len() as u64));
        }
        fields.extend_from_slice(body);
        fields.extend_from_slice(extra);

        let mut out = vec![0u8; 4];
        out.extend(vint(fields.len() as u64));
        out.extend(fields);
        out.extend_from_slice(data);
        out
    }

    fn r5_main(archive_flags: u64) -> Vec<u8> {
        let mut body = vint(archive_flags);
        if archive_flags & MHFL_VOLNUMBER != 0 {
            body.extend(vint(1));
        }
        r5_header(R5_MAIN, 0, &body, &[], &[])
    }

    fn r5_file(flags: u64, name: &str, extra: &[u8], data: &[u8]) -> Vec<u8> {
        let mut body = vint(0); // file flags
        body.extend(vint(data.len() as u64));
        body.extend(vint(0)); // attributes
        body.extend(vint(0)); // compression info
        body.extend(vint(1)); // host OS
        body.extend(vint(name.len() as u64));
        body.extend_from_slice(name.as_bytes());
        r5_header(R5_FILE, flags, &body, extra, data)
    }

    fn r5_archive(headers: &[Vec<u8>]) -> Vec<u8> {
        let mut out = RAR5_SIGNATURE.to_vec();
        for header in headers {
            out.extend_from_slice(header);
        }
        out
    }

    fn r5_end() -> Vec<u8> {
        r5_header(R5_END, 0, &vint(0), &[], &[])
    }

    fn crypt_record() -> Vec<u8> {
        let mut record = vint(R5_EXTRA_CRYPT);
        record.extend([0u8, 0, 0x0F]);
        record.extend([0u8; 32]);
        let mut out = vint(record.len() as u64);
        out.extend(record);
        out
    }

    #[test]
    fn rar5_plain_archive_is_unprotected() {
        let bytes = r5_archive(&[
            r5_main(0),
            r5_file(0, "a.txt", &[], b"hello"),
            r5_file(0, "b.txt", &[], b"world"),
            r5_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::Unprotected);
    }

    #[test]
    fn rar5_encrypted_entry_needs_password() {
        let bytes = r5_archive(&[
            r5_main(0),
            r5_file(0, "secret.txt", &crypt_record(), b"ciphertext"),
            r5_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::PasswordRequired);
    }

    #[test]
    fn rar5_unrelated_extra_record_is_not_encryption() {
        // Record type 0x03 (file time) carrying a 4-byte payload.
        let mut record = vint(0x03);
        record.extend([0x02, 0, 0, 0, 0]);
        let mut extra = vint(record.len() as u64);
        extra.extend(record);
        let bytes = r5_archive(&[r5_main(0), r5_file(0, "a.txt", &extra, b"x"), r5_end()]);
        assert_eq!(inspect(bytes), Inspection::Unprotected);
    }

    #[test]
    fn rar5_encryption_header_needs_password() {
        let mut bytes = RAR5_SIGNATURE.to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 0, 0x15, 0x04, 0x00, 0x00, 0x00, 0x0F]);
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(inspect(bytes), Inspection::PasswordRequired);
    }

    #[test]
    fn rar5_later_volume_needs_first_volume() {
        let bytes = r5_archive(&[
            r5_main(0x0001 | MHFL_VOLNUMBER),
            r5_file(0, "a.txt", &[], b"hello"),
            r5_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::NeedFirstVolume);
    }

    #[test]
    fn rar5_continued_entry_needs_first_volume() {
        let bytes = r5_archive(&[
            r5_main(0x0001),
            r5_file(HFL_SPLIT_BEFORE, "big.bin", &[], b"tail"),
            r5_end(),
        ]);
        assert_eq!(inspect(bytes), Inspection::NeedFirstVolume);
    }

    #[test]
    fn rar5_truncated_header_is_corrupt() {
        let mut bytes = r5_archive(&[r5_main(0), r5_file(0, "a.txt", &[], b"hello")]);
        let main_len = r5_main(0).len();
        bytes.truncate(RAR5_SIGNATURE.len() + main_len + 8);
        assert!(matches!(inspect(bytes), Inspection::Corrupt(_)));
    }

    #[test]
    fn non_rar_is_wrong_type() {
        assert_eq!(inspect(b"PK\x03\x04 not a rar".to_vec()), Inspection::WrongType);
        assert_eq!(inspect(Vec::new()), Inspection::WrongType);
        assert_eq!(inspect(b"Rar!".to_vec()), Inspection::WrongType);
    }

    #[test]
    fn vint_decoding() {
        assert_eq!(decode_vint(&[0x05]).unwrap(), (5, 1));
        assert_eq!(decode_vint(&[0x80 | 0x15, 0x01]).unwrap(), (0x95, 2));
        assert!(decode_vint(&[0x80, 0x80]).is_err());
        assert!(decode_vint(&[]).is_err());
    }

    #[test]
    fn probe_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("set.rar");
        std::fs::write(&path, r4_archive(&[r4_main(0), r4_end()])).unwrap();
        assert_eq!(RarProbe.inspect(&path).unwrap(), Inspection::Unprotected);
        assert_eq!(
            RarProbe.inspect(&dir.path().join("gone.rar")).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
