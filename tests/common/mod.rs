#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Run the `dsw` binary with `home` as `$HOME`, so no user config or
/// journal outside the test directory is touched.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("dsw-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = PathBuf::from(env!("CARGO_BIN_EXE_dsw"));

    let output = Command::new(&bin_path)
        .args(args)
        .env("HOME", home)
        .env("RUST_BACKTRACE", "1")
        .env_remove("DSW_OUTPUT_FORMAT")
        .output()
        .expect("execute dsw command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push_str("\n----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── fixtures ────────────────────

/// A readable, unencrypted zip with one stored entry.
pub fn write_plain_zip(path: &Path) {
    let file = fs::File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("readme.txt", zip::write::SimpleFileOptions::default())
        .expect("start zip entry");
    writer.write_all(b"nothing secret here").expect("write zip entry");
    writer.finish().expect("finish zip");
}

fn rar4_block(head_type: u8, flags: u16, body: &[u8]) -> Vec<u8> {
    let size = u16::try_from(7 + body.len()).expect("small block");
    let mut out = vec![0, 0, head_type];
    out.extend_from_slice(&flags.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(body);
    out
}

fn rar4_file(encrypted: bool, name: &str, data: &[u8]) -> Vec<u8> {
    let len = u32::try_from(data.len()).expect("small entry");
    let mut body = Vec::new();
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(&len.to_le_bytes());
    body.push(3);
    body.extend_from_slice(&[0u8; 8]);
    body.push(29);
    body.push(0x30);
    body.extend_from_slice(&u16::try_from(name.len()).expect("short name").to_le_bytes());
    body.extend_from_slice(&[0u8; 4]);
    body.extend_from_slice(name.as_bytes());
    let flags = if encrypted { 0x8004 } else { 0x8000 };
    let mut out = rar4_block(0x74, flags, &body);
    out.extend_from_slice(data);
    out
}

/// A RAR 4 archive whose single entry is marked as encrypted.
pub fn write_protected_rar(path: &Path) {
    write_rar(path, true);
}

/// A RAR 4 archive with one plain stored entry.
pub fn write_plain_rar(path: &Path) {
    write_rar(path, false);
}

/// One volume of a new-style numbered set (`name.partN.rar`).
pub fn write_rar_volume(path: &Path, first: bool, encrypted: bool) {
    let main_flags = if first { 0x0111 } else { 0x0011 };
    write_rar_with_main(path, main_flags, encrypted);
}

fn write_rar(path: &Path, encrypted: bool) {
    write_rar_with_main(path, 0, encrypted);
}

fn write_rar_with_main(path: &Path, main_flags: u16, encrypted: bool) {
    let mut bytes = b"Rar!\x1a\x07\x00".to_vec();
    bytes.extend(rar4_block(0x73, main_flags, &[0u8; 6]));
    bytes.extend(rar4_file(encrypted, "payload.bin", b"0123456789abcdef"));
    bytes.extend(rar4_block(0x7B, 0x4000, &[]));
    fs::write(path, bytes).expect("write rar");
}

/// An AES-256 encrypted 7z holding one file.
pub fn write_encrypted_7z(path: &Path) {
    let staging = tempfile::tempdir().expect("staging dir");
    fs::write(staging.path().join("contract.pdf"), "signed terms").expect("write payload");
    sevenz_rust::compress_to_path_encrypted(
        staging.path(),
        path,
        sevenz_rust::Password::from("hunter2"),
    )
    .expect("write encrypted 7z");
}
