//! PKCS#7 / CMS probe for `.p7m` files.
//!
//! A file is a valid container when it starts with one DER `ContentInfo`: a
//! SEQUENCE holding a content-type OID and an optional `[0] EXPLICIT`
//! content. Any OID is accepted (unknown types carry opaque content), and bytes
//! after the first object are ignored. Signatures are not verified.

use std::fs;
use std::io;
use std::path::Path;

use der::asn1::{Any, ObjectIdentifier};
use der::{Decode, Sequence, SliceReader};

use super::{ContainerProbe, Inspection};

const DER_SEQUENCE: u8 = 0x30;

#[derive(Sequence)]
#[allow(dead_code)]
struct ContentInfo {
    content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    content: Option<Any>,
}

/// DER-decoding PKCS#7 probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct P7mProbe;

impl ContainerProbe for P7mProbe {
    fn inspect(&self, path: &Path) -> io::Result<Inspection> {
        let bytes = fs::read(path)?;
        Ok(inspect_bytes(&bytes))
    }
}

/// Inspect raw DER bytes.
pub fn inspect_bytes(bytes: &[u8]) -> Inspection {
    if bytes.first() != Some(&DER_SEQUENCE) {
        return Inspection::WrongType;
    }
    // One leading object; whatever follows it is not our concern.
    let decoded =
        SliceReader::new(bytes).and_then(|mut reader| ContentInfo::decode(&mut reader));
    match decoded {
        Ok(_) => Inspection::ValidContainer,
        Err(e) => Inspection::Corrupt(e.to_string()),
    }
}
