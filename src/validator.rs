// ==============================================================================
// validator.rs - Input File Validation
// ==============================================================================
// Description: Pre-flight checks on input files (existence, compression magic
//              numbers, SHA-256 provenance checksum)
// Created: 2026-09-30
// Modified: 2026-10-08
// Version: 2.0.0
// ==============================================================================

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// FLG.FEXTRA must be set and the first extra subfield must be "BC"
const BGZF_FLAG_OFFSET: usize = 3;
const BGZF_FEXTRA: u8 = 0x04;
const BGZF_SUBFIELD_OFFSET: usize = 12;
const BGZF_SUBFIELD_ID: [u8; 2] = [b'B', b'C'];
const BGZF_HEADER_LEN: usize = 18;

/// Compression detected from the leading bytes of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Blocked gzip (bgzip), can be decompressed in parallel
    Bgzf,
    /// Plain (possibly multi-member) gzip
    Gzip,
    Plain,
}

/// Fail with a descriptive message when a required input file is absent
pub fn require_file(path: &Path, label: &str) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("{} file {} does not exist", label, path.display());
    }
    if !path.is_file() {
        anyhow::bail!("{} path {} is not a file", label, path.display());
    }
    debug!("{} file found: {:?}", label, path);
    Ok(())
}

fn read_magic_number(path: &Path, len: usize) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buffer = Vec::with_capacity(len);
    file.take(len as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn verify_magic_number(expected: &[u8], actual: &[u8]) -> bool {
    expected.len() <= actual.len()
        && expected.iter().zip(actual.iter()).all(|(e, a)| e == a)
}

/// Classify a leading header block
pub fn classify_header(header: &[u8]) -> Compression {
    if !verify_magic_number(&GZIP_MAGIC, header) {
        return Compression::Plain;
    }

    let is_bgzf = header.len() >= BGZF_HEADER_LEN
        && header[BGZF_FLAG_OFFSET] & BGZF_FEXTRA != 0
        && header[BGZF_SUBFIELD_OFFSET..BGZF_SUBFIELD_OFFSET + 2] == BGZF_SUBFIELD_ID;

    if is_bgzf {
        Compression::Bgzf
    } else {
        Compression::Gzip
    }
}

/// Sniff the compression of a file from its first block header
pub fn detect_compression(path: &Path) -> io::Result<Compression> {
    let header = read_magic_number(path, BGZF_HEADER_LEN)?;
    let compression = classify_header(&header);
    debug!("Detected {:?} compression for {:?}", compression, path);
    Ok(compression)
}

/// SHA-256 of a file's raw bytes, hex encoded
pub fn compute_sha256(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
