//! Content checksums reported after a patch.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use thiserror::Error;

/// Byte offset of the header JSON length (u32 LE) in an asar archive.
const HEADER_LEN_OFFSET: usize = 12;
const HEADER_JSON_OFFSET: usize = 16;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("archive too short for an asar header ({len} bytes)")]
    Truncated { len: usize },

    #[error("asar header is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Stream a file through sha256 in 1 MiB chunks.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// sha256 of the asar header JSON, the value Electron's asar integrity
/// check pins.
pub fn asar_header_sha256(path: &Path) -> Result<String, HeaderError> {
    let blob = std::fs::read(path)?;
    let header = header_json(&blob)?;
    serde_json::from_slice::<serde_json::Value>(header)?;
    Ok(sha256_hex(header))
}

fn header_json(blob: &[u8]) -> Result<&[u8], HeaderError> {
    let truncated = || HeaderError::Truncated { len: blob.len() };
    let len_bytes: [u8; 4] = blob
        .get(HEADER_LEN_OFFSET..HEADER_JSON_OFFSET)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(truncated)?;
    let json_len = u32::from_le_bytes(len_bytes) as usize;
    blob.get(HEADER_JSON_OFFSET..HEADER_JSON_OFFSET + json_len)
        .ok_or_else(truncated)
}
