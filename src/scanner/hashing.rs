// src/scanner/hashing.rs
//
// Content hashes for library files
//
// - oshash: file size plus the head and tail chunks summed as u64 words
// - checksum: SHA-256 of the whole file

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{AppError, AppResult};

/// Bytes read from each end of the file
const CHUNK_SIZE: u64 = 64 * 1024;

/// Size-and-ends hash, 16 lowercase hex characters
///
/// Files shorter than one chunk hash their whole contents twice.
pub fn oshash(path: &Path) -> AppResult<String> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    if size == 0 {
        return Err(AppError::Other(format!(
            "Cannot compute oshash of empty file {}",
            path.display()
        )));
    }

    let chunk = CHUNK_SIZE.min(size);
    let mut head = vec![0u8; chunk as usize];
    file.read_exact(&mut head)?;

    let mut tail = vec![0u8; chunk as usize];
    file.seek(SeekFrom::Start(size - chunk))?;
    file.read_exact(&mut tail)?;

    Ok(oshash_of(size, &head, &tail))
}

fn oshash_of(size: u64, head: &[u8], tail: &[u8]) -> String {
    let sum = [head, tail]
        .iter()
        .flat_map(|buf| buf.chunks_exact(8))
        .map(|word| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(word);
            u64::from_le_bytes(bytes)
        })
        .fold(size, u64::wrapping_add);

    format!("{:016x}", sum)
}

/// SHA-256 of the file contents, lowercase hex
pub fn sha256(path: &Path) -> AppResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
