//! File fingerprints (SHA-256 + MD5) computed in a single streaming pass

use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::types::FileHashes;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
#[error("Failed to hash {}: {source}", path.display())]
pub struct HashError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Hash a file from disk without loading it whole.
pub fn compute_file_hashes(path: &Path) -> Result<FileHashes, HashError> {
    hash_reader(path).map_err(|source| HashError {
        path: path.to_path_buf(),
        source,
    })
}

fn hash_reader(path: &Path) -> std::io::Result<FileHashes> {
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
    let mut sha256 = Sha256::new();
    let mut md5 = Md5::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sha256.update(&buf[..n]);
        md5.update(&buf[..n]);
    }

    Ok(FileHashes {
        sha256: hex::encode(sha256.finalize()),
        md5: hex::encode(md5.finalize()),
    })
}

/// Hash arbitrary bytes (used when synthesizing demo fingerprints)
pub fn hash_bytes(data: &[u8]) -> FileHashes {
    FileHashes {
        sha256: hex::encode(Sha256::digest(data)),
        md5: hex::encode(Md5::digest(data)),
    }
}
