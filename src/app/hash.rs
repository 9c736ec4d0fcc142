//! SHA-256 digest type and file hashing
//!
//! Stores digests as raw 32-byte arrays rather than hex strings, so
//! comparisons are byte comparisons and case differences in user-supplied
//! hex never matter.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::constants::transfer::HASH_CHUNK_SIZE;
use crate::errors::HashError;

/// A SHA-256 digest stored as its raw 32-byte representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// Parse a digest from a 64-character hex string (case insensitive)
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidDigest {
                value: hex.to_string(),
            });
        }

        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| HashError::InvalidDigest {
                value: hex.to_string(),
            })?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| HashError::InvalidDigest {
                value: hex.to_string(),
            })?;
        }

        Ok(Sha256Digest(bytes))
    }

    /// Lowercase hex representation
    pub fn to_hex(&self) -> String {
        use std::fmt::Write;
        self.0.iter().fold(String::with_capacity(64), |mut acc, b| {
            write!(&mut acc, "{:02x}", b).expect("writing to a String cannot fail");
            acc
        })
    }

    /// The raw byte array
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Construct from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Sha256Digest(bytes)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Sha256Digest {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Compute the SHA-256 of a file, streaming it in 1 MiB chunks
pub async fn hash_file(path: &Path) -> std::io::Result<Sha256Digest> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(Sha256Digest::from_bytes(hasher.finalize().into()))
}

/// Compare a file's SHA-256 against an expected digest
pub async fn verify_file(path: &Path, expected: &Sha256Digest) -> std::io::Result<bool> {
    Ok(hash_file(path).await? == *expected)
}
