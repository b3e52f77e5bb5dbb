//! Content fingerprints: fixed-length digests of a file's full byte content

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;

use crate::error::{Result, SyncError};

/// Hash algorithms supported for fingerprinting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Blake3 hash (faster)
    #[default]
    Blake3,
    /// SHA-256 hash
    Sha256,
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blake3 => f.write_str("blake3"),
            Self::Sha256 => f.write_str("sha256"),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blake3" => Ok(Self::Blake3),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(format!("unknown hash algorithm '{}' (expected blake3 or sha256)", other)),
        }
    }
}

/// Hex digest identifying a file's content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(digest: &str) -> Self {
        Self(digest.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(digest: String) -> Self {
        Self(digest)
    }
}

/// Computes fingerprints with a configured algorithm
#[derive(Debug, Clone)]
pub struct ContentFingerprinter {
    algorithm: HashAlgorithm,
    buffer_size: usize,
}

impl Default for ContentFingerprinter {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl ContentFingerprinter {
    /// Create a fingerprinter with the default 64KB read buffer
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self::with_buffer_size(algorithm, 64 * 1024)
    }

    /// Create a fingerprinter with a custom read buffer size
    pub fn with_buffer_size(algorithm: HashAlgorithm, buffer_size: usize) -> Self {
        Self {
            algorithm,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Fingerprint an in-memory byte sequence
    pub fn fingerprint_bytes(&self, content: &[u8]) -> Fingerprint {
        let mut hasher = StreamHasher::new(self.algorithm);
        hasher.update(content);
        hasher.finish()
    }

    /// Digest of empty content, used for directory entries
    pub fn empty(&self) -> Fingerprint {
        self.fingerprint_bytes(&[])
    }

    /// Fingerprint a file by streaming its content.
    ///
    /// A file that vanished after it was listed hashes as empty content;
    /// the next listing will no longer contain it.
    pub async fn fingerprint_file<P: AsRef<Path>>(&self, path: P) -> Result<Fingerprint> {
        let path = path.as_ref();

        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("'{}' vanished before it could be read, hashing as empty", path.display());
                return Ok(self.empty());
            }
            Err(e) => {
                return Err(SyncError::hash_error(path, format!("Failed to open file: {}", e)));
            }
        };

        let mut hasher = StreamHasher::new(self.algorithm);
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let bytes_read = match file.read(&mut buffer).await {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("'{}' vanished while being read, hashing as empty", path.display());
                    return Ok(self.empty());
                }
                Err(e) => {
                    return Err(SyncError::hash_error(path, format!("Failed to read file: {}", e)));
                }
            };

            if bytes_read == 0 {
                break;
            }

            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finish())
    }
}

enum StreamHasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(bytes),
            Self::Blake3(hasher) => {
                hasher.update(bytes);
            }
        }
    }

    fn finish(self) -> Fingerprint {
        match self {
            Self::Sha256(hasher) => Fingerprint(format!("{:x}", hasher.finalize())),
            Self::Blake3(hasher) => Fingerprint(hasher.finalize().to_hex().to_string()),
        }
    }
}
