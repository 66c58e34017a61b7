//! Checksum computation on both ends of a transfer.
//!
//! This module provides:
//! - The digest algorithms a device checksum command supports (MD5, SHA-256)
//! - Streaming file digests for the controller side
//! - Direction-aware checksum lookup that maps a missing destination to `Absent`

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::device::ConnectedDevice;
use crate::error::{RemoteError, SyncError};
use crate::model::{Side, TransferDirection};

/// Read block size for streaming digests.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    /// MD5, what devices compute by default
    #[default]
    Md5,
    /// SHA-256
    Sha256,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

impl ChecksumAlgorithm {
    /// Parse algorithm from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha256" | "sha-256" => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Length of the hex encoding of a digest.
    pub fn hex_len(&self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha256 => 64,
        }
    }
}

/// A computed digest value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl Digest {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        Digest { algorithm, hex }
    }

    /// Parse a digest reported by a device.
    ///
    /// Surrounding whitespace is dropped and the hex is lowercased. Returns
    /// `None` unless the text is exactly one digest of the expected length.
    pub fn parse(algorithm: ChecksumAlgorithm, text: &str) -> Option<Self> {
        let hex = text.trim().to_ascii_lowercase();
        let well_formed =
            hex.len() == algorithm.hex_len() && hex.chars().all(|c| c.is_ascii_hexdigit());
        well_formed.then(|| Digest { algorithm, hex })
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex)
    }
}

/// Checksum of one side of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumResult {
    Digest(Digest),
    /// The file does not exist yet
    Absent,
}

impl ChecksumResult {
    /// True only when both sides hold the same digest. `Absent` never matches.
    pub fn matches(&self, other: &ChecksumResult) -> bool {
        match (self, other) {
            (Self::Digest(a), Self::Digest(b)) => a.hex() == b.hex(),
            _ => false,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Digest(d) => Some(d),
            Self::Absent => None,
        }
    }
}

impl fmt::Display for ChecksumResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digest(d) => fmt::Display::fmt(d, f),
            Self::Absent => f.write_str("absent"),
        }
    }
}

/// Trait for computing checksums
pub trait ChecksumHasher {
    /// Update the hasher with new data
    fn update(&mut self, data: &[u8]);

    /// Finalize and return the digest
    fn finalize(self: Box<Self>) -> Digest;
}

/// MD5 hasher (backed by md5 crate)
struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> Digest {
        let digest = self.context.compute();
        Digest::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

/// SHA-256 hasher (backed by sha2 crate)
struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest as _;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> Digest {
        use sha2::Digest as _;
        let digest = self.hasher.finalize();
        Digest::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
    }
}

/// Stream a reader through the hasher in `BLOCK_SIZE` blocks.
pub fn digest_reader<R: Read>(mut reader: R, algorithm: ChecksumAlgorithm) -> io::Result<Digest> {
    let mut hasher = create_hasher(algorithm);
    let mut buffer = vec![0u8; BLOCK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}

/// Compute the digest of a file on disk.
pub fn compute_file_checksum(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<Digest> {
    let file = File::open(path)?;
    digest_reader(file, algorithm)
}

/// Checksum of the controller-side file.
///
/// A missing file is `Absent` only when it is the destination (direction
/// Get). For Put the local file is the source and must exist.
pub fn local_checksum(
    path: &Path,
    direction: TransferDirection,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumResult, SyncError> {
    match compute_file_checksum(path, algorithm) {
        Ok(digest) => {
            info!(path = %path.display(), "local hash calculated");
            Ok(ChecksumResult::Digest(digest))
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "unable to get the local hash");
            if e.kind() != io::ErrorKind::NotFound {
                return Err(SyncError::LocalIo {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
            match direction {
                TransferDirection::Get => Ok(ChecksumResult::Absent),
                TransferDirection::Put => Err(SyncError::SourceMissing {
                    side: Side::Local,
                    path: path.display().to_string(),
                }),
            }
        }
    }
}

/// Checksum of the device-side file.
///
/// `RemoteError::NotFound` becomes `Absent` only when the device is the
/// destination (direction Put). Every other failure aborts the sync.
pub fn remote_checksum(
    device: &dyn ConnectedDevice,
    path: &str,
    direction: TransferDirection,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumResult, SyncError> {
    match device.file_checksum(path, algorithm) {
        Ok(digest) => {
            info!(path, "checksum reply received");
            Ok(ChecksumResult::Digest(digest))
        }
        Err(e) => {
            error!(path, error = %e, "unable to get the remote checksum");
            match (e, direction) {
                (RemoteError::NotFound { .. }, TransferDirection::Put) => Ok(ChecksumResult::Absent),
                (RemoteError::NotFound { path }, TransferDirection::Get) => {
                    Err(SyncError::SourceMissing {
                        side: Side::Remote,
                        path,
                    })
                }
                (other, _) => Err(SyncError::RemoteOperation(other)),
            }
        }
    }
}
