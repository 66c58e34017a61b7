//! Core data model for sync invocations.
//!
//! This module defines:
//! - SyncConfig: the invocation parameters handed over by the automation host
//! - SyncJob: one invocation, its state and the checksums it observed
//! - SyncReport: the result record returned to the host
//! - TransferDirection, Side, SyncState, TransferOutcome: enums controlling behavior

use std::fmt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksums::{ChecksumAlgorithm, ChecksumResult};
use crate::error::SyncError;

pub const MSG_SKIPPED: &str = "File already present, skipping the scp";
pub const MSG_PUSHED: &str = "File pushed OK";
pub const MSG_RETRIEVED: &str = "File retrieved OK";

/// Direction of the copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Controller to device
    Put,
    /// Device to controller
    Get,
}

impl TransferDirection {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "put" => Some(Self::Put),
            "get" => Some(Self::Get),
            _ => None,
        }
    }

    /// The side holding the file that must already exist.
    pub fn source(&self) -> Side {
        match self {
            Self::Put => Side::Local,
            Self::Get => Side::Remote,
        }
    }

    /// The side that gets written.
    pub fn destination(&self) -> Side {
        match self {
            Self::Put => Side::Remote,
            Self::Get => Side::Local,
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Put => write!(f, "put"),
            Self::Get => write!(f, "get"),
        }
    }
}

/// Which end of the transfer a file lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local host"),
            Self::Remote => write!(f, "device"),
        }
    }
}

/// A directory plus file name, joined with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLocation {
    pub dir: String,
    pub file: String,
}

impl FileLocation {
    pub fn new(dir: impl Into<String>, file: impl Into<String>) -> Self {
        FileLocation {
            dir: dir.into(),
            file: file.into(),
        }
    }

    /// Full path as `dir + "/" + file`.
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.dir, self.file)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(self.full_path())
    }
}

/// Invocation parameters.
///
/// Field names match the arguments an automation host passes in, so a JSON
/// arguments file deserializes straight into this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Directory on the controller
    pub local_dir: String,

    /// Directory on the device
    pub remote_dir: String,

    /// File name, identical on both sides
    pub file: String,

    /// put or get
    #[serde(rename = "type")]
    pub direction: TransferDirection,

    /// Digest used on both sides
    #[serde(default)]
    pub algorithm: ChecksumAlgorithm,
}

impl SyncConfig {
    pub fn new(
        local_dir: impl Into<String>,
        remote_dir: impl Into<String>,
        file: impl Into<String>,
        direction: TransferDirection,
    ) -> Self {
        SyncConfig {
            local_dir: local_dir.into(),
            remote_dir: remote_dir.into(),
            file: file.into(),
            direction,
            algorithm: ChecksumAlgorithm::default(),
        }
    }

    pub fn local(&self) -> FileLocation {
        FileLocation::new(self.local_dir.clone(), self.file.clone())
    }

    pub fn remote(&self) -> FileLocation {
        FileLocation::new(self.remote_dir.clone(), self.file.clone())
    }

    /// Reject empty parameters and file names that escape their directory.
    pub fn validate(&self) -> Result<(), SyncError> {
        let required = [
            ("local_dir", &self.local_dir),
            ("remote_dir", &self.remote_dir),
            ("file", &self.file),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(SyncError::InvalidConfig {
                    reason: format!("{} must not be empty", name),
                });
            }
        }

        let file = Path::new(&self.file);
        if file.is_absolute() {
            return Err(SyncError::InvalidConfig {
                reason: format!("file must be a name, not an absolute path: {}", self.file),
            });
        }
        if file.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(SyncError::InvalidConfig {
                reason: format!("parent directory traversal not allowed: {}", self.file),
            });
        }
        let mut parts = file.components().filter(|c| !matches!(c, Component::CurDir));
        if !matches!((parts.next(), parts.next()), (Some(Component::Normal(_)), None)) {
            return Err(SyncError::InvalidConfig {
                reason: format!("file must be a single name without directories: {}", self.file),
            });
        }

        Ok(())
    }
}

/// Where an invocation is in the sync state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Created, nothing computed yet
    Pending,
    /// Obtaining source and destination checksums
    Comparing,
    /// Copy session open
    Transferring,
    /// Recomputing the destination checksum
    Verifying,
    /// Checksums already matched; nothing copied
    Skipped,
    /// Copied and the fresh checksum matched
    Succeeded,
    /// Aborted by an error or a post-transfer mismatch
    Failed,
}

impl SyncState {
    /// Returns true if this state is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Comparing => "comparing",
            Self::Transferring => "transferring",
            Self::Verifying => "verifying",
            Self::Skipped => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a completed comparison-and-copy ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Files already matched
    Skipped,
    /// Copied, and the destination digest equals the source digest
    TransferredAndVerified,
    /// Copied, but the fresh destination digest differs
    TransferredButMismatched { local: String, remote: String },
}

/// A single sync invocation.
#[derive(Debug)]
pub struct SyncJob {
    /// Unique identifier for this invocation
    pub id: Uuid,

    pub config: SyncConfig,

    pub state: SyncState,

    /// Last checksum observed on the controller
    pub local_checksum: Option<ChecksumResult>,

    /// Last checksum observed on the device
    pub remote_checksum: Option<ChecksumResult>,

    /// Bytes reported by the transport (0 when skipped)
    pub bytes_transferred: u64,

    /// Number of copy sessions opened; at most one per invocation
    pub transfer_attempts: u32,

    /// Set once the job reaches Skipped, Succeeded, or a post-copy mismatch
    pub outcome: Option<TransferOutcome>,

    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SyncJob {
    pub fn checksum(&self, side: Side) -> Option<&ChecksumResult> {
        match side {
            Side::Local => self.local_checksum.as_ref(),
            Side::Remote => self.remote_checksum.as_ref(),
        }
    }

    pub(crate) fn set_checksum(&mut self, side: Side, value: ChecksumResult) {
        match side {
            Side::Local => self.local_checksum = Some(value),
            Side::Remote => self.remote_checksum = Some(value),
        }
    }
}

/// Result record handed back to the automation host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// True only after a verified transfer
    pub changed: bool,

    pub failed: bool,

    pub msg: String,

    pub file: String,

    #[serde(rename = "type")]
    pub direction: TransferDirection,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_checksum: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_checksum: Option<String>,

    /// Error kind when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncReport {
    /// Build the record for a finished job.
    pub fn from_outcome(job: &SyncJob, outcome: &TransferOutcome) -> Self {
        let (changed, failed, msg) = match outcome {
            TransferOutcome::Skipped => (false, false, MSG_SKIPPED.to_string()),
            TransferOutcome::TransferredAndVerified => {
                let msg = match job.config.direction {
                    TransferDirection::Put => MSG_PUSHED,
                    TransferDirection::Get => MSG_RETRIEVED,
                };
                (true, false, msg.to_string())
            }
            TransferOutcome::TransferredButMismatched { local, remote } => {
                let err = SyncError::ChecksumMismatch {
                    local: local.clone(),
                    remote: remote.clone(),
                };
                return Self::failure(job, &err);
            }
        };

        SyncReport {
            changed,
            failed,
            msg,
            ..Self::base(job)
        }
    }

    /// Build the record for an invocation that aborted.
    pub fn failure(job: &SyncJob, err: &SyncError) -> Self {
        SyncReport {
            changed: false,
            failed: true,
            msg: err.to_string(),
            error: Some(err.kind().to_string()),
            ..Self::base(job)
        }
    }

    fn base(job: &SyncJob) -> Self {
        SyncReport {
            changed: false,
            failed: false,
            msg: String::new(),
            file: job.config.file.clone(),
            direction: job.config.direction,
            local_checksum: job.local_checksum.as_ref().map(|c| c.to_string()),
            remote_checksum: job.remote_checksum.as_ref().map(|c| c.to_string()),
            error: None,
        }
    }
}
