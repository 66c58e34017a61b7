//! Error types for the sync engine.
//!
//! `SyncError` is the invocation-level error: any value of it terminates the
//! sync and is reported as a failed result. `RemoteError` is what device
//! adapters return; the engine only ever inspects its variant, never its text.

use std::io;
use std::path::PathBuf;

use crate::model::{Side, SyncState};

/// Errors raised by a device adapter (checksum RPC or transport).
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The device reports that the path does not exist
    #[error("no such file on device: {path}")]
    NotFound { path: String },

    /// The checksum command or RPC failed for another reason
    #[error("device rpc failed: {message}")]
    Rpc { message: String },

    /// The device answered but the digest could not be parsed
    #[error("malformed checksum reply: {reply:?}")]
    MalformedReply { reply: String },

    /// The copy session failed to open, copy, or close
    #[error("transport failed: {message}")]
    Transport { message: String },

    /// Local I/O performed on behalf of the device (spawning, mounted paths)
    #[error("device i/o error: {0}")]
    Io(#[from] io::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that abort a sync invocation.
///
/// None of these are retried. The only recoverable condition, a missing
/// destination file, never surfaces as a `SyncError`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Invocation parameters are unusable
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The job is not in a state that allows the requested step
    #[error("sync job must be pending to run; current state: {state}")]
    InvalidState { state: SyncState },

    /// The file that should be copied does not exist on its side
    #[error("source file missing on {side}: {path}")]
    SourceMissing { side: Side, path: String },

    /// Reading a local file failed for a reason other than absence
    #[error("unable to read local file {}: {source}", .path.display())]
    LocalIo { path: PathBuf, source: io::Error },

    /// Checksum RPC or transport failure
    #[error(transparent)]
    RemoteOperation(#[from] RemoteError),

    /// Digests differ after a completed copy
    #[error("Transfer failed (different checksum between local and remote) {local} | {remote}")]
    ChecksumMismatch { local: String, remote: String },
}

impl SyncError {
    /// Short machine-readable kind, used in logs and the output record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "invalid_config",
            Self::InvalidState { .. } => "invalid_state",
            Self::SourceMissing { .. } => "source_missing",
            Self::LocalIo { .. } => "local_io",
            Self::RemoteOperation(_) => "remote_operation",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
        }
    }
}
