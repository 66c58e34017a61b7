//! # devsync engine - checksum-verified file sync with network devices
//!
//! Copies one file between the controller and a network device, in either
//! direction, and only when the checksums say it is needed. Every copy is
//! verified by recomputing the checksum on the side that was written.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use devsync_engine::{create_sync, run_sync, MountedDevice, SyncConfig, SyncReport, TransferDirection};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig::new("/srv/images", "/var/tmp", "junos.tgz", TransferDirection::Put);
//! let device = MountedDevice::new("/mnt/router1");
//!
//! let mut job = create_sync(config)?;
//! let outcome = run_sync(&mut job, &device, None)?;
//!
//! let report = SyncReport::from_outcome(&job, &outcome);
//! println!("{}", report.msg);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Configuration, job record, result record, enums
//! - **error**: Sync and device error types
//! - **checksums**: Digest computation and direction-aware checksum lookup
//! - **device**: Device traits and the scoped transport session
//! - **mounted**: Device backed by a local directory tree
//! - **ssh**: Device driven through the OpenSSH `ssh`/`scp` clients
//! - **sync**: The compare/transfer/verify state machine
//! - **progress**: Observer trait for frontends
//! - **fs_ops**: Low-level file copy helpers

pub mod checksums;
pub mod device;
pub mod error;
pub mod fs_ops;
pub mod model;
pub mod mounted;
pub mod progress;
pub mod ssh;
pub mod sync;

// Re-export main types and functions
pub use checksums::{ChecksumAlgorithm, ChecksumResult, Digest};
pub use device::{ConnectedDevice, ScopedSession, TransportSession};
pub use error::{RemoteError, SyncError};
pub use model::{
    FileLocation, Side, SyncConfig, SyncJob, SyncReport, SyncState, TransferDirection,
    TransferOutcome,
};
pub use mounted::MountedDevice;
pub use progress::SyncObserver;
pub use ssh::{SshDevice, SshOptions};
pub use sync::{create_sync, needs_transfer, run_sync, sync_file};
