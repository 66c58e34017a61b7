//! Sync observer trait.
//!
//! This module defines the SyncObserver trait, which lets a frontend follow
//! a sync invocation without the engine knowing how it is displayed.

use crate::checksums::ChecksumResult;
use crate::model::{Side, SyncJob};

/// Trait for receiving updates from a sync invocation.
///
/// All methods are called synchronously from the engine, in order.
pub trait SyncObserver {
    /// Called after every state transition; `job.state` is the new state.
    fn on_state_changed(&self, job: &SyncJob);

    /// Called whenever a checksum has been obtained for one side.
    fn on_checksum(&self, job: &SyncJob, side: Side, checksum: &ChecksumResult);

    /// Called once the transport reports the copy as finished.
    fn on_transfer_completed(&self, job: &SyncJob, bytes: u64);
}
