//! Sync orchestration module.
//!
//! This module provides the sync lifecycle functions:
//! - Creating a sync job from a validated configuration
//! - Running it: compare checksums, copy if needed, verify the copy
//! - Reducing a run to the result record the automation host expects
//!
//! The decision core is a small state machine:
//! `Comparing -> {Skipped, Transferring -> Verifying -> {Succeeded, Failed}}`.

use chrono::Utc;
use tracing::{error, info, info_span};
use uuid::Uuid;

use crate::checksums::{local_checksum, remote_checksum, ChecksumResult};
use crate::device::{ConnectedDevice, ScopedSession};
use crate::error::SyncError;
use crate::model::{
    Side, SyncConfig, SyncJob, SyncReport, SyncState, TransferDirection, TransferOutcome,
    MSG_SKIPPED,
};
use crate::progress::SyncObserver;

/// A copy is needed when the destination is absent or holds a different digest.
pub fn needs_transfer(source: &ChecksumResult, destination: &ChecksumResult) -> bool {
    destination.is_absent() || !source.matches(destination)
}

/// Create a new sync job.
///
/// # Errors
/// Returns `SyncError::InvalidConfig` if the configuration is unusable
pub fn create_sync(config: SyncConfig) -> Result<SyncJob, SyncError> {
    config.validate()?;

    Ok(SyncJob {
        id: Uuid::new_v4(),
        config,
        state: SyncState::Pending,
        local_checksum: None,
        remote_checksum: None,
        bytes_transferred: 0,
        transfer_attempts: 0,
        outcome: None,
        created_at: Utc::now(),
        start_time: None,
        end_time: None,
    })
}

/// Run a sync job against a connected device.
///
/// Transitions the job from Pending through the sync states to Skipped,
/// Succeeded or Failed. A post-copy checksum mismatch is returned as
/// `SyncError::ChecksumMismatch` and also recorded as the job outcome.
///
/// # Errors
/// Every error is fatal for the invocation; nothing is retried.
pub fn run_sync(
    job: &mut SyncJob,
    device: &dyn ConnectedDevice,
    observer: Option<&dyn SyncObserver>,
) -> Result<TransferOutcome, SyncError> {
    if job.state != SyncState::Pending {
        return Err(SyncError::InvalidState { state: job.state });
    }

    let span = info_span!(
        "sync",
        id = %job.id,
        file = %job.config.file,
        direction = %job.config.direction,
        device = device.name()
    );
    let _entered = span.enter();

    info!("Starting the file transfer: {}", job.config.file);
    job.start_time = Some(Utc::now());

    let result = execute(job, device, observer);

    let final_state = match &result {
        Ok(TransferOutcome::Skipped) => SyncState::Skipped,
        Ok(_) => SyncState::Succeeded,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "sync failed");
            SyncState::Failed
        }
    };
    job.end_time = Some(Utc::now());
    set_state(job, final_state, observer);

    result
}

/// Create, run and report in one call. Never fails: errors become a failed
/// record.
pub fn sync_file(
    config: SyncConfig,
    device: &dyn ConnectedDevice,
    observer: Option<&dyn SyncObserver>,
) -> (SyncJob, SyncReport) {
    let mut job = match create_sync(config.clone()) {
        Ok(job) => job,
        Err(e) => {
            let job = unvalidated_job(config);
            let report = SyncReport::failure(&job, &e);
            return (job, report);
        }
    };

    let report = match run_sync(&mut job, device, observer) {
        Ok(outcome) => SyncReport::from_outcome(&job, &outcome),
        Err(e) => SyncReport::failure(&job, &e),
    };
    (job, report)
}

fn unvalidated_job(config: SyncConfig) -> SyncJob {
    let now = Utc::now();
    SyncJob {
        id: Uuid::new_v4(),
        config,
        state: SyncState::Failed,
        local_checksum: None,
        remote_checksum: None,
        bytes_transferred: 0,
        transfer_attempts: 0,
        outcome: None,
        created_at: now,
        start_time: None,
        end_time: Some(now),
    }
}

fn execute(
    job: &mut SyncJob,
    device: &dyn ConnectedDevice,
    observer: Option<&dyn SyncObserver>,
) -> Result<TransferOutcome, SyncError> {
    let direction = job.config.direction;
    set_state(job, SyncState::Comparing, observer);

    // Source side first
    let source = obtain_checksum(job, device, direction.source(), observer)?;
    let destination = obtain_checksum(job, device, direction.destination(), observer)?;

    if !needs_transfer(&source, &destination) {
        info!("{}", MSG_SKIPPED);
        job.outcome = Some(TransferOutcome::Skipped);
        return Ok(TransferOutcome::Skipped);
    }

    if destination.is_absent() {
        info!("File not present, need to transfer");
    } else {
        info!(source = %source, destination = %destination, "Checksums differ, need to transfer");
    }

    set_state(job, SyncState::Transferring, observer);
    let bytes = transfer(job, device)?;
    job.bytes_transferred = bytes;
    if let Some(observer) = observer {
        observer.on_transfer_completed(job, bytes);
    }

    // Recompute on the written side; the pre-transfer value is never reused
    set_state(job, SyncState::Verifying, observer);
    let fresh = obtain_checksum(job, device, direction.destination(), observer)?;

    if fresh.matches(&source) {
        info!("Checksum check passed.");
        job.outcome = Some(TransferOutcome::TransferredAndVerified);
        return Ok(TransferOutcome::TransferredAndVerified);
    }

    let (local, remote) = match direction {
        TransferDirection::Put => (source.to_string(), fresh.to_string()),
        TransferDirection::Get => (fresh.to_string(), source.to_string()),
    };
    error!(local = %local, remote = %remote, "Checksum check failed.");
    job.outcome = Some(TransferOutcome::TransferredButMismatched {
        local: local.clone(),
        remote: remote.clone(),
    });
    Err(SyncError::ChecksumMismatch { local, remote })
}

fn obtain_checksum(
    job: &mut SyncJob,
    device: &dyn ConnectedDevice,
    side: Side,
    observer: Option<&dyn SyncObserver>,
) -> Result<ChecksumResult, SyncError> {
    let direction = job.config.direction;
    let algorithm = job.config.algorithm;

    let checksum = match side {
        Side::Local => {
            let path = job.config.local().to_path_buf();
            info!(path = %path.display(), %algorithm, "computing local checksum");
            local_checksum(&path, direction, algorithm)?
        }
        Side::Remote => {
            let path = job.config.remote().full_path();
            info!(path = %path, %algorithm, "computing remote checksum");
            remote_checksum(device, &path, direction, algorithm)?
        }
    };

    info!(%side, checksum = %checksum, "checksum obtained");
    job.set_checksum(side, checksum.clone());
    if let Some(observer) = observer {
        observer.on_checksum(job, side, &checksum);
    }
    Ok(checksum)
}

/// Copy inside a scoped session. The session is released on every path out
/// of this function, including `?` returns.
fn transfer(job: &mut SyncJob, device: &dyn ConnectedDevice) -> Result<u64, SyncError> {
    job.transfer_attempts += 1;
    let local_file = job.config.local().to_path_buf();

    let mut session = ScopedSession::open(device)?;
    let bytes = match job.config.direction {
        TransferDirection::Put => session.put(&local_file, &job.config.remote_dir)?,
        TransferDirection::Get => session.get(&job.config.remote().full_path(), &local_file)?,
    };
    session.close()?;

    info!(bytes, "transfer completed");
    Ok(bytes)
}

fn set_state(job: &mut SyncJob, state: SyncState, observer: Option<&dyn SyncObserver>) {
    job.state = state;
    if let Some(observer) = observer {
        observer.on_state_changed(job);
    }
}
