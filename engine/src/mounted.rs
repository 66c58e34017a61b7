//! A device whose filesystem is reachable as a local directory.
//!
//! Device paths such as `/var/tmp/image.tgz` resolve below the mount root.
//! Useful for devices exported over a network share, and as a real
//! filesystem-backed device in tests.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::checksums::{compute_file_checksum, ChecksumAlgorithm, Digest};
use crate::device::{ConnectedDevice, TransportSession};
use crate::error::RemoteError;
use crate::fs_ops;

#[derive(Debug, Clone)]
pub struct MountedDevice {
    name: String,
    root: PathBuf,
}

impl MountedDevice {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        MountedDevice {
            name: format!("mounted:{}", root.display()),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, device_path: &str) -> Result<PathBuf, RemoteError> {
        fs_ops::resolve_under_root(&self.root, device_path).ok_or_else(|| RemoteError::Rpc {
            message: format!("path escapes the device root: {}", device_path),
        })
    }
}

impl ConnectedDevice for MountedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_checksum(
        &self,
        path: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Digest, RemoteError> {
        let resolved = self.resolve(path)?;
        compute_file_checksum(&resolved, algorithm).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RemoteError::NotFound {
                path: path.to_string(),
            },
            _ => RemoteError::Io(e),
        })
    }

    fn open_transport(&self) -> Result<Box<dyn TransportSession + '_>, RemoteError> {
        if !self.root.is_dir() {
            return Err(RemoteError::Transport {
                message: format!("device root is not a directory: {}", self.root.display()),
            });
        }
        Ok(Box::new(MountedSession {
            device: self,
            open: true,
        }))
    }
}

/// Copy session against a mounted device.
struct MountedSession<'a> {
    device: &'a MountedDevice,
    open: bool,
}

impl MountedSession<'_> {
    fn ensure_open(&self) -> Result<(), RemoteError> {
        if self.open {
            Ok(())
        } else {
            Err(RemoteError::Transport {
                message: "session is closed".to_string(),
            })
        }
    }
}

impl TransportSession for MountedSession<'_> {
    fn put(&mut self, local_file: &Path, remote_dir: &str) -> Result<u64, RemoteError> {
        self.ensure_open()?;
        let file_name = local_file.file_name().ok_or_else(|| RemoteError::Transport {
            message: format!("not a file path: {}", local_file.display()),
        })?;
        let target = self.device.resolve(remote_dir)?.join(file_name);
        debug!(src = %local_file.display(), dst = %target.display(), "copying to device");
        Ok(fs_ops::copy_file_with_metadata(local_file, &target)?)
    }

    fn get(&mut self, remote_file: &str, local_file: &Path) -> Result<u64, RemoteError> {
        self.ensure_open()?;
        let source = self.device.resolve(remote_file)?;
        debug!(src = %source.display(), dst = %local_file.display(), "copying from device");
        Ok(fs_ops::copy_file_with_metadata(&source, local_file)?)
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        self.open = false;
        Ok(())
    }
}
