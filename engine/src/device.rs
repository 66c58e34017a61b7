//! Device collaborator interfaces.
//!
//! The engine talks to a device through two operations: a checksum lookup
//! and a copy session. Adapters implement `ConnectedDevice`; the engine wraps
//! every session it opens in a `ScopedSession` so the session is closed on
//! every exit path.

use std::path::Path;

use tracing::{debug, warn};

use crate::checksums::{ChecksumAlgorithm, Digest};
use crate::error::RemoteError;

/// An open connection to a network device.
pub trait ConnectedDevice {
    /// Label used in logs
    fn name(&self) -> &str;

    /// Digest of a file on the device.
    ///
    /// Must return `RemoteError::NotFound` when the path does not exist, so
    /// callers never have to inspect error text.
    fn file_checksum(&self, path: &str, algorithm: ChecksumAlgorithm)
        -> Result<Digest, RemoteError>;

    /// Start a copy session.
    fn open_transport(&self) -> Result<Box<dyn TransportSession + '_>, RemoteError>;
}

/// A blocking file copy session.
pub trait TransportSession {
    /// Copy `local_file` into `remote_dir`, keeping its file name.
    ///
    /// Returns the number of bytes sent, if the transport knows it.
    fn put(&mut self, local_file: &Path, remote_dir: &str) -> Result<u64, RemoteError>;

    /// Copy `remote_file` to `local_file`.
    fn get(&mut self, remote_file: &str, local_file: &Path) -> Result<u64, RemoteError>;

    /// Release the session. Called exactly once by `ScopedSession`.
    fn close(&mut self) -> Result<(), RemoteError>;
}

/// A transport session that is closed when it goes out of scope.
///
/// `close` surfaces the close error on the success path; on every other path
/// (early return, `?`, panic unwinding) `Drop` closes the session and logs a
/// close failure instead of masking the original error.
pub struct ScopedSession<'a> {
    inner: Option<Box<dyn TransportSession + 'a>>,
    device: String,
}

impl<'a> ScopedSession<'a> {
    pub fn open(device: &'a dyn ConnectedDevice) -> Result<Self, RemoteError> {
        let inner = device.open_transport()?;
        debug!(device = device.name(), "transport session opened");
        Ok(ScopedSession {
            inner: Some(inner),
            device: device.name().to_string(),
        })
    }

    pub fn put(&mut self, local_file: &Path, remote_dir: &str) -> Result<u64, RemoteError> {
        self.session()?.put(local_file, remote_dir)
    }

    pub fn get(&mut self, remote_file: &str, local_file: &Path) -> Result<u64, RemoteError> {
        self.session()?.get(remote_file, local_file)
    }

    /// Close now and report the result.
    pub fn close(mut self) -> Result<(), RemoteError> {
        match self.inner.take() {
            Some(mut session) => {
                let result = session.close();
                debug!(device = %self.device, ok = result.is_ok(), "transport session closed");
                result
            }
            None => Ok(()),
        }
    }

    fn session(&mut self) -> Result<&mut (dyn TransportSession + 'a), RemoteError> {
        match self.inner.as_mut() {
            Some(session) => Ok(session.as_mut()),
            None => Err(RemoteError::Transport {
                message: "session already closed".to_string(),
            }),
        }
    }
}

impl Drop for ScopedSession<'_> {
    fn drop(&mut self) {
        if let Some(mut session) = self.inner.take() {
            match session.close() {
                Ok(()) => debug!(device = %self.device, "transport session released"),
                Err(e) => warn!(device = %self.device, error = %e, "failed to release transport session"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingDevice {
        opened: Cell<u32>,
        closed: Cell<u32>,
        fail_copy: bool,
    }

    impl CountingDevice {
        fn new(fail_copy: bool) -> Self {
            CountingDevice {
                opened: Cell::new(0),
                closed: Cell::new(0),
                fail_copy,
            }
        }
    }

    struct CountingSession<'a> {
        device: &'a CountingDevice,
    }

    impl TransportSession for CountingSession<'_> {
        fn put(&mut self, _local_file: &Path, _remote_dir: &str) -> Result<u64, RemoteError> {
            if self.device.fail_copy {
                return Err(RemoteError::Transport {
                    message: "connection lost".to_string(),
                });
            }
            Ok(3)
        }

        fn get(&mut self, _remote_file: &str, _local_file: &Path) -> Result<u64, RemoteError> {
            self.put(Path::new(""), "")
        }

        fn close(&mut self) -> Result<(), RemoteError> {
            self.device.closed.set(self.device.closed.get() + 1);
            Ok(())
        }
    }

    impl ConnectedDevice for CountingDevice {
        fn name(&self) -> &str {
            "counting"
        }

        fn file_checksum(
            &self,
            path: &str,
            _algorithm: ChecksumAlgorithm,
        ) -> Result<Digest, RemoteError> {
            Err(RemoteError::NotFound {
                path: path.to_string(),
            })
        }

        fn open_transport(&self) -> Result<Box<dyn TransportSession + '_>, RemoteError> {
            self.opened.set(self.opened.get() + 1);
            Ok(Box::new(CountingSession { device: self }))
        }
    }

    #[test]
    fn test_explicit_close_closes_once() {
        let device = CountingDevice::new(false);
        let mut session = ScopedSession::open(&device).expect("open");
        assert_eq!(session.put(Path::new("a"), "/var/tmp").expect("put"), 3);
        session.close().expect("close");

        assert_eq!(device.opened.get(), 1);
        assert_eq!(device.closed.get(), 1);
    }

    #[test]
    fn test_session_closed_when_copy_fails() {
        let device = CountingDevice::new(true);

        let result = (|| -> Result<(), RemoteError> {
            let mut session = ScopedSession::open(&device)?;
            session.get("/var/tmp/a", Path::new("a"))?;
            session.close()
        })();

        assert!(result.is_err());
        assert_eq!(device.closed.get(), 1, "drop must release the session");
    }

    #[test]
    fn test_session_closed_on_drop() {
        let device = CountingDevice::new(false);
        {
            let _session = ScopedSession::open(&device).expect("open");
        }
        assert_eq!(device.closed.get(), 1);
    }
}
