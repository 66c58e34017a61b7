//! A device reached through the system OpenSSH client.
//!
//! Checksums run the device CLI command `file checksum <algo> <path>` over
//! `ssh`; copies run `scp`. Both use `BatchMode=yes` so a missing key fails
//! fast instead of prompting, and `ConnectTimeout` bounds connection setup.
//! The device only answers in text, so this adapter is where "no such file"
//! output is turned into `RemoteError::NotFound`.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Duration;

use tracing::debug;

use crate::checksums::{ChecksumAlgorithm, Digest};
use crate::device::{ConnectedDevice, TransportSession};
use crate::error::RemoteError;

/// Output fragments the device CLI prints for a missing path.
const NOT_FOUND_MARKERS: &[&str] = &["No such file or directory", "Could not resolve file"];

/// Connection options for `SshDevice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

impl SshOptions {
    pub fn new(host: impl Into<String>) -> Self {
        SshOptions {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// `user@host` or `host`
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }

    /// Options shared by `ssh` and `scp`. The two tools spell the port flag
    /// differently, so the caller passes it in.
    fn common_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ];
        if let Some(port) = self.port {
            args.push(port_flag.to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }
}

#[derive(Debug, Clone)]
pub struct SshDevice {
    options: SshOptions,
}

impl SshDevice {
    pub fn new(options: SshOptions) -> Self {
        SshDevice { options }
    }

    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    fn checksum_args(&self, path: &str, algorithm: ChecksumAlgorithm) -> Vec<String> {
        let mut args = self.options.common_args("-p");
        args.push(self.options.destination());
        args.push(format!("file checksum {} {}", cli_algorithm(algorithm), path));
        args
    }

    fn put_args(&self, local_file: &Path, remote_dir: &str) -> Vec<String> {
        let mut args = self.options.common_args("-P");
        args.push(local_file.display().to_string());
        args.push(format!("{}:{}/", self.options.destination(), remote_dir));
        args
    }

    fn get_args(&self, remote_file: &str, local_file: &Path) -> Vec<String> {
        let mut args = self.options.common_args("-P");
        args.push(format!("{}:{}", self.options.destination(), remote_file));
        args.push(local_file.display().to_string());
        args
    }
}

impl ConnectedDevice for SshDevice {
    fn name(&self) -> &str {
        &self.options.host
    }

    fn file_checksum(
        &self,
        path: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Digest, RemoteError> {
        check_device_path(path)?;
        let output = run("ssh", &self.checksum_args(path, algorithm))?;
        let text = combined_text(&output);
        parse_checksum_output(&text, path, algorithm, output.status.success())
    }

    fn open_transport(&self) -> Result<Box<dyn TransportSession + '_>, RemoteError> {
        Ok(Box::new(ScpSession {
            device: self,
            open: true,
        }))
    }
}

/// Each copy is its own `scp` process; the session only tracks liveness.
struct ScpSession<'a> {
    device: &'a SshDevice,
    open: bool,
}

impl ScpSession<'_> {
    fn copy(&self, args: Vec<String>) -> Result<u64, RemoteError> {
        if !self.open {
            return Err(RemoteError::Transport {
                message: "session is closed".to_string(),
            });
        }
        let output = run("scp", &args)?;
        if !output.status.success() {
            return Err(RemoteError::Transport {
                message: combined_text(&output).trim().to_string(),
            });
        }
        // scp does not report a byte count
        Ok(0)
    }
}

impl TransportSession for ScpSession<'_> {
    fn put(&mut self, local_file: &Path, remote_dir: &str) -> Result<u64, RemoteError> {
        check_device_path(remote_dir)?;
        let size = std::fs::metadata(local_file)?.len();
        self.copy(self.device.put_args(local_file, remote_dir))?;
        Ok(size)
    }

    fn get(&mut self, remote_file: &str, local_file: &Path) -> Result<u64, RemoteError> {
        check_device_path(remote_file)?;
        self.copy(self.device.get_args(remote_file, local_file))?;
        fetched_size(local_file)
    }

    fn close(&mut self) -> Result<(), RemoteError> {
        self.open = false;
        Ok(())
    }
}

/// Size of a file `scp` wrote. A missing file is left for verification to report.
fn fetched_size(local_file: &Path) -> Result<u64, RemoteError> {
    match std::fs::metadata(local_file) {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn cli_algorithm(algorithm: ChecksumAlgorithm) -> &'static str {
    match algorithm {
        ChecksumAlgorithm::Md5 => "md5",
        ChecksumAlgorithm::Sha256 => "sha-256",
    }
}

/// Device paths are sent as one CLI word; refuse anything that would split.
fn check_device_path(path: &str) -> Result<(), RemoteError> {
    if path.is_empty() || path.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(RemoteError::Rpc {
            message: format!("unsupported device path: {:?}", path),
        });
    }
    Ok(())
}

fn run(program: &str, args: &[String]) -> Result<Output, RemoteError> {
    debug!(program, ?args, "running");
    Ok(Command::new(program).args(args).output()?)
}

fn combined_text(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Interpret the output of `file checksum`.
///
/// A successful reply contains a line of the form `MD5 (/path) = <hex>`.
/// Missing-file markers only count on lines naming `path`, so client
/// warnings on stderr (an unreadable identity file, for one) are ignored.
pub fn parse_checksum_output(
    text: &str,
    path: &str,
    algorithm: ChecksumAlgorithm,
    exited_ok: bool,
) -> Result<Digest, RemoteError> {
    if exited_ok {
        let digest = text
            .lines()
            .filter_map(|line| line.rsplit_once(" = "))
            .find_map(|(_, value)| Digest::parse(algorithm, value));
        if let Some(digest) = digest {
            return Ok(digest);
        }
    }

    let missing = text
        .lines()
        .any(|line| line.contains(path) && NOT_FOUND_MARKERS.iter().any(|m| line.contains(m)));
    if missing {
        return Err(RemoteError::NotFound {
            path: path.to_string(),
        });
    }
    if !exited_ok {
        return Err(RemoteError::Rpc {
            message: text.trim().to_string(),
        });
    }

    Err(RemoteError::MalformedReply {
        reply: text.trim().to_string(),
    })
}
