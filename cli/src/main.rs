//! devsync - command-line interface for the sync engine.
//!
//! Copies one file to or from a network device when, and only when, the
//! checksums differ. The result record is printed to stdout as JSON; logs go
//! to stderr.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use devsync_engine::{
    sync_file, ChecksumAlgorithm, ChecksumResult, ConnectedDevice, MountedDevice, Side,
    SshDevice, SshOptions, SyncConfig, SyncJob, SyncObserver, SyncReport, TransferDirection,
};
use tracing_subscriber::EnvFilter;

/// devsync - checksum-verified file copy to and from network devices
#[derive(Parser, Debug)]
#[command(name = "devsync")]
#[command(version)]
#[command(about = "Push or pull one file, skipping the copy when checksums already match")]
struct Args {
    /// Directory on this host
    #[arg(long, value_name = "DIR")]
    local_dir: Option<String>,

    /// Directory on the device
    #[arg(long, value_name = "DIR")]
    remote_dir: Option<String>,

    /// File name (same on both sides)
    #[arg(long, value_name = "NAME")]
    file: Option<String>,

    /// Transfer direction: put or get
    #[arg(long = "type", value_name = "DIRECTION")]
    direction: Option<String>,

    /// JSON file holding local_dir, remote_dir, file and type
    #[arg(long, value_name = "PATH", conflicts_with_all = ["local_dir", "remote_dir", "file", "direction"])]
    args_file: Option<PathBuf>,

    /// Checksum algorithm: md5 (default) or sha256
    #[arg(long, value_name = "ALGORITHM")]
    algorithm: Option<String>,

    /// Device filesystem mounted at this directory
    #[arg(long, value_name = "PATH", conflicts_with = "host")]
    mount: Option<PathBuf>,

    /// Device reachable over ssh
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// SSH user
    #[arg(long, value_name = "USER", requires = "host")]
    user: Option<String>,

    /// SSH port
    #[arg(long, value_name = "PORT", requires = "host")]
    port: Option<u16>,

    /// SSH private key
    #[arg(long, value_name = "PATH", requires = "host")]
    identity: Option<PathBuf>,

    /// Seconds to wait for the ssh connection
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    connect_timeout: u64,

    /// Print every state transition to stderr
    #[arg(long)]
    verbose: bool,
}

/// CLI implementation of SyncObserver
struct CliObserver {
    verbose: bool,
}

impl SyncObserver for CliObserver {
    fn on_state_changed(&self, job: &SyncJob) {
        if self.verbose {
            eprintln!("[{}] {}", job.config.file, job.state);
        }
    }

    fn on_checksum(&self, job: &SyncJob, side: Side, checksum: &ChecksumResult) {
        if self.verbose {
            eprintln!("[{}]   {} checksum: {}", job.config.file, side, checksum);
        }
    }

    fn on_transfer_completed(&self, job: &SyncJob, bytes: u64) {
        if self.verbose {
            eprintln!("[{}]   copied {} bytes", job.config.file, bytes);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Parse arguments, run the sync, print the result record
fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Error: unable to encode result: {}", e),
            }
            if report.failed {
                1
            } else {
                0
            }
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    process::exit(exit_code);
}

/// Main CLI logic - separated for testability.
///
/// `Err` is a usage problem; a sync that ran and failed is `Ok` with
/// `report.failed` set.
fn run_cli(args: &Args) -> Result<SyncReport, String> {
    let config = build_config(args)?;
    let device = build_device(args)?;
    let observer = CliObserver {
        verbose: args.verbose,
    };

    tracing::debug!(device = device.name(), "device selected");
    let (_job, report) = sync_file(config, device.as_ref(), Some(&observer));
    Ok(report)
}

fn build_config(args: &Args) -> Result<SyncConfig, String> {
    let algorithm = match &args.algorithm {
        Some(name) => Some(ChecksumAlgorithm::from_str(name).ok_or_else(|| {
            format!("Invalid checksum algorithm '{}'. Must be 'md5' or 'sha256'", name)
        })?),
        None => None,
    };

    if let Some(path) = &args.args_file {
        if args.local_dir.is_some()
            || args.remote_dir.is_some()
            || args.file.is_some()
            || args.direction.is_some()
        {
            return Err(
                "--args-file cannot be combined with --local-dir, --remote-dir, --file or --type"
                    .to_string(),
            );
        }
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Cannot read arguments file {}: {}", path.display(), e))?;
        let mut config: SyncConfig = serde_json::from_str(&text)
            .map_err(|e| format!("Invalid arguments file {}: {}", path.display(), e))?;
        if let Some(algorithm) = algorithm {
            config.algorithm = algorithm;
        }
        return Ok(config);
    }

    let required = |value: &Option<String>, flag: &str| {
        value
            .clone()
            .ok_or_else(|| format!("Missing required argument {}", flag))
    };
    let local_dir = required(&args.local_dir, "--local-dir")?;
    let remote_dir = required(&args.remote_dir, "--remote-dir")?;
    let file = required(&args.file, "--file")?;
    let direction_arg = required(&args.direction, "--type")?;

    let direction = TransferDirection::from_str(&direction_arg).ok_or_else(|| {
        format!("Invalid type '{}'. Must be 'put' or 'get'", direction_arg)
    })?;

    let mut config = SyncConfig::new(local_dir, remote_dir, file, direction);
    if let Some(algorithm) = algorithm {
        config.algorithm = algorithm;
    }
    Ok(config)
}

fn build_device(args: &Args) -> Result<Box<dyn ConnectedDevice>, String> {
    match (&args.mount, &args.host) {
        (Some(root), None) => {
            if !root.is_dir() {
                return Err(format!("Mount point is not a directory: {}", root.display()));
            }
            Ok(Box::new(MountedDevice::new(root)))
        }
        (None, Some(host)) => {
            let mut options = SshOptions::new(host);
            options.user = args.user.clone();
            options.port = args.port;
            options.identity_file = args.identity.clone();
            options.connect_timeout = Duration::from_secs(args.connect_timeout);
            Ok(Box::new(SshDevice::new(options)))
        }
        (Some(_), Some(_)) => Err("Use either --mount or --host, not both".to_string()),
        (None, None) => Err("A device is required: pass --mount or --host".to_string()),
    }
}
