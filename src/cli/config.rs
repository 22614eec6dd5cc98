//! CLI configuration module
//!
//! Turns parsed arguments into the effective run configuration.

use crate::cli::args::CliArgs;
use crate::download::Settings;
use crate::error::TorrentError;
use crate::torrent::TorrentInfo;
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one CLI run
#[derive(Debug, Clone)]
pub struct Config {
    /// Torrent metadata
    pub torrent_info: TorrentInfo,
    /// Output file path
    pub output_path: PathBuf,
    pub port: u16,
    pub max_peers: usize,
    pub connect_timeout: Duration,
    pub tracker_timeout: Duration,
    /// Emit snapshots as JSON lines
    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs, torrent_info: TorrentInfo) -> Self {
        let output_path = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("./downloads").join(&torrent_info.name));

        Self {
            torrent_info,
            output_path,
            port: args.port,
            max_peers: args.max_peers,
            connect_timeout: Duration::from_secs(args.connect_timeout),
            tracker_timeout: Duration::from_secs(args.tracker_timeout),
            json: args.json,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port").into());
        }

        if self.max_peers == 0 {
            return Err(TorrentError::config_error_with_field("max_peers must be at least 1", "max_peers").into());
        }

        if self.connect_timeout.is_zero() {
            return Err(
                TorrentError::config_error_with_field("connect_timeout must be positive", "connect_timeout").into(),
            );
        }

        if self.tracker_timeout.is_zero() {
            return Err(
                TorrentError::config_error_with_field("tracker_timeout must be positive", "tracker_timeout").into(),
            );
        }

        if self.output_path.as_os_str().is_empty() {
            return Err(TorrentError::config_error_with_field("Output path cannot be empty", "output").into());
        }

        Ok(())
    }

    /// Engine settings for this run
    pub fn settings(&self) -> Settings {
        Settings {
            max_peers: self.max_peers,
            connect_timeout: self.connect_timeout,
            tracker_timeout: self.tracker_timeout,
            port: self.port,
            ..Settings::default()
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
