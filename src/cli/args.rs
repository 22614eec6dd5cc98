//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the torrent client
#[derive(Debug, Parser)]
#[command(name = "rust-torrent-client")]
#[command(about = "Download a torrent from its tracker's peers", long_about = None)]
pub struct CliArgs {
    /// Path to the .torrent file
    #[arg(value_name = "TORRENT_FILE")]
    pub torrent_file: PathBuf,

    /// Output file path (defaults to ./downloads/<torrent name>)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Maximum number of peers connected per download
    #[arg(long, default_value_t = 10)]
    pub max_peers: usize,

    /// Peer connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub connect_timeout: u64,

    /// Tracker round-trip timeout in seconds
    #[arg(long, default_value_t = 15)]
    pub tracker_timeout: u64,

    /// Port advertised to trackers
    #[arg(short, long, default_value_t = 6881)]
    pub port: u16,

    /// Print progress snapshots as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = CliArgs::try_parse_from(["rust-torrent-client", "test.torrent"]).unwrap();

        assert_eq!(args.torrent_file, PathBuf::from("test.torrent"));
        assert_eq!(args.output, None);
        assert_eq!(args.max_peers, 10);
        assert_eq!(args.connect_timeout, 10);
        assert_eq!(args.tracker_timeout, 15);
        assert_eq!(args.port, 6881);
        assert!(!args.json);
        assert_eq!(args.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_flags() {
        let args = CliArgs::try_parse_from([
            "rust-torrent-client",
            "a.torrent",
            "-o",
            "/tmp/out.bin",
            "--max-peers",
            "4",
            "--json",
            "--verbose",
        ])
        .unwrap();

        assert_eq!(args.output, Some(PathBuf::from("/tmp/out.bin")));
        assert_eq!(args.max_peers, 4);
        assert!(args.json);
        assert!(args.is_verbose());
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_missing_torrent_is_rejected() {
        assert!(CliArgs::try_parse_from(["rust-torrent-client"]).is_err());
    }
}
