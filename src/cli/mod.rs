//! CLI module
//!
//! Command-line host for the download engine.

pub mod args;
pub mod config;
pub mod progress;

pub use args::CliArgs;
pub use config::Config;
pub use progress::{format_bytes, format_duration, format_speed, ProgressDisplay};
