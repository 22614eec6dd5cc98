//! rust-torrent-client - Main entry point
//!
//! Loads a .torrent file, downloads it from the tracker's peers and renders
//! progress until the download completes, fails or is cancelled.

use anyhow::{Context, Result};
use rust_torrent_client::{
    cli::format_bytes, CliArgs, Config, DownloadStatus, Downloader, ProgressDisplay, TorrentInfo, TorrentParser,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        if let Some(location) = panic_info.location() {
            error!("PANIC occurred at {}:{}:{}", location.file(), location.line(), location.column());
        } else {
            error!("PANIC occurred at unknown location");
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    info!("rust-torrent-client starting");
    debug!("CLI arguments: {:?}", args);

    let torrent_info = load_torrent_file(&args.torrent_file).context("Failed to load torrent file")?;

    let config = Config::from_args(&args, torrent_info.clone());
    config.validate().context("Invalid configuration")?;

    let mut progress = ProgressDisplay::new(config.is_quiet(), config.json);
    if !config.quiet && !config.json {
        display_torrent_info(&torrent_info, &config);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let downloader =
        Downloader::with_tracker(config.settings(), Arc::new(tx)).context("Failed to initialise tracker client")?;

    progress.print_status("Starting download...")?;
    let id = downloader
        .start_download(torrent_info, config.output_path.clone(), None)
        .await;
    info!("Download id: {}", id);

    let final_status = loop {
        tokio::select! {
            snapshot = rx.recv() => {
                let Some(snapshot) = snapshot else {
                    warn!("Progress channel closed");
                    break None;
                };
                if snapshot.id != id {
                    continue;
                }
                progress.update(&snapshot)?;
                if snapshot.status.is_terminal() {
                    break Some(snapshot);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, cancelling download {}", id);
                downloader.cancel_download(&id).await;
            }
        }
    };

    let Some(snapshot) = final_status else {
        return Ok(());
    };

    match snapshot.status {
        DownloadStatus::Completed => {
            let history = downloader.get_history().await;
            if let Some(entry) = history.iter().find(|entry| entry.id == id) {
                progress.print_complete(entry)?;
            }
            info!("Download completed successfully");
        }
        DownloadStatus::Error => {
            let message = snapshot.error.unwrap_or_else(|| "unknown error".to_string());
            error!("Download failed: {}", message);
            progress.print_error(&format!("Download failed: {}", message))?;
            return Err(anyhow::anyhow!("Download failed: {}", message));
        }
        _ => {
            progress.print_status("\nDownload cancelled")?;
        }
    }

    info!("rust-torrent-client finished");
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level {:?}", args.log_level());
}

/// Load and parse the torrent file
fn load_torrent_file(path: &Path) -> Result<TorrentInfo> {
    info!("Loading torrent file: {}", path.display());

    let info = TorrentParser::parse_file(path).map_err(|e| {
        error!("Failed to parse torrent file '{}': {}", path.display(), e);
        e
    })?;

    info!("Successfully loaded torrent file: {}", info.name);
    Ok(info)
}

/// Display torrent information
fn display_torrent_info(torrent_info: &TorrentInfo, config: &Config) {
    println!("Torrent Information:");
    println!("  Name: {}", torrent_info.name);
    println!("  Size: {} ({})", torrent_info.total_size(), format_bytes(torrent_info.total_size()));
    println!("  Pieces: {}", torrent_info.piece_count());
    println!("  Piece length: {}", format_bytes(torrent_info.piece_length));
    println!("  Info hash: {}", torrent_info.info_hash_hex());
    println!("  Tracker: {}", torrent_info.announce);
    println!();
    println!("Configuration:");
    println!("  Output: {}", config.output_path.display());
    println!("  Advertised port: {}", config.port);
    println!("  Max peers: {}", config.max_peers);
    println!();
}
