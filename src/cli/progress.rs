//! Progress display module
//!
//! Renders download snapshots in the terminal, as a progress line or as
//! JSON lines.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::download::{DownloadStatus, HistoryEntry, ProgressSnapshot};

/// Format bytes to human readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed to human readable string
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec as u64))
}

/// Format duration to human readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Single progress line for a snapshot
pub fn progress_line(snapshot: &ProgressSnapshot) -> String {
    let bar_width: usize = 40;
    let filled = ((snapshot.progress.clamp(0.0, 100.0) / 100.0) * bar_width as f64) as usize;
    let bar = "=".repeat(filled) + &" ".repeat(bar_width.saturating_sub(filled));

    let eta = snapshot
        .eta
        .map(|secs| format_duration(Duration::from_secs(secs)))
        .unwrap_or_else(|| "∞".to_string());

    format!(
        "[{}] {:.1}% | {} / {} | ↓ {} | Peers: {}/{} | ETA: {} | {}",
        bar,
        snapshot.progress,
        format_bytes(snapshot.downloaded_bytes),
        format_bytes(snapshot.total_bytes),
        format_speed(snapshot.download_speed),
        snapshot.connected_peers,
        snapshot.total_peers,
        eta,
        snapshot.status,
    )
}

/// Progress display for CLI
pub struct ProgressDisplay {
    start_time: Instant,
    last_update: Option<Instant>,
    update_interval: Duration,
    quiet: bool,
    json: bool,
}

impl ProgressDisplay {
    pub fn new(quiet: bool, json: bool) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: None,
            update_interval: Duration::from_millis(500),
            quiet,
            json,
        }
    }

    /// Render a snapshot. Progress lines are throttled; status changes and JSON are not.
    pub fn update(&mut self, snapshot: &ProgressSnapshot) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        if self.json {
            let line = serde_json::to_string(snapshot).map_err(io::Error::other)?;
            println!("{}", line);
            return Ok(());
        }

        let throttled = self
            .last_update
            .is_some_and(|last| last.elapsed() < self.update_interval);
        if throttled && snapshot.status == DownloadStatus::Downloading {
            return Ok(());
        }
        self.last_update = Some(Instant::now());

        print!("\r\x1b[2K{}", progress_line(snapshot));
        io::stdout().flush()
    }

    /// Print completion message
    pub fn print_complete(&self, entry: &HistoryEntry) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        if self.json {
            let line = serde_json::to_string(entry).map_err(io::Error::other)?;
            println!("{}", line);
            return Ok(());
        }

        print!("\r\x1b[2K");
        println!();
        println!("Download Complete!");
        println!("  Name: {}", entry.name);
        println!("  Size: {}", format_bytes(entry.size));
        println!("  Started: {}", entry.start_time.to_rfc3339());
        println!("  Completed: {}", entry.completed_at.to_rfc3339());
        println!("  Elapsed Time: {}", format_duration(Duration::from_millis(entry.download_time)));
        Ok(())
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet || self.json {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(progress: f64, eta: Option<u64>) -> ProgressSnapshot {
        ProgressSnapshot {
            id: "a".to_string(),
            status: DownloadStatus::Downloading,
            progress,
            download_speed: 2048.0,
            connected_peers: 3,
            total_peers: 7,
            downloaded_bytes: 512,
            total_bytes: 1024,
            eta,
            peers: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024.0), "1.00 KB/s");
        assert_eq!(format_speed(1024.0 * 1024.0), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_progress_line() {
        let line = progress_line(&snapshot(50.0, Some(90)));
        assert!(line.contains("50.0%"));
        assert!(line.contains("512.00 B / 1.00 KB"));
        assert!(line.contains("Peers: 3/7"));
        assert!(line.contains("ETA: 1m 30s"));
        assert!(line.ends_with("downloading"));
        assert_eq!(line.matches('=').count(), 20);
    }

    #[test]
    fn test_progress_line_unknown_eta() {
        assert!(progress_line(&snapshot(0.0, None)).contains("ETA: ∞"));
    }

    #[test]
    fn test_quiet_display_renders_nothing() {
        let mut display = ProgressDisplay::new(true, false);
        assert!(display.is_quiet());
        assert!(display.update(&snapshot(10.0, None)).is_ok());
        assert!(display.elapsed() < Duration::from_secs(5));
    }
}
