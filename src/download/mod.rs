//! Download orchestration
//!
//! Download records, progress delivery, the active-download store and the
//! orchestrator that drives peer connections for each download.

pub mod orchestrator;
pub mod progress;
pub mod record;
pub mod registry;

pub use orchestrator::{Downloader, Settings};
pub use progress::{NullSink, ProgressSink};
pub use record::{Download, DownloadStatus, DownloadSummary, HistoryEntry, ProgressSnapshot};
pub use registry::{DownloadHandle, DownloadRegistry};
