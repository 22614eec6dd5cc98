//! Output file storage
//!
//! A single flat output file written at absolute byte offsets. Blocks may
//! arrive in any order; each write targets a disjoint range.

use std::path::{Path, PathBuf};

use anyhow::Result;
use tokio::fs::{self, File};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace};

use crate::error::TorrentError;

/// Positional writer over the download's output file
#[derive(Debug)]
pub struct OutputFile {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl OutputFile {
    /// Create (or truncate) the output file, creating parent directories as needed
    pub async fn create(path: &Path) -> Result<Self> {
        info!("Opening output file: {}", path.display());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create directory '{}': {}", parent.display(), e);
                TorrentError::storage_error_full("Failed to create directory", parent.display().to_string(), e.to_string())
            })?;
        }

        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .await
            .map_err(|e| {
                error!("Failed to open output file '{}': {}", path.display(), e);
                TorrentError::storage_error_full("Failed to open output file", path.display().to_string(), e.to_string())
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            handle: Mutex::new(Some(file)),
        })
    }

    /// Path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `data` at absolute `offset`.
    ///
    /// Returns `Ok(false)` without writing when the file has already been closed.
    pub async fn write_block(&self, offset: u64, data: &[u8]) -> Result<bool> {
        let mut guard = self.handle.lock().await;
        let Some(file) = guard.as_mut() else {
            debug!("Skipping write at offset {}: file closed", offset);
            return Ok(false);
        };

        trace!("Writing {} bytes at offset {}", data.len(), offset);
        file.seek(std::io::SeekFrom::Start(offset)).await.map_err(|e| {
            TorrentError::storage_error_full("Failed to seek output file", self.path.display().to_string(), e.to_string())
        })?;
        file.write_all(data).await.map_err(|e| {
            error!("Failed to write {} bytes at offset {}: {}", data.len(), offset, e);
            TorrentError::storage_error_full("Failed to write block", self.path.display().to_string(), e.to_string())
        })?;
        Ok(true)
    }

    /// Flush and close the file. Errors are logged and ignored; later calls are no-ops.
    pub async fn close(&self) {
        let Some(mut file) = self.handle.lock().await.take() else {
            return;
        };
        if let Err(e) = file.flush().await {
            debug!("Ignoring flush error on close of '{}': {}", self.path.display(), e);
        }
        if let Err(e) = file.sync_all().await {
            debug!("Ignoring sync error on close of '{}': {}", self.path.display(), e);
        }
        debug!("Closed output file {}", self.path.display());
    }

    /// Whether the file is still open for writing
    pub async fn is_open(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}
