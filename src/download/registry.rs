//! Active-download store
//!
//! Owns the keyed set of live downloads and the completion history. Only the
//! orchestrator mutates it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::download::record::{Download, HistoryEntry};

/// Shared handle to one download's state
pub type DownloadHandle = Arc<Mutex<Download>>;

#[derive(Debug, Default)]
pub struct DownloadRegistry {
    active: HashMap<String, DownloadHandle>,
    order: Vec<String>,
    history: Vec<HistoryEntry>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a download, replacing any previous one under the same id
    pub fn insert(&mut self, id: String, handle: DownloadHandle) {
        if self.active.insert(id.clone(), handle).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<DownloadHandle> {
        self.active.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<DownloadHandle> {
        let handle = self.active.remove(id)?;
        self.order.retain(|o| o != id);
        Some(handle)
    }

    /// Handles in insertion order
    pub fn handles(&self) -> Vec<DownloadHandle> {
        self.order.iter().filter_map(|id| self.active.get(id).cloned()).collect()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Append a completion record
    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}
