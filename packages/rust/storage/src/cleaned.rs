//! Cleaned (LLM-extracted) content per URL.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::warn;

use confbot_shared::Result;

use crate::clock::Clock;
use crate::file_store::{ExpiringFileStore, Lookup};

/// Extraction output keyed by source URL, with its own max age
/// independent of the raw page cache.
#[derive(Debug, Clone)]
pub struct CleanedStore {
    files: ExpiringFileStore,
    max_age: TimeDelta,
}

impl CleanedStore {
    pub fn new(dir: impl Into<std::path::PathBuf>, clock: Arc<dyn Clock>, max_age: TimeDelta) -> Self {
        Self {
            files: ExpiringFileStore::new(dir, clock),
            max_age,
        }
    }

    /// Fresh cleaned content for `url`; expired entries are misses.
    pub async fn get(&self, url: &str) -> Lookup {
        self.files.get_fresh(url, self.max_age).await
    }

    pub async fn put(&self, url: &str, cleaned: &str) -> Result<()> {
        self.files.put(url, cleaned).await
    }

    /// Every cached entry, fresh or not, joined by newlines. Used as the
    /// knowledge block of the chat prompt. Unreadable directories yield an
    /// empty string.
    pub async fn get_all(&self) -> String {
        match self.files.list().await {
            Ok(entries) => entries
                .into_iter()
                .map(|(_, payload)| payload)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                warn!(dir = %self.files.dir().display(), error = %e, "failed to list cleaned content");
                String::new()
            }
        }
    }

    pub async fn count(&self) -> Result<usize> {
        self.files.count().await
    }

    pub fn files(&self) -> &ExpiringFileStore {
        &self.files
    }
}
