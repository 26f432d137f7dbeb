//! Cached snapshot of the structured session/speaker feed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use confbot_shared::{ConfbotError, FeedSnapshot, Result};

use crate::clock::Clock;
use crate::file_store::{Lookup, file_expired, modified_at, read_lookup, write_file};

/// One JSON file holding the last fetched [`FeedSnapshot`].
#[derive(Clone)]
pub struct FeedCache {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    max_age: TimeDelta,
}

impl std::fmt::Debug for FeedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCache")
            .field("path", &self.path)
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl FeedCache {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>, max_age: TimeDelta) -> Self {
        Self {
            path: path.into(),
            clock,
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached snapshot. Missing or corrupt files yield the empty
    /// snapshot, never an error.
    pub async fn snapshot(&self) -> FeedSnapshot {
        let raw = match read_lookup(&self.path).await {
            Lookup::Hit(raw) => raw,
            Lookup::Miss => {
                debug!(path = %self.path.display(), "no feed snapshot cached");
                return FeedSnapshot::default();
            }
            Lookup::ReadError(detail) => {
                warn!(error = %detail, "failed to read feed snapshot");
                return FeedSnapshot::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt feed snapshot");
                FeedSnapshot::default()
            }
        }
    }

    /// Overwrite the cached snapshot.
    pub async fn write(&self, snapshot: &FeedSnapshot) -> Result<()> {
        let json = serde_json::to_vec(snapshot)
            .map_err(|e| ConfbotError::parse(format!("failed to serialize feed snapshot: {e}")))?;
        write_file(&self.path, &json).await
    }

    /// Whether the snapshot is younger than the configured max age.
    pub async fn is_fresh(&self) -> bool {
        !file_expired(&self.path, self.clock.now(), self.max_age).await
    }

    pub async fn stored_at(&self) -> Option<DateTime<Utc>> {
        modified_at(&self.path).await
    }
}
