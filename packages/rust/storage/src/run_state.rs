//! Persisted time of the last fully successful batch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use confbot_shared::{ConfbotError, Result};

use crate::file_store::{Lookup, read_lookup, write_file};

/// On-disk shape: `{"lastRun": <epoch-ms>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct RunState {
    #[serde(rename = "lastRun")]
    last_run: i64,
}

/// Reads and writes the run state file.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last recorded run. Absent, unreadable, or corrupt state is `None`.
    pub async fn load(&self) -> Option<DateTime<Utc>> {
        let raw = match read_lookup(&self.path).await {
            Lookup::Hit(raw) => raw,
            Lookup::Miss => {
                debug!(path = %self.path.display(), "no run state recorded yet");
                return None;
            }
            Lookup::ReadError(detail) => {
                warn!(error = %detail, "failed to read run state");
                return None;
            }
        };

        let state: RunState = match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt run state");
                return None;
            }
        };

        let parsed = DateTime::<Utc>::from_timestamp_millis(state.last_run);
        if parsed.is_none() {
            warn!(last_run = state.last_run, "run state timestamp out of range");
        }
        parsed
    }

    /// Record `at` as the last run. Written to a sibling temp file first and
    /// renamed into place, so readers never see a partial file.
    pub async fn save(&self, at: DateTime<Utc>) -> Result<()> {
        let json = serde_json::to_vec(&RunState {
            last_run: at.timestamp_millis(),
        })
        .map_err(|e| ConfbotError::parse(format!("failed to serialize run state: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        write_file(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| ConfbotError::io(&self.path, e))
    }
}
