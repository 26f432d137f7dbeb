//! Append-only event logs (interactions, extractions).
//!
//! One line per event: `<RFC 3339 timestamp> - <JSON>`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::SecondsFormat;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use confbot_shared::{ConfbotError, Result};

use crate::clock::Clock;

#[derive(Clone)]
pub struct EventLog {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("path", &self.path).finish_non_exhaustive()
    }
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory if needed.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| ConfbotError::parse(format!("failed to serialize log record: {e}")))?;
        let line = format!(
            "{} - {json}\n",
            self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true)
        );

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfbotError::io(parent, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| ConfbotError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| ConfbotError::io(&self.path, e))?;
        file.flush().await.map_err(|e| ConfbotError::io(&self.path, e))
    }
}
