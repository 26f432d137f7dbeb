//! URL-keyed file cache with age-based expiry.
//!
//! One file per URL, named by [`encode_key`]. The file's mtime is the only
//! freshness signal: nothing about expiry is stored, callers pass the max
//! age they care about at read time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use confbot_shared::{ConfbotError, Result};

use crate::clock::Clock;
use crate::key::{decode_key, encode_key};

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

/// Result of reading a cache entry.
///
/// Read failures are kept apart from plain misses so that a caller choosing
/// to treat them the same does so visibly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(String),
    Miss,
    ReadError(String),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Collapse to the payload, logging a read error before discarding it.
    pub fn into_hit(self) -> Option<String> {
        match self {
            Self::Hit(payload) => Some(payload),
            Self::Miss => None,
            Self::ReadError(detail) => {
                warn!(error = %detail, "cache read failed, treating as miss");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

/// Last-write time of a file, or `None` when it cannot be stat'd.
pub(crate) async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

/// Whether something written at `stored_at` has reached `max_age` by `now`.
/// A write time in the future counts as age zero.
pub fn is_stale(stored_at: DateTime<Utc>, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
    let age = (now - stored_at).max(TimeDelta::zero());
    age >= max_age
}

/// Expiry check for a single file. Anything that prevents reading the
/// mtime counts as expired.
pub(crate) async fn file_expired(path: &Path, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
    match modified_at(path).await {
        Some(stored_at) => is_stale(stored_at, now, max_age),
        None => true,
    }
}

/// Read a file into a [`Lookup`]: `NotFound` is a miss, anything else a read error.
pub(crate) async fn read_lookup(path: &Path) -> Lookup {
    match tokio::fs::read_to_string(path).await {
        Ok(payload) => Lookup::Hit(payload),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Lookup::Miss,
        Err(e) => Lookup::ReadError(format!("{}: {e}", path.display())),
    }
}

/// Create parent directories and overwrite the file.
pub(crate) async fn write_file(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ConfbotError::io(parent, e))?;
    }
    tokio::fs::write(path, payload)
        .await
        .map_err(|e| ConfbotError::io(path, e))
}

// ---------------------------------------------------------------------------
// ExpiringFileStore
// ---------------------------------------------------------------------------

/// A directory of cached payloads keyed by URL.
#[derive(Clone)]
pub struct ExpiringFileStore {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ExpiringFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringFileStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl ExpiringFileStore {
    /// The directory is created lazily on the first `put`.
    pub fn new(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            clock,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing the entry for `url`.
    pub fn path_for(&self, url: &str) -> PathBuf {
        self.dir.join(encode_key(url))
    }

    /// Read the entry for `url`, fresh or not.
    pub async fn get(&self, url: &str) -> Lookup {
        read_lookup(&self.path_for(url)).await
    }

    /// Read the entry for `url` only if it is younger than `max_age`.
    pub async fn get_fresh(&self, url: &str, max_age: TimeDelta) -> Lookup {
        if self.is_expired(url, max_age).await {
            debug!(url, "cache entry missing or expired");
            return Lookup::Miss;
        }
        self.get(url).await
    }

    /// Overwrite the entry for `url`.
    pub async fn put(&self, url: &str, payload: &str) -> Result<()> {
        write_file(&self.path_for(url), payload.as_bytes()).await
    }

    /// True when the entry is at least `max_age` old or cannot be stat'd.
    pub async fn is_expired(&self, url: &str, max_age: TimeDelta) -> bool {
        file_expired(&self.path_for(url), self.clock.now(), max_age).await
    }

    /// Last write time of the entry, if it exists.
    pub async fn stored_at(&self, url: &str) -> Option<DateTime<Utc>> {
        modified_at(&self.path_for(url)).await
    }

    /// Every readable entry as `(url, payload)`, in directory listing order.
    /// A missing directory is an empty store.
    pub async fn list(&self) -> Result<Vec<(String, String)>> {
        let mut entries = Vec::new();
        for (name, path) in self.entry_paths().await? {
            let url = match decode_key(&name) {
                Ok(url) => url,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping undecodable cache file");
                    continue;
                }
            };
            match read_lookup(&path).await.into_hit() {
                Some(payload) => entries.push((url, payload)),
                None => debug!(url, "cache entry vanished during listing"),
            }
        }
        Ok(entries)
    }

    /// Number of entries currently stored. Files whose names are not valid
    /// keys are skipped, as in [`list`](Self::list).
    pub async fn count(&self) -> Result<usize> {
        Ok(self
            .entry_paths()
            .await?
            .iter()
            .filter(|(name, _)| decode_key(name).is_ok())
            .count())
    }

    async fn entry_paths(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut read_dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ConfbotError::io(&self.dir, e)),
        };

        let mut paths = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| ConfbotError::io(&self.dir, e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                paths.push((name.to_string(), entry.path()));
            }
        }
        Ok(paths)
    }
}
