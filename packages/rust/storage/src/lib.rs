//! Filesystem-backed caches for confbot.
//!
//! Everything lives under one cache root:
//!
//! - `raw-html/<key>`: raw fetched pages ([`ExpiringFileStore`])
//! - `extracted-data/<key>`: cleaned content ([`CleanedStore`])
//! - `sessionize_cache.json`: feed snapshot ([`FeedCache`])
//! - `last_run_time.json`: last successful batch ([`RunStateStore`])
//!
//! Freshness is always the file's mtime compared against a [`Clock`].
//! The stores are unsynchronized and assume a single writing process.

pub mod cleaned;
pub mod clock;
pub mod event_log;
pub mod feed;
pub mod file_store;
pub mod key;
pub mod run_state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use confbot_shared::AppConfig;

pub use cleaned::CleanedStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use event_log::EventLog;
pub use feed::FeedCache;
pub use file_store::{ExpiringFileStore, Lookup, is_stale};
pub use key::{decode_key, encode_key};
pub use run_state::RunStateStore;

const RAW_DIR: &str = "raw-html";
const CLEANED_DIR: &str = "extracted-data";
const FEED_FILE: &str = "sessionize_cache.json";
const RUN_STATE_FILE: &str = "last_run_time.json";

/// Paths of every cache artifact under a root directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_DIR)
    }

    pub fn cleaned_dir(&self) -> PathBuf {
        self.root.join(CLEANED_DIR)
    }

    pub fn feed_path(&self) -> PathBuf {
        self.root.join(FEED_FILE)
    }

    pub fn run_state_path(&self) -> PathBuf {
        self.root.join(RUN_STATE_FILE)
    }
}

/// All stores for one cache root, built once at startup and shared.
#[derive(Debug, Clone)]
pub struct Caches {
    pub raw: ExpiringFileStore,
    pub cleaned: CleanedStore,
    pub feed: FeedCache,
    pub run_state: RunStateStore,
    pub interaction_log: EventLog,
    pub extraction_log: EventLog,
}

impl Caches {
    /// Build the stores described by `config`, all reading time from `clock`.
    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let layout = CacheLayout::new(&config.cache.root);
        Self {
            raw: ExpiringFileStore::new(layout.raw_dir(), clock.clone()),
            cleaned: CleanedStore::new(
                layout.cleaned_dir(),
                clock.clone(),
                config.cache.cleaned_max_age(),
            ),
            feed: FeedCache::new(layout.feed_path(), clock.clone(), config.cache.feed_max_age()),
            run_state: RunStateStore::new(layout.run_state_path()),
            interaction_log: EventLog::new(&config.logs.interaction_log, clock.clone()),
            extraction_log: EventLog::new(&config.logs.extraction_log, clock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn layout_paths() {
        let layout = CacheLayout::new("/var/cache/confbot");
        assert_eq!(layout.raw_dir(), PathBuf::from("/var/cache/confbot/raw-html"));
        assert_eq!(layout.cleaned_dir(), PathBuf::from("/var/cache/confbot/extracted-data"));
        assert_eq!(
            layout.feed_path(),
            PathBuf::from("/var/cache/confbot/sessionize_cache.json")
        );
        assert_eq!(
            layout.run_state_path(),
            PathBuf::from("/var/cache/confbot/last_run_time.json")
        );
    }

    #[tokio::test]
    async fn caches_share_one_root() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.cache.root = tmp.path().to_path_buf();
        let caches = Caches::from_config(&config, Arc::new(ManualClock::new(Utc::now())));

        caches.raw.put("https://conf.example.org/", "<html>").await.unwrap();
        caches.cleaned.put("https://conf.example.org/", "cleaned").await.unwrap();

        assert!(tmp.path().join("raw-html").is_dir());
        assert!(tmp.path().join("extracted-data").is_dir());
        assert_eq!(caches.feed.path(), tmp.path().join("sessionize_cache.json"));
    }
}
