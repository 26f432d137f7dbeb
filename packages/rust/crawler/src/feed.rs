//! Structured feed fetcher, writing through a [`FeedCache`].

use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use confbot_shared::{ConfbotError, FeedSnapshot, Result};
use confbot_storage::FeedCache;

use crate::fetcher::get_text;

/// Fetches the session/speaker feed and keeps the cached snapshot current.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    url: Url,
    cache: FeedCache,
}

impl FeedFetcher {
    pub fn new(client: Client, feed_url: &str, cache: FeedCache) -> Result<Self> {
        let url = Url::parse(feed_url)
            .map_err(|e| ConfbotError::validation(format!("invalid feed URL '{feed_url}': {e}")))?;
        Ok(Self { client, url, cache })
    }

    pub fn cache(&self) -> &FeedCache {
        &self.cache
    }

    /// Fetch and parse the feed without touching the cache.
    pub async fn fetch(&self) -> Result<FeedSnapshot> {
        let body = get_text(&self.client, self.url.as_str()).await?;
        serde_json::from_str(&body)
            .map_err(|e| ConfbotError::parse(format!("{}: invalid feed JSON: {e}", self.url)))
    }

    /// Replace the cached snapshot with a fresh fetch.
    ///
    /// Returns `Ok(false)` when the feed could not be fetched or parsed; the
    /// previous snapshot stays in place. Only a failed cache write is an error.
    #[instrument(skip_all, fields(url = %self.url))]
    pub async fn refresh(&self) -> Result<bool> {
        let snapshot = match self.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "feed refresh failed, keeping previous snapshot");
                return Ok(false);
            }
        };

        self.cache.write(&snapshot).await?;
        info!(
            sessions = snapshot.sessions.len(),
            speakers = snapshot.speakers.len(),
            "feed snapshot refreshed"
        );
        Ok(true)
    }

    /// The snapshot to answer with right now: the cached one while fresh,
    /// otherwise a new fetch, falling back to whatever is cached (or empty).
    pub async fn current(&self) -> FeedSnapshot {
        if self.cache.is_fresh().await {
            debug!("feed snapshot is fresh");
            return self.cache.snapshot().await;
        }

        match self.fetch().await {
            Ok(snapshot) => {
                if let Err(e) = self.cache.write(&snapshot).await {
                    warn!(error = %e, "failed to cache feed snapshot");
                }
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "feed fetch failed, using cached snapshot");
                self.cache.snapshot().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeDelta, Utc};
    use confbot_storage::ManualClock;
    use serde_json::json;

    use crate::http_client;

    fn feed_body() -> serde_json::Value {
        json!({
            "sessions": [{"id": "42", "title": "Hardware Hacking 101", "roomId": 7}],
            "speakers": [{"id": "s9", "fullName": "Grace Example"}],
            "questions": [],
            "categories": [{"id": 1, "title": "Track"}],
            "rooms": [{"id": 7, "name": "Ballroom A"}]
        })
    }

    fn feed_fetcher(
        server_uri: &str,
        dir: &std::path::Path,
    ) -> (FeedFetcher, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = FeedCache::new(
            dir.join("sessionize_cache.json"),
            clock.clone(),
            TimeDelta::minutes(60),
        );
        let client = http_client(std::time::Duration::from_secs(5)).unwrap();
        let fetcher = FeedFetcher::new(client, &format!("{server_uri}/api/v2/all"), cache).unwrap();
        (fetcher, clock)
    }

    async fn request_count(server: &wiremock::MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[tokio::test]
    async fn refresh_writes_snapshot() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/api/v2/all"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(feed_body()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let (fetcher, _) = feed_fetcher(&server.uri(), tmp.path());

        assert!(fetcher.refresh().await.unwrap());
        let snapshot = fetcher.cache().snapshot().await;
        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.rooms[0]["name"], "Ballroom A");
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let (fetcher, _) = feed_fetcher(&server.uri(), tmp.path());
        let previous: FeedSnapshot = serde_json::from_value(feed_body()).unwrap();
        fetcher.cache().write(&previous).await.unwrap();

        assert!(!fetcher.refresh().await.unwrap());
        assert_eq!(fetcher.cache().snapshot().await, previous);
    }

    #[tokio::test]
    async fn invalid_json_is_not_cached() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let (fetcher, _) = feed_fetcher(&server.uri(), tmp.path());

        assert!(!fetcher.refresh().await.unwrap());
        assert!(!fetcher.cache().path().exists());
    }

    #[tokio::test]
    async fn current_reads_through_when_stale() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(feed_body()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let (fetcher, clock) = feed_fetcher(&server.uri(), tmp.path());

        // Nothing cached: fetch.
        assert_eq!(fetcher.current().await.speakers.len(), 1);
        assert_eq!(request_count(&server).await, 1);

        // Fresh: no fetch.
        fetcher.current().await;
        assert_eq!(request_count(&server).await, 1);

        // Stale: fetch again.
        clock.advance(TimeDelta::minutes(61));
        fetcher.current().await;
        assert_eq!(request_count(&server).await, 2);
    }

    #[tokio::test]
    async fn current_falls_back_to_empty_snapshot() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let (fetcher, _) = feed_fetcher(&server.uri(), tmp.path());

        assert_eq!(fetcher.current().await, FeedSnapshot::default());
    }

    #[test]
    fn rejects_invalid_feed_url() {
        let tmp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = FeedCache::new(tmp.path().join("feed.json"), clock, TimeDelta::minutes(60));
        let client = http_client(std::time::Duration::from_secs(5)).unwrap();
        assert!(FeedFetcher::new(client, "not a url", cache).is_err());
    }
}
