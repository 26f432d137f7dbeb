//! Raw page fetcher with a read-through file cache.
//!
//! A fresh cached copy is returned without touching the network. Otherwise
//! the page is fetched once and the cache overwritten. Every failure is soft:
//! it is logged and the caller gets `None`.

use chrono::TimeDelta;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use confbot_shared::{ConfbotError, Result};
use confbot_storage::{ExpiringFileStore, Lookup};

/// What to do for a URL given its cache state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchPlan {
    /// Serve the cached payload.
    UseCached(String),
    /// Go to the network.
    Network,
}

/// Decide between the cache and the network. Read errors go to the network.
pub fn plan_fetch(cached: Lookup) -> FetchPlan {
    match cached {
        Lookup::Hit(payload) => FetchPlan::UseCached(payload),
        Lookup::Miss => FetchPlan::Network,
        Lookup::ReadError(detail) => {
            warn!(error = %detail, "raw cache unreadable, refetching");
            FetchPlan::Network
        }
    }
}

/// Fetches page bodies through an [`ExpiringFileStore`].
#[derive(Debug, Clone)]
pub struct RawFetcher {
    client: Client,
    store: ExpiringFileStore,
    max_age: TimeDelta,
}

impl RawFetcher {
    pub fn new(client: Client, store: ExpiringFileStore, max_age: TimeDelta) -> Self {
        Self {
            client,
            store,
            max_age,
        }
    }

    /// Page body for `url`, from cache when fresh. `None` on any failure.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Option<String> {
        let cached = self.store.get_fresh(url, self.max_age).await;
        if let FetchPlan::UseCached(payload) = plan_fetch(cached) {
            debug!("serving raw page from cache");
            return Some(payload);
        }

        let body = match get_text(&self.client, url).await {
            Ok(body) => body,
            Err(e) => {
                warn!(url, error = %e, "failed to fetch page");
                return None;
            }
        };

        if let Err(e) = self.store.put(url, &body).await {
            warn!(url, error = %e, "failed to cache fetched page");
            return None;
        }

        debug!(bytes = body.len(), "fetched and cached page");
        Some(body)
    }

    pub fn store(&self) -> &ExpiringFileStore {
        &self.store
    }
}

/// One GET. Non-2xx statuses are errors.
pub(crate) async fn get_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ConfbotError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ConfbotError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| ConfbotError::Network(format!("{url}: body read failed: {e}")))
}
