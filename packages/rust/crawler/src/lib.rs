//! HTTP side of confbot: page and feed fetching.
//!
//! This crate provides:
//! - [`RawFetcher`]: page bodies through the raw file cache
//! - [`FeedFetcher`]: the structured session/speaker feed through the feed cache

pub mod feed;
pub mod fetcher;

use std::time::Duration;

use reqwest::Client;

use confbot_shared::{ConfbotError, Result};

pub use feed::FeedFetcher;
pub use fetcher::{FetchPlan, RawFetcher, plan_fetch};

/// User-Agent string for page and feed requests.
const USER_AGENT: &str = concat!("Confbot/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the fetchers.
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .build()
        .map_err(|e| ConfbotError::Network(format!("failed to build HTTP client: {e}")))
}
