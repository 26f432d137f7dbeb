//! URL ↔ cache key encoding.
//!
//! Keys are file names. Every byte outside ASCII alphanumerics and `-_.~` is
//! percent-encoded (uppercase hex), so `/`, `:`, `?` and `%` itself never
//! reach the filesystem and distinct URLs map to distinct names.

use confbot_shared::{ConfbotError, Result};

/// Encode a URL into a file-name-safe cache key.
pub fn encode_key(url: &str) -> String {
    urlencoding::encode(url).into_owned()
}

/// Recover the URL a cache key was produced from.
pub fn decode_key(key: &str) -> Result<String> {
    urlencoding::decode(key)
        .map(|s| s.into_owned())
        .map_err(|e| ConfbotError::validation(format!("invalid cache key '{key}': {e}")))
}
