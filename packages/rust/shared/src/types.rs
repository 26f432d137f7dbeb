//! Core domain types for confbot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one batch run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Chat messages
// ---------------------------------------------------------------------------

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the ordered message list sent to a chat provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token usage reported (or estimated) for one completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Generated text plus usage metadata from a chat provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
}

// ---------------------------------------------------------------------------
// FeedSnapshot
// ---------------------------------------------------------------------------

/// Session, speaker, room, and category data from the structured feed.
///
/// Entries are kept as opaque JSON: the assistant only serializes them into
/// the prompt, it never interprets individual fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    #[serde(default)]
    pub sessions: Vec<serde_json::Value>,
    #[serde(default)]
    pub speakers: Vec<serde_json::Value>,
    #[serde(default)]
    pub questions: Vec<serde_json::Value>,
    #[serde(default)]
    pub categories: Vec<serde_json::Value>,
    #[serde(default)]
    pub rooms: Vec<serde_json::Value>,
}

impl FeedSnapshot {
    /// True when every collection is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
            && self.speakers.is_empty()
            && self.questions.is_empty()
            && self.categories.is_empty()
            && self.rooms.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Log records
// ---------------------------------------------------------------------------

/// Which extraction prompt produced a cleaned entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    Relevant,
    Faq,
}

/// Advisory token/cost accounting for one completed extraction.
///
/// Written to the extraction log after the cleaned content is stored.
/// Never read back by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub url: String,
    pub kind: ExtractionKind,
    pub input_token_estimate: f64,
    pub output_token_estimate: f64,
    pub total_token_estimate: f64,
    #[serde(rename = "estimatedCostUSD")]
    pub estimated_cost_usd: f64,
}

/// Rough token estimate: one token per four characters, not rounded.
pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / 4.0
}

impl ExtractionRecord {
    /// Build a record from the raw input and the cleaned output, priced per
    /// million tokens.
    pub fn estimate(
        url: &str,
        kind: ExtractionKind,
        input: &str,
        output: &str,
        input_price_per_million: f64,
        output_price_per_million: f64,
    ) -> Self {
        let input_token_estimate = estimate_tokens(input);
        let output_token_estimate = estimate_tokens(output);
        let estimated_cost_usd = (input_token_estimate / 1_000_000.0) * input_price_per_million
            + (output_token_estimate / 1_000_000.0) * output_price_per_million;

        Self {
            url: url.to_string(),
            kind,
            input_token_estimate,
            output_token_estimate,
            total_token_estimate: input_token_estimate + output_token_estimate,
            estimated_cost_usd,
        }
    }
}

/// One answered chat message, written to the interaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user: String,
    pub message: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}
