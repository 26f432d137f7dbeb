//! Shared types, error model, and configuration for confbot.
//!
//! This crate is the foundation depended on by all other confbot crates.
//! It provides:
//! - [`ConfbotError`] — the unified error type
//! - Domain types ([`Message`], [`FeedSnapshot`], [`ExtractionRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading and validation)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, ChatConfig, LlmConfig, LogsConfig, ModelFamily, ScheduleConfig,
    SourcesConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key,
};
pub use error::{ConfbotError, Result};
pub use types::{
    Completion, ExtractionKind, ExtractionRecord, FeedSnapshot, InteractionRecord, Message,
    Role, RunId, Usage,
};
