//! Core pipeline orchestration and domain logic for confbot.
//!
//! This crate ties together fetching, extraction, and the caches into the
//! batch pipeline ([`pipeline::Orchestrator`]) and answers chat messages from
//! the cached knowledge ([`chat::ChatResponder`]).

pub mod chat;
pub mod extraction;
pub mod pipeline;
pub mod retry;
pub mod scheduler;

pub use chat::{ChainMessage, ChatReply, ChatRequest, ChatResponder, ChatSettings, ReplyKind};
pub use extraction::{Extractor, LlmExtractor};
pub use pipeline::{
    BatchReport, DailyOutcome, ExtractionPlan, ExtractionSettings, Orchestrator,
    ProgressReporter, SilentProgress, UrlOutcome, UrlReport, plan_extraction,
};
pub use retry::{Retry, RetryPolicy, Sleeper, TokioSleeper};
pub use scheduler::Scheduler;
