//! Extraction client: raw page text in, cleaned text out.
//!
//! Two prompt variants: general relevant-content extraction with named
//! boilerplate sections stripped, and FAQ question/answer extraction.
//! Provider calls go through the shared [`Retry`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use confbot_provider::ChatProvider;
use confbot_shared::{ConfbotError, ExtractionKind, Message, Result};

use crate::retry::Retry;

const RELEVANT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that extracts relevant information from given content.";
const FAQ_SYSTEM_PROMPT: &str = "You are a helpful assistant that extracts FAQs from given content.";

/// Turns raw page text into cleaned text.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Concise relevant content, with the `exclude` sections removed.
    async fn extract_relevant(&self, text: &str, exclude: &[String]) -> Result<String>;

    /// Every question and answer found in FAQ content.
    async fn extract_faq(&self, text: &str) -> Result<String>;

    /// Dispatch on the extraction kind.
    async fn extract(&self, kind: ExtractionKind, text: &str, exclude: &[String]) -> Result<String> {
        match kind {
            ExtractionKind::Relevant => self.extract_relevant(text, exclude).await,
            ExtractionKind::Faq => self.extract_faq(text).await,
        }
    }
}

/// Messages for relevant-content extraction.
pub fn relevant_prompt(text: &str, exclude: &[String]) -> Vec<Message> {
    vec![
        Message::system(RELEVANT_SYSTEM_PROMPT),
        Message::user(format!(
            "Extract relevant information from the following content, removing {}:\n\n{text}",
            exclude.join(", ")
        )),
    ]
}

/// Messages for FAQ extraction.
pub fn faq_prompt(text: &str) -> Vec<Message> {
    vec![
        Message::system(FAQ_SYSTEM_PROMPT),
        Message::user(format!(
            "Extract all questions and answers from the following FAQ content:\n\n{text}"
        )),
    ]
}

/// [`Extractor`] backed by a chat provider.
#[derive(Clone)]
pub struct LlmExtractor {
    provider: Arc<dyn ChatProvider>,
    retry: Retry,
    max_tokens: u32,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn ChatProvider>, retry: Retry, max_tokens: u32) -> Self {
        Self {
            provider,
            retry,
            max_tokens,
        }
    }

    async fn complete(&self, what: &str, messages: Vec<Message>) -> Result<String> {
        let provider = &self.provider;
        let messages = &messages;
        let max_tokens = self.max_tokens;
        self.retry
            .run(what, move || async move {
                let completion = provider.complete(messages, max_tokens).await?;
                let cleaned = completion.content.trim();
                if cleaned.is_empty() {
                    return Err(ConfbotError::EmptyResponse);
                }
                if let Some(usage) = &completion.usage {
                    debug!(
                        model = provider.model(),
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "extraction completion"
                    );
                }
                Ok(cleaned.to_string())
            })
            .await
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    #[instrument(skip_all, fields(chars = text.len()))]
    async fn extract_relevant(&self, text: &str, exclude: &[String]) -> Result<String> {
        self.complete("extract_relevant", relevant_prompt(text, exclude))
            .await
    }

    #[instrument(skip_all, fields(chars = text.len()))]
    async fn extract_faq(&self, text: &str) -> Result<String> {
        self.complete("extract_faq", faq_prompt(text)).await
    }
}
