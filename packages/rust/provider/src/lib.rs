//! LLM chat providers.
//!
//! Everything that talks to a model goes through [`ChatProvider`]: an ordered
//! message list in, trimmed text plus usage out. [`EmptyResponse`] and
//! transport/API failures are distinct errors so callers can answer users
//! differently.
//!
//! [`EmptyResponse`]: confbot_shared::ConfbotError::EmptyResponse

pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use confbot_shared::{AppConfig, Completion, ConfbotError, Message, ModelFamily, Result};

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Submit a message list, receive text and usage, or fail.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Model name, for logs.
    fn model(&self) -> &str;

    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<Completion>;
}

/// Build the provider for the configured model with an already-resolved key.
pub fn provider_for_config(config: &AppConfig, api_key: String) -> Result<Arc<dyn ChatProvider>> {
    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.llm.timeout_secs))
        .build()
        .map_err(|e| ConfbotError::Provider(format!("failed to build HTTP client: {e}")))?;

    let model = config.llm.model.clone();
    let provider: Arc<dyn ChatProvider> = match config.llm.family()? {
        ModelFamily::OpenAi => {
            let mut p = OpenAiProvider::new(http_client, api_key, model);
            if let Some(url) = &config.llm.base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
        ModelFamily::Gemini => {
            let mut p = GeminiProvider::new(http_client, api_key, model);
            if let Some(url) = &config.llm.base_url {
                p = p.with_base_url(url);
            }
            Arc::new(p)
        }
    };

    tracing::debug!(model = provider.model(), "chat provider ready");
    Ok(provider)
}
