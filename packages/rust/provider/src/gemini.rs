//! Gemini `generateContent` client.
//!
//! The message list is flattened into a single user turn, one message per
//! line. When the API omits usage metadata, completion tokens are estimated
//! from the reply's word count.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use confbot_shared::{Completion, ConfbotError, Message, Result, Usage};

use crate::ChatProvider;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

/// Flatten chat messages into one prompt, one message per line.
pub(crate) fn flatten_messages(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `POST {base_url}/models/{model}:generateContent?key=...`
#[derive(Clone)]
pub struct GeminiProvider {
    http_client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    pub fn new(http_client: Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<Completion> {
        let start = std::time::Instant::now();
        let prompt = flatten_messages(messages);
        let prompt_words = prompt.split_whitespace().count() as u64;
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: max_tokens,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key.
                let e = e.without_url();
                warn!(error = %e, "Gemini request failed");
                ConfbotError::Provider(format!("Gemini request failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Gemini API error");
            return Err(ConfbotError::Provider(format!(
                "Gemini API error ({status}): {error_text}"
            )));
        }

        let raw: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ConfbotError::Provider(format!("invalid Gemini response: {e}")))?;

        let content = raw
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
                    .trim()
                    .to_string()
            })
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ConfbotError::EmptyResponse);
        }

        let usage = match raw.usage_metadata {
            Some(meta) => Usage {
                prompt_tokens: meta.prompt_token_count,
                completion_tokens: meta.candidates_token_count,
                total_tokens: meta.total_token_count,
            },
            None => {
                let words = content.split_whitespace().count() as u64;
                Usage {
                    prompt_tokens: prompt_words,
                    completion_tokens: words,
                    total_tokens: prompt_words + words,
                }
            }
        };

        debug!(
            model = %self.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "Gemini completion"
        );

        Ok(Completion {
            content,
            usage: Some(usage),
        })
    }
}
