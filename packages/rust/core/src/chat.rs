//! Chat responder: cached knowledge + conversation in, reply text out.

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use tracing::{error, info, instrument, warn};

use confbot_crawler::FeedFetcher;
use confbot_provider::ChatProvider;
use confbot_shared::{FeedSnapshot, InteractionRecord, Message};
use confbot_storage::{CleanedStore, Clock, EventLog};

use crate::retry::Retry;

/// Reply when the provider answered with nothing.
pub const EMPTY_RESPONSE_REPLY: &str =
    "I'm sorry, I couldn't retrieve the conference information at this time. Please try again later.";

/// Reply for every other failure.
pub const ERROR_REPLY: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again later.";

/// Built-in system prompt, used when the prompt file cannot be read.
pub fn default_system_prompt(event_name: &str) -> String {
    format!(
        "You are a helpful chatbot that provides information about the {event_name} conference \
         and activities related to it. Do not answer questions about any topic not related to \
         the conference experience. Always consider the {event_name} information when \
         responding. Keep your responses between 1 and 3 paragraphs, provide concise answers, \
         use bullet points when it makes sense, and include the most relevant link."
    )
}

// ---------------------------------------------------------------------------
// Message intake
// ---------------------------------------------------------------------------

/// The user's message with the bot mention removed, if the message is meant
/// for the bot (it mentions the bot, or replies to one of its messages).
pub fn addressed_to_bot(text: &str, bot_id: &str, is_reply_to_bot: bool) -> Option<String> {
    // Plain and nickname mention forms: <@id> and <@!id>.
    let mention = Regex::new(&format!("<@!?{}>", regex::escape(bot_id))).ok()?;
    if !mention.is_match(text) && !is_reply_to_bot {
        return None;
    }
    Some(mention.replace_all(text, "").trim().to_string())
}

/// One earlier message in the reply chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainMessage {
    pub from_bot: bool,
    pub content: String,
}

/// Ordered prompt: system prompt, knowledge, feed, reply chain (oldest
/// first), then the user's message.
pub fn build_prompt(
    system_prompt: &str,
    event_name: &str,
    cleaned: &str,
    feed: &FeedSnapshot,
    user_message: &str,
    reply_chain: &[ChainMessage],
) -> Vec<Message> {
    let feed_json = serde_json::to_string(feed).unwrap_or_else(|e| {
        warn!(error = %e, "failed to serialize feed snapshot");
        String::from("{}")
    });

    let mut messages = Vec::with_capacity(reply_chain.len() + 4);
    messages.push(Message::system(system_prompt));
    messages.push(Message::system(format!("{event_name} Info:\n{cleaned}")));
    messages.push(Message::system(format!("Schedule and Speakers:\n{feed_json}")));
    messages.extend(reply_chain.iter().map(|m| {
        if m.from_bot {
            Message::assistant(m.content.clone())
        } else {
            Message::user(m.content.clone())
        }
    }));
    messages.push(Message::user(user_message));
    messages
}

// ---------------------------------------------------------------------------
// Responder
// ---------------------------------------------------------------------------

/// An incoming chat message already known to be addressed to the bot.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Display name of the author, for the interaction log.
    pub user: String,
    pub message: String,
    pub reply_chain: Vec<ChainMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Answer,
    EmptyResponse,
    Error,
}

/// Text to deliver back to the conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub kind: ReplyKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub system_prompt_path: PathBuf,
    pub event_name: String,
    pub max_tokens: u32,
}

pub struct ChatResponder {
    provider: Arc<dyn ChatProvider>,
    retry: Retry,
    cleaned: CleanedStore,
    feed: FeedFetcher,
    interaction_log: EventLog,
    clock: Arc<dyn Clock>,
    settings: ChatSettings,
}

impl ChatResponder {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        retry: Retry,
        cleaned: CleanedStore,
        feed: FeedFetcher,
        interaction_log: EventLog,
        clock: Arc<dyn Clock>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            provider,
            retry,
            cleaned,
            feed,
            interaction_log,
            clock,
            settings,
        }
    }

    /// The configured system prompt, or the built-in one.
    pub async fn system_prompt(&self) -> String {
        match tokio::fs::read_to_string(&self.settings.system_prompt_path).await {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(
                    path = %self.settings.system_prompt_path.display(),
                    error = %e,
                    "failed to read system prompt, using built-in prompt"
                );
                default_system_prompt(&self.settings.event_name)
            }
        }
    }

    /// Answer one message. Never fails: errors become apology replies.
    #[instrument(skip_all, fields(user = %request.user))]
    pub async fn respond(&self, request: &ChatRequest) -> ChatReply {
        let cleaned = self.cleaned.get_all().await;
        let feed = self.feed.current().await;
        let system_prompt = self.system_prompt().await;
        let messages = build_prompt(
            &system_prompt,
            &self.settings.event_name,
            &cleaned,
            &feed,
            &request.message,
            &request.reply_chain,
        );

        let provider = &self.provider;
        let messages = &messages;
        let max_tokens = self.settings.max_tokens;
        let result = self
            .retry
            .run("chat", move || async move {
                provider.complete(messages, max_tokens).await
            })
            .await;

        let completion = match result {
            Ok(completion) => completion,
            Err(e) if e.is_empty_response() => {
                error!("provider returned an empty response");
                return ChatReply {
                    kind: ReplyKind::EmptyResponse,
                    text: EMPTY_RESPONSE_REPLY.to_string(),
                };
            }
            Err(e) => {
                error!(error = %e, "failed to generate reply");
                return ChatReply {
                    kind: ReplyKind::Error,
                    text: ERROR_REPLY.to_string(),
                };
            }
        };

        if let Some(usage) = &completion.usage {
            info!(
                model = self.provider.model(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "chat completion"
            );
        }

        let record = InteractionRecord {
            user: request.user.clone(),
            message: request.message.clone(),
            response: completion.content.clone(),
            timestamp: self.clock.now(),
        };
        if let Err(e) = self.interaction_log.append(&record).await {
            warn!(error = %e, "failed to append interaction log");
        }

        ChatReply {
            kind: ReplyKind::Answer,
            text: completion.content,
        }
    }
}
