//! Model transport abstraction.
//!
//! A provider implements [`LlmProvider`] to turn a [`CompletionRequest`]
//! (full transcript, system prompt, tool catalog) into an ordered stream of
//! typed [`StreamEvent`]s that the conversation engine decodes.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use studio_core::{ToolDefinition, Turn};

pub mod anthropic;
pub mod sse;

/// Credentials for authenticating with a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credentials {
    #[serde(rename = "api_key")]
    ApiKey { api_key: String },
    #[serde(rename = "oauth")]
    OAuth { access_token: String },
}

/// A request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub system: Option<String>,
    pub messages: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    pub stream: bool,
}

/// Token usage reported by the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// Why the model ended a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    ToolUse,
    EndTurn,
    MaxTokens,
    StopSequence,
    Other(String),
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tool_use" => Self::ToolUse,
            "end_turn" => Self::EndTurn,
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Kind of a content block opened by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    Text,
    ToolUse { id: String, name: String },
    /// Thinking and other block kinds the engine does not surface.
    Other,
}

/// Incremental payload of a content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delta {
    Text(String),
    InputJson(String),
}

/// A typed event from the model's response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    BlockStart { index: usize, block: BlockKind },
    ContentDelta { index: usize, delta: Delta },
    BlockStop { index: usize },
    TurnDelta {
        stop_reason: Option<StopReason>,
        usage: Option<Usage>,
    },
    StreamEnd,
}

/// Errors raised by the model transport.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("{kind}: {message}")]
    Remote { kind: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Ordered stream of decode events for one round trip.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

/// The model transport trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier (e.g., "anthropic").
    fn id(&self) -> &str;

    /// Send the request and stream back the response events.
    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<EventStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_parse() {
        assert_eq!(StopReason::parse("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::parse("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::parse("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::parse("stop_sequence"), StopReason::StopSequence);
        assert_eq!(
            StopReason::parse("refusal"),
            StopReason::Other("refusal".into())
        );
    }

    #[test]
    fn test_credentials_tagging() {
        let creds: Credentials =
            serde_json::from_str(r#"{"type":"api_key","api_key":"sk-1"}"#).unwrap();
        assert!(matches!(creds, Credentials::ApiKey { api_key } if api_key == "sk-1"));
    }
}
