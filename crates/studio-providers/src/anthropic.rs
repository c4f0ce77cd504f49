//! Anthropic Messages API provider.
//!
//! Streams chat completions from `POST /v1/messages` with `stream: true` and
//! maps the SSE payloads (`content_block_start`, `content_block_delta`,
//! `message_delta`, ...) onto [`StreamEvent`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tracing::{debug, trace};

use studio_core::{ToolDefinition, Turn};

use crate::sse::parse_sse_response;
use crate::{
    BlockKind, CompletionRequest, Credentials, Delta, EventStream, LlmProvider, ProviderError,
    StopReason, StreamEvent, Usage,
};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    pub base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(ANTHROPIC_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: reqwest::Client::new(),
        }
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    messages: &'a [Turn],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
    stream: bool,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

impl<'a> From<&'a CompletionRequest> for MessagesRequest<'a> {
    fn from(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            temperature: request.temperature,
            messages: &request.messages,
            tools: &request.tools,
            stream: request.stream,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: WireMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: WireBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: WireDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: WireMessageDelta,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: WireError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text,
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Map one SSE `data:` payload to a stream event.
///
/// Returns `None` for payloads the engine does not consume (pings, thinking
/// deltas, unknown or malformed events).
fn map_payload(data: &str) -> Option<Result<StreamEvent, ProviderError>> {
    let event: WireEvent = match serde_json::from_str(data) {
        Ok(e) => e,
        Err(e) => {
            trace!(%e, data, "Failed to parse Anthropic event");
            return None;
        }
    };

    let mapped = match event {
        WireEvent::MessageStart { message } => StreamEvent::TurnDelta {
            stop_reason: None,
            usage: message.usage.map(Usage::from),
        },
        WireEvent::ContentBlockStart {
            index,
            content_block,
        } => StreamEvent::BlockStart {
            index,
            block: match content_block {
                WireBlock::Text => BlockKind::Text,
                WireBlock::ToolUse { id, name } => BlockKind::ToolUse { id, name },
                WireBlock::Other => BlockKind::Other,
            },
        },
        WireEvent::ContentBlockDelta { index, delta } => match delta {
            WireDelta::TextDelta { text } => StreamEvent::ContentDelta {
                index,
                delta: Delta::Text(text),
            },
            WireDelta::InputJsonDelta { partial_json } => StreamEvent::ContentDelta {
                index,
                delta: Delta::InputJson(partial_json),
            },
            WireDelta::Other => return None,
        },
        WireEvent::ContentBlockStop { index } => StreamEvent::BlockStop { index },
        WireEvent::MessageDelta { delta, usage } => StreamEvent::TurnDelta {
            stop_reason: delta.stop_reason.as_deref().map(StopReason::parse),
            usage: usage.map(Usage::from),
        },
        WireEvent::MessageStop => StreamEvent::StreamEnd,
        WireEvent::Error { error } => {
            return Some(Err(ProviderError::Remote {
                kind: error.kind,
                message: error.message,
            }));
        }
        WireEvent::Ping | WireEvent::Unknown => return None,
    };
    Some(Ok(mapped))
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body),
        429 => ProviderError::RateLimited(body),
        _ => ProviderError::Api {
            status,
            message: body,
        },
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "anthropic"
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        credentials: &Credentials,
    ) -> Result<EventStream, ProviderError> {
        let body = MessagesRequest::from(request);

        debug!(
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Streaming Anthropic Messages API"
        );

        let mut req_builder = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");

        req_builder = match credentials {
            Credentials::ApiKey { api_key } => req_builder.header("x-api-key", api_key),
            Credentials::OAuth { access_token } => {
                req_builder.header("authorization", format!("Bearer {access_token}"))
            }
        };

        let response = req_builder.json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let events = parse_sse_response(response).filter_map(|sse| match sse {
            Ok(sse) => map_payload(sse.data.trim()),
            Err(e) => Some(Err(e)),
        });

        Ok(Box::pin(events))
    }
}
