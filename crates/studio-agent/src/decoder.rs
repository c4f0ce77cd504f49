//! Streaming decoder: turns provider stream events into text, finalized tool
//! calls and a turn-completion signal.

use serde_json::json;
use thiserror::Error;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use studio_core::ContentBlock;
use studio_providers::{
    BlockKind, Delta, EventStream, ProviderError, StopReason, StreamEvent, Usage,
};

use crate::sink::ConversationSink;

/// Why a model round trip ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnSignal {
    ContinueWithTools,
    NaturalEnd,
    LengthLimitEnd,
    Cancelled,
}

impl TurnSignal {
    fn from_stop_reason(reason: Option<&StopReason>) -> Self {
        match reason {
            Some(StopReason::ToolUse) => Self::ContinueWithTools,
            Some(StopReason::MaxTokens) => Self::LengthLimitEnd,
            Some(StopReason::EndTurn | StopReason::StopSequence | StopReason::Other(_)) | None => {
                Self::NaturalEnd
            }
        }
    }
}

/// A finalized tool-invocation record.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Everything decoded from one round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTurn {
    /// Concatenation of every text delta, in arrival order.
    pub text: String,
    /// Text spans and tool-use records in the order their blocks closed.
    pub content: Vec<ContentBlock>,
    /// Tool calls in finalization order.
    pub tool_calls: Vec<ToolCall>,
    pub signal: TurnSignal,
    pub usage: Usage,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("aborted")]
    Aborted,

    #[error(transparent)]
    Transport(#[from] ProviderError),
}

#[derive(Debug)]
enum OpenBlock {
    Text { index: usize, text: String },
    Tool { index: usize, id: String, name: String, args: String },
    Other { index: usize },
}

impl OpenBlock {
    fn index(&self) -> usize {
        match self {
            Self::Text { index, .. } | Self::Tool { index, .. } | Self::Other { index } => *index,
        }
    }
}

/// Synchronous decode state machine, fed one event at a time.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    text: String,
    content: Vec<ContentBlock>,
    tool_calls: Vec<ToolCall>,
    open: Vec<OpenBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, event: StreamEvent, sink: &dyn ConversationSink) {
        match event {
            StreamEvent::BlockStart { index, block } => self.start_block(index, block, sink),
            StreamEvent::ContentDelta { index, delta } => self.delta(index, delta, sink),
            StreamEvent::BlockStop { index } => {
                if let Some(pos) = self.open.iter().position(|b| b.index() == index) {
                    let block = self.open.remove(pos);
                    self.finalize(block);
                }
            }
            StreamEvent::TurnDelta { stop_reason, usage } => {
                if stop_reason.is_some() {
                    self.stop_reason = stop_reason;
                }
                if let Some(usage) = usage {
                    if usage.input_tokens.is_some() {
                        self.usage.input_tokens = usage.input_tokens;
                    }
                    if usage.output_tokens.is_some() {
                        self.usage.output_tokens = usage.output_tokens;
                    }
                }
            }
            StreamEvent::StreamEnd => self.close_all(),
        }
    }

    fn start_block(&mut self, index: usize, block: BlockKind, sink: &dyn ConversationSink) {
        let open = match block {
            BlockKind::Text => OpenBlock::Text {
                index,
                text: String::new(),
            },
            BlockKind::ToolUse { id, name } => {
                sink.on_tool_call_started(&id, &name, &json!({}));
                OpenBlock::Tool {
                    index,
                    id,
                    name,
                    args: String::new(),
                }
            }
            BlockKind::Other => OpenBlock::Other { index },
        };
        self.open.push(open);
    }

    fn delta(&mut self, index: usize, delta: Delta, sink: &dyn ConversationSink) {
        match delta {
            Delta::Text(text) => {
                self.text.push_str(&text);
                sink.on_text_delta(&text);
                match self.open.iter_mut().find(|b| b.index() == index) {
                    Some(OpenBlock::Text { text: span, .. }) => span.push_str(&text),
                    Some(_) => trace!(index, "text delta for non-text block"),
                    None => self.open.push(OpenBlock::Text { index, text }),
                }
            }
            Delta::InputJson(partial) => {
                match self.open.iter_mut().find(|b| b.index() == index) {
                    Some(OpenBlock::Tool { args, .. }) => args.push_str(&partial),
                    _ => trace!(index, "argument delta without an open tool block"),
                }
            }
        }
    }

    fn finalize(&mut self, block: OpenBlock) {
        match block {
            OpenBlock::Text { text, .. } => {
                if !text.is_empty() {
                    self.content.push(ContentBlock::Text { text });
                }
            }
            OpenBlock::Tool { id, name, args, .. } => {
                let input = parse_arguments(&name, &args);
                self.content.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                self.tool_calls.push(ToolCall { id, name, input });
            }
            OpenBlock::Other { .. } => {}
        }
    }

    fn close_all(&mut self) {
        for block in std::mem::take(&mut self.open) {
            self.finalize(block);
        }
    }

    /// Close any blocks left open and produce the decoded round trip.
    pub fn finish(mut self) -> DecodedTurn {
        self.close_all();
        DecodedTurn {
            signal: TurnSignal::from_stop_reason(self.stop_reason.as_ref()),
            text: self.text,
            content: self.content,
            tool_calls: self.tool_calls,
            usage: self.usage,
        }
    }
}

/// Parse accumulated argument bytes; anything that is not a JSON object
/// becomes `{}`.
fn parse_arguments(name: &str, raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() => value,
        Ok(_) => {
            warn!(tool = %name, "tool arguments are not an object, using {{}}");
            json!({})
        }
        Err(e) => {
            warn!(tool = %name, %e, "unparseable tool arguments, using {{}}");
            json!({})
        }
    }
}

/// Drive a [`StreamDecoder`] from the provider stream until it ends.
///
/// The cancellation token is checked before every event; once it fires the
/// stream is dropped and [`DecodeError::Aborted`] is returned.
pub async fn decode_stream(
    mut stream: EventStream,
    cancel: &CancellationToken,
    sink: &dyn ConversationSink,
) -> Result<DecodedTurn, DecodeError> {
    let mut decoder = StreamDecoder::new();

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DecodeError::Aborted),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(StreamEvent::StreamEnd)) => {
                decoder.feed(StreamEvent::StreamEnd, sink);
                break;
            }
            Some(Ok(event)) => decoder.feed(event, sink),
            Some(Err(e)) => return Err(DecodeError::Transport(e)),
            None => break,
        }
    }

    Ok(decoder.finish())
}
