//! Conversation engine: orchestrates model round trips with tool-calling loops.
//!
//! The engine takes a user message, streams the model response through the
//! [`decoder`], runs any requested tools through [`dispatch`], appends the
//! results to the transcript and repeats until the model ends its turn. Every
//! step is reported to a [`ConversationSink`], and [`ChannelSink`] turns those
//! notifications into a stream of [`AgentEvent`]s.

use serde::{Deserialize, Serialize};

pub mod conversation;
pub mod decoder;
pub mod dispatch;
pub mod prompt;
pub mod registry;
pub mod sink;

pub use conversation::{
    Conversation, ConversationEngine, EngineSettings, LoopState, STOPPED_MARKER, SharedState,
    TurnOutcome,
};
pub use decoder::{DecodeError, DecodedTurn, ToolCall, TurnSignal};
pub use registry::{ConversationHandle, ConversationRegistry};
pub use sink::{ChannelSink, ConversationSink};

/// Events emitted by the engine while processing a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// A chunk of assistant text, forwarded as soon as it arrives.
    #[serde(rename = "text_delta")]
    TextDelta { text: String },

    /// A tool call is beginning. Sent once with empty arguments when the
    /// model opens the call and again with final arguments before dispatch.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted {
        id: String,
        name: String,
        args: serde_json::Value,
    },

    /// A tool call has completed; `result` is the output or `Error: ...`.
    #[serde(rename = "tool_call_resolved")]
    ToolCallResolved { id: String, result: String },

    /// The turn ended. Carries the accumulated text, or `[Stopped]`.
    #[serde(rename = "turn_finished")]
    TurnFinished { text: String },

    /// The turn failed on a transport error.
    #[serde(rename = "turn_failed")]
    TurnFailed { message: String },
}
