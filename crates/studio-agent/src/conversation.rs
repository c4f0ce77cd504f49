//! The conversation loop: one user message in, as many model round trips as
//! the model asks for, one terminal notification out.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use studio_core::config::Config;
use studio_core::{ContentBlock, Transcript, Turn};
use studio_providers::{CompletionRequest, Credentials, LlmProvider, Usage};
use studio_tools::{ToolCatalog, ToolExecutor};

use crate::decoder::{DecodeError, TurnSignal, decode_stream};
use crate::dispatch::{DispatchOutcome, dispatch_tool};
use crate::sink::ConversationSink;

/// Text reported through `on_turn_finished` when a turn is stopped.
pub const STOPPED_MARKER: &str = "[Stopped]";

/// Where the loop is in processing the current user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    AwaitingModel,
    DispatchingTools,
    Done,
    Aborted,
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Failed)
    }

    /// Whether a new user message may be processed from this state.
    pub fn accepts_message(self) -> bool {
        self == Self::Idle || self.is_terminal()
    }
}

/// Loop state shared between a conversation and whoever observes it.
pub type SharedState = Arc<Mutex<LoopState>>;

/// A conversation: its id, transcript and loop state. The state lives in a
/// shared cell so it can be read while a turn holds the conversation.
#[derive(Debug)]
pub struct Conversation {
    id: String,
    transcript: Transcript,
    state: SharedState,
}

impl Conversation {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_transcript(id, Transcript::new())
    }

    /// Resume a conversation from a previously saved transcript.
    pub fn with_transcript(id: impl Into<String>, transcript: Transcript) -> Self {
        Self {
            id: id.into(),
            transcript,
            state: Arc::new(Mutex::new(LoopState::Idle)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle on the state cell, updated as the loop moves between states.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}

/// Request parameters shared by every round trip.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
    pub max_tool_iterations: u32,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.model(),
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
            system_prompt: None,
            max_tool_iterations: config.max_tool_iterations(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Summary of one processed user message.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Terminal state: `Done`, `Aborted` or `Failed`.
    pub state: LoopState,
    /// The text passed to `on_turn_finished` (empty when failed).
    pub text: String,
    pub error: Option<String>,
    /// The last turn-completion signal observed.
    pub signal: Option<TurnSignal>,
    pub usage: Usage,
    pub tool_calls: u32,
    pub round_trips: u32,
}

/// Drives conversations against a model provider and a tool executor.
pub struct ConversationEngine {
    provider: Arc<dyn LlmProvider>,
    credentials: Credentials,
    executor: Arc<dyn ToolExecutor>,
    catalog: ToolCatalog,
    settings: EngineSettings,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        credentials: Credentials,
        executor: Arc<dyn ToolExecutor>,
        catalog: ToolCatalog,
        settings: EngineSettings,
    ) -> Self {
        Self {
            provider,
            credentials,
            executor,
            catalog,
            settings,
        }
    }

    fn build_request(&self, transcript: &Transcript) -> CompletionRequest {
        CompletionRequest {
            model: self.settings.model.clone(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: self.settings.system_prompt.clone(),
            messages: transcript.turns().to_vec(),
            tools: self.catalog.definitions().to_vec(),
            stream: true,
        }
    }

    /// Process one user message to a terminal state.
    ///
    /// The transcript gains the user turn up front, then one assistant turn
    /// plus one tool-result turn per completed tool round, then the final
    /// assistant text. A stopped or failed round trip leaves no trace in the
    /// transcript. Exactly one of `on_turn_finished` / `on_turn_failed` is
    /// invoked before this returns.
    pub async fn process(
        &self,
        conversation: &mut Conversation,
        message: &str,
        cancel: &CancellationToken,
        sink: &dyn ConversationSink,
    ) -> TurnOutcome {
        let mut run = Run::default();

        conversation.set_state(LoopState::Idle);
        conversation.transcript.push(Turn::user_text(message));

        for iteration in 0..self.settings.max_tool_iterations {
            debug!(
                conversation = %conversation.id,
                iteration,
                turns = conversation.transcript.len(),
                "Conversation loop iteration"
            );

            if cancel.is_cancelled() {
                return run.abort(conversation, sink);
            }
            conversation.set_state(LoopState::AwaitingModel);

            let request = self.build_request(&conversation.transcript);
            let opened = tokio::select! {
                biased;
                () = cancel.cancelled() => return run.abort(conversation, sink),
                opened = self.provider.stream(&request, &self.credentials) => opened,
            };
            let stream = match opened {
                Ok(stream) => stream,
                Err(e) => return run.fail(conversation, e.to_string(), sink),
            };

            let decoded = match decode_stream(stream, cancel, sink).await {
                Ok(decoded) => decoded,
                Err(DecodeError::Aborted) => return run.abort(conversation, sink),
                Err(DecodeError::Transport(e)) => {
                    return run.fail(conversation, e.to_string(), sink);
                }
            };

            run.round_trips += 1;
            run.text.push_str(&decoded.text);
            run.signal = Some(decoded.signal);
            add_usage(&mut run.usage, decoded.usage);

            if decoded.signal != TurnSignal::ContinueWithTools || decoded.tool_calls.is_empty() {
                if !decoded.tool_calls.is_empty() {
                    warn!(
                        conversation = %conversation.id,
                        signal = ?decoded.signal,
                        calls = decoded.tool_calls.len(),
                        "Response ended without tool_use; tool calls not dispatched"
                    );
                }
                let text_units: Vec<ContentBlock> = decoded
                    .content
                    .into_iter()
                    .filter(|b| matches!(b, ContentBlock::Text { .. }))
                    .collect();
                if !text_units.is_empty() {
                    conversation
                        .transcript
                        .push(Turn::assistant_blocks(text_units));
                }
                return run.finish(conversation, sink);
            }

            conversation.set_state(LoopState::DispatchingTools);
            let mut results = Vec::with_capacity(decoded.tool_calls.len());
            for call in &decoded.tool_calls {
                match dispatch_tool(&self.executor, call, cancel, sink).await {
                    DispatchOutcome::Completed(result) => {
                        run.tool_calls += 1;
                        results.push(ContentBlock::from(result));
                    }
                    DispatchOutcome::Aborted => return run.abort(conversation, sink),
                }
            }

            conversation
                .transcript
                .push(Turn::assistant_blocks(decoded.content));
            conversation.transcript.push(Turn::tool_results(results));
        }

        let limit = self.settings.max_tool_iterations;
        run.fail(
            conversation,
            format!("Tool iteration limit reached ({limit})"),
            sink,
        )
    }
}

fn add_usage(total: &mut Usage, round: Usage) {
    if let Some(n) = round.input_tokens {
        total.input_tokens = Some(total.input_tokens.unwrap_or(0) + n);
    }
    if let Some(n) = round.output_tokens {
        total.output_tokens = Some(total.output_tokens.unwrap_or(0) + n);
    }
}

/// Accumulators for one `process` call.
#[derive(Default)]
struct Run {
    text: String,
    signal: Option<TurnSignal>,
    usage: Usage,
    tool_calls: u32,
    round_trips: u32,
}

impl Run {
    fn outcome(self, state: LoopState, text: String, error: Option<String>) -> TurnOutcome {
        TurnOutcome {
            state,
            text,
            error,
            signal: self.signal,
            usage: self.usage,
            tool_calls: self.tool_calls,
            round_trips: self.round_trips,
        }
    }

    fn finish(mut self, conversation: &mut Conversation, sink: &dyn ConversationSink) -> TurnOutcome {
        conversation.set_state(LoopState::Done);
        info!(
            conversation = %conversation.id,
            round_trips = self.round_trips,
            tool_calls = self.tool_calls,
            "Turn finished"
        );
        sink.on_turn_finished(&self.text);
        let text = std::mem::take(&mut self.text);
        self.outcome(LoopState::Done, text, None)
    }

    fn abort(mut self, conversation: &mut Conversation, sink: &dyn ConversationSink) -> TurnOutcome {
        conversation.set_state(LoopState::Aborted);
        self.signal = Some(TurnSignal::Cancelled);
        info!(conversation = %conversation.id, "Turn stopped");
        sink.on_turn_finished(STOPPED_MARKER);
        self.outcome(LoopState::Aborted, STOPPED_MARKER.to_string(), None)
    }

    fn fail(
        self,
        conversation: &mut Conversation,
        message: String,
        sink: &dyn ConversationSink,
    ) -> TurnOutcome {
        conversation.set_state(LoopState::Failed);
        error!(conversation = %conversation.id, error = %message, "Turn failed");
        sink.on_turn_failed(&message);
        self.outcome(LoopState::Failed, String::new(), Some(message))
    }
}
