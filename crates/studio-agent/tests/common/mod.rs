//! Scripted provider and recording executor shared by the engine tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use studio_agent::{AgentEvent, ChannelSink, ConversationEngine, EngineSettings};
use studio_providers::{
    BlockKind, CompletionRequest, Credentials, Delta, EventStream, LlmProvider, ProviderError,
    StopReason, StreamEvent, Usage,
};
use studio_tools::{ToolCatalog, ToolExecutor};

/// What the provider does for one request.
pub enum Script {
    /// Emit the events, then end the stream.
    Events(Vec<StreamEvent>),
    /// Emit the events, then never produce another one.
    Hang(Vec<StreamEvent>),
    /// Emit the events, then fail the stream.
    BreakAfter(Vec<StreamEvent>, ProviderError),
    /// Refuse to open the stream.
    Reject(ProviderError),
}

/// Replays prepared responses in order and records every request.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        _credentials: &Credentials,
    ) -> Result<EventStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Stream("script exhausted".into()))?;

        let stream: EventStream = match script {
            Script::Events(events) => Box::pin(futures::stream::iter(events.into_iter().map(Ok))),
            Script::Hang(events) => Box::pin(
                futures::stream::iter(events.into_iter().map(Ok))
                    .chain(futures::stream::pending()),
            ),
            Script::BreakAfter(events, error) => Box::pin(
                futures::stream::iter(events.into_iter().map(Ok))
                    .chain(futures::stream::iter([Err(error)])),
            ),
            Script::Reject(error) => return Err(error),
        };
        Ok(stream)
    }
}

type Handler = Box<dyn Fn(&str, &Value) -> anyhow::Result<String> + Send + Sync>;

/// Executor that logs call boundaries and answers through a closure.
pub struct RecordingExecutor {
    handler: Handler,
    delay: Duration,
    log: Mutex<Vec<String>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingExecutor {
    pub fn new(
        handler: impl Fn(&str, &Value) -> anyhow::Result<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_delay(handler, Duration::ZERO)
    }

    pub fn with_delay(
        handler: impl Fn(&str, &Value) -> anyhow::Result<String> + Send + Sync + 'static,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay,
            log: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// `start:<name>` / `end:<name>` entries in the order they happened.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, args: Value) -> anyhow::Result<String> {
        self.log.lock().unwrap().push(format!("start:{name}"));
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), args.clone()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = (self.handler)(name, &args);
        self.log.lock().unwrap().push(format!("end:{name}"));
        result
    }
}

pub fn engine(
    provider: Arc<ScriptedProvider>,
    executor: Arc<dyn ToolExecutor>,
    settings: EngineSettings,
) -> ConversationEngine {
    ConversationEngine::new(
        provider,
        Credentials::ApiKey {
            api_key: "test-key".into(),
        },
        executor,
        ToolCatalog::builtin(),
        settings.with_system_prompt("test prompt"),
    )
}

pub fn collect(rx: &mut mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn sink() -> (ChannelSink, mpsc::UnboundedReceiver<AgentEvent>) {
    ChannelSink::channel()
}

// --- event builders ---

/// A full text-only response: one text block with the given deltas.
pub fn text_response(deltas: &[&str], stop: StopReason) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::BlockStart {
        index: 0,
        block: BlockKind::Text,
    }];
    events.extend(deltas.iter().map(|d| StreamEvent::ContentDelta {
        index: 0,
        delta: Delta::Text((*d).to_string()),
    }));
    events.push(StreamEvent::BlockStop { index: 0 });
    events.push(turn_delta(stop));
    events.push(StreamEvent::StreamEnd);
    events
}

/// Events for one tool-use block whose arguments arrive in `chunks`.
pub fn tool_block(index: usize, id: &str, name: &str, chunks: &[&str]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::BlockStart {
        index,
        block: BlockKind::ToolUse {
            id: id.into(),
            name: name.into(),
        },
    }];
    events.extend(chunks.iter().map(|c| StreamEvent::ContentDelta {
        index,
        delta: Delta::InputJson((*c).to_string()),
    }));
    events.push(StreamEvent::BlockStop { index });
    events
}

/// A response consisting of the given tool blocks, ending with `tool_use`.
pub fn tool_response(blocks: Vec<Vec<StreamEvent>>) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = blocks.into_iter().flatten().collect();
    events.push(turn_delta(StopReason::ToolUse));
    events.push(StreamEvent::StreamEnd);
    events
}

pub fn turn_delta(stop: StopReason) -> StreamEvent {
    StreamEvent::TurnDelta {
        stop_reason: Some(stop),
        usage: Some(Usage {
            input_tokens: Some(10),
            output_tokens: Some(5),
        }),
    }
}
