//! Callback sink the engine reports progress to.

use tokio::sync::mpsc;

use crate::AgentEvent;

/// Notifications emitted while a user message is processed.
///
/// These five callbacks are the only signals the engine produces. They are
/// invoked in causal order from the task driving the conversation.
pub trait ConversationSink: Send + Sync {
    fn on_text_delta(&self, text: &str);

    /// Invoked twice per tool call: with `{}` when the model opens the call,
    /// then with the final arguments just before dispatch.
    ///
    /// A call that is opened but never dispatched gets only the first
    /// notification and no `on_tool_call_resolved`. This happens when the
    /// response ends without a `tool_use` stop, or the turn is stopped or
    /// fails first. The turn's terminal notification closes such calls.
    fn on_tool_call_started(&self, id: &str, name: &str, args: &serde_json::Value);

    fn on_tool_call_resolved(&self, id: &str, result: &str);

    fn on_turn_finished(&self, text: &str);

    fn on_turn_failed(&self, message: &str);
}

/// Forwards every notification as an [`AgentEvent`] over an unbounded channel.
///
/// A closed receiver is not an error; events are dropped silently.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: AgentEvent) {
        let _ = self.tx.send(event);
    }
}

impl ConversationSink for ChannelSink {
    fn on_text_delta(&self, text: &str) {
        self.send(AgentEvent::TextDelta {
            text: text.to_string(),
        });
    }

    fn on_tool_call_started(&self, id: &str, name: &str, args: &serde_json::Value) {
        self.send(AgentEvent::ToolCallStarted {
            id: id.to_string(),
            name: name.to_string(),
            args: args.clone(),
        });
    }

    fn on_tool_call_resolved(&self, id: &str, result: &str) {
        self.send(AgentEvent::ToolCallResolved {
            id: id.to_string(),
            result: result.to_string(),
        });
    }

    fn on_turn_finished(&self, text: &str) {
        self.send(AgentEvent::TurnFinished {
            text: text.to_string(),
        });
    }

    fn on_turn_failed(&self, message: &str) {
        self.send(AgentEvent::TurnFailed {
            message: message.to_string(),
        });
    }
}
