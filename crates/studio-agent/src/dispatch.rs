//! Tool dispatch: runs one finalized tool call against the executor.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use studio_core::ContentBlock;
use studio_tools::ToolExecutor;

use crate::decoder::ToolCall;
use crate::sink::ConversationSink;

/// Outcome of one executor call, paired with the call's id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

impl From<ToolResult> for ContentBlock {
    fn from(result: ToolResult) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: result.tool_use_id,
            content: result.content,
            is_error: result.is_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed(ToolResult),
    /// Cancelled while the executor was running. The call keeps running in
    /// the background and its result is discarded.
    Aborted,
}

/// Announce the final arguments, run the executor and report the result.
///
/// Executor failures never escape: they become a result whose content is
/// `Error: <message>` with the error flag set.
pub async fn dispatch_tool(
    executor: &Arc<dyn ToolExecutor>,
    call: &ToolCall,
    cancel: &CancellationToken,
    sink: &dyn ConversationSink,
) -> DispatchOutcome {
    if cancel.is_cancelled() {
        return DispatchOutcome::Aborted;
    }

    sink.on_tool_call_started(&call.id, &call.name, &call.input);
    info!(tool = %call.name, id = %call.id, "Executing tool");

    let task = {
        let executor = Arc::clone(executor);
        let name = call.name.clone();
        let input = call.input.clone();
        tokio::spawn(async move { executor.execute(&name, input).await })
    };

    let joined = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!(tool = %call.name, id = %call.id, "Tool call detached after stop");
            return DispatchOutcome::Aborted;
        }
        joined = task => joined,
    };

    let (content, is_error) = match joined {
        Ok(Ok(output)) => (output, false),
        Ok(Err(e)) => {
            warn!(tool = %call.name, %e, "Tool execution error");
            (format!("Error: {e}"), true)
        }
        Err(e) => {
            warn!(tool = %call.name, %e, "Tool task failed");
            (format!("Error: {e}"), true)
        }
    };

    sink.on_tool_call_resolved(&call.id, &content);
    DispatchOutcome::Completed(ToolResult {
        tool_use_id: call.id.clone(),
        content,
        is_error,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::AgentEvent;
    use crate::sink::ChannelSink;

    struct FixedExecutor;

    #[async_trait]
    impl ToolExecutor for FixedExecutor {
        async fn execute(&self, name: &str, args: serde_json::Value) -> anyhow::Result<String> {
            match name {
                "read_file" => Ok(format!("contents of {}", args["path"].as_str().unwrap_or("?"))),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("late".into())
                }
                _ => anyhow::bail!("disk full"),
            }
        }
    }

    fn call(name: &str, input: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "t1".into(),
            name: name.into(),
            input,
        }
    }

    #[tokio::test]
    async fn test_success_emits_final_args_then_result() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(FixedExecutor);
        let (sink, mut rx) = ChannelSink::channel();

        let outcome = dispatch_tool(
            &executor,
            &call("read_file", json!({"path": "/a.md"})),
            &CancellationToken::new(),
            &sink,
        )
        .await;

        assert_eq!(
            outcome,
            DispatchOutcome::Completed(ToolResult {
                tool_use_id: "t1".into(),
                content: "contents of /a.md".into(),
                is_error: false,
            })
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::ToolCallStarted {
                id: "t1".into(),
                name: "read_file".into(),
                args: json!({"path": "/a.md"}),
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::ToolCallResolved {
                id: "t1".into(),
                result: "contents of /a.md".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_executor_error_becomes_result() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(FixedExecutor);
        let (sink, _rx) = ChannelSink::channel();

        let outcome = dispatch_tool(
            &executor,
            &call("write_file", json!({})),
            &CancellationToken::new(),
            &sink,
        )
        .await;

        let DispatchOutcome::Completed(result) = outcome else {
            panic!("expected a completed dispatch");
        };
        assert_eq!(result.content, "Error: disk full");
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch_does_nothing() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(FixedExecutor);
        let (sink, mut rx) = ChannelSink::channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = dispatch_tool(&executor, &call("read_file", json!({})), &cancel, &sink).await;
        assert_eq!(outcome, DispatchOutcome::Aborted);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_execution_detaches() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(FixedExecutor);
        let (sink, mut rx) = ChannelSink::channel();
        let cancel = CancellationToken::new();

        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                cancel.cancel();
            })
        };

        let outcome = dispatch_tool(&executor, &call("slow", json!({})), &cancel, &sink).await;
        stopper.await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Aborted);
        assert!(matches!(
            rx.try_recv().unwrap(),
            AgentEvent::ToolCallStarted { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_result_into_content_block() {
        let block: ContentBlock = ToolResult {
            tool_use_id: "t1".into(),
            content: "Error: disk full".into(),
            is_error: true,
        }
        .into();
        assert_eq!(
            block,
            ContentBlock::ToolResult {
                tool_use_id: "t1".into(),
                content: "Error: disk full".into(),
                is_error: true,
            }
        );
    }
}
