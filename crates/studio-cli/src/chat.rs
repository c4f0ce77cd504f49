//! `studio chat`: one-shot or interactive session against the configured model.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use studio_agent::prompt::build_system_prompt;
use studio_agent::{
    ConversationEngine, ConversationHandle, ConversationRegistry, EngineSettings, LoopState,
    TurnOutcome,
};
use studio_core::config::Config;
use studio_providers::Credentials;
use studio_providers::anthropic::AnthropicProvider;
use studio_tools::{
    EditorBuffer, PublishRequest, ToolCatalog, ToolContext, ToolRegistry, register_builtin_tools,
};

use crate::terminal::TerminalSink;

pub async fn run(config: &Config, message: Option<String>, model: Option<String>) -> anyhow::Result<()> {
    let (warnings, errors) = config.validate();
    for warning in &warnings {
        warn!("{warning}");
    }
    if let Some(first) = errors.first() {
        anyhow::bail!("invalid configuration: {first}");
    }

    let provider_config = config.provider();
    let api_key = provider_config.resolve_api_key().context(
        "no API key configured: set ANTHROPIC_API_KEY or provider.api_key in the config file",
    )?;

    let workspace = config.workspace_dir();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("creating workspace {}", workspace.display()))?;

    let (publish_tx, publish_rx) = mpsc::unbounded_channel();
    tokio::spawn(log_publish_requests(publish_rx));

    let mut tools = ToolRegistry::new(ToolContext {
        workspace: workspace.clone(),
        restrict_to_workspace: config.restrict_to_workspace(),
    });
    register_builtin_tools(&mut tools, EditorBuffer::default(), publish_tx);

    let catalog = ToolCatalog::builtin();
    let missing = tools.missing_from(&catalog);
    if !missing.is_empty() {
        warn!(?missing, "Catalog operations without a handler");
    }

    let mut settings = EngineSettings::from_config(config)
        .with_system_prompt(build_system_prompt(config, &catalog, &workspace));
    if let Some(model) = model {
        settings.model = model;
    }
    info!(model = %settings.model, workspace = %workspace.display(), "Starting chat");

    let engine = ConversationEngine::new(
        Arc::new(AnthropicProvider::new(provider_config.base_url.as_deref())),
        Credentials::ApiKey { api_key },
        Arc::new(tools),
        catalog,
        settings,
    );
    let registry = ConversationRegistry::new(Arc::new(engine));
    let handle = registry.create().await;
    let sink = TerminalSink::new();

    match message {
        Some(message) => {
            let outcome = run_turn(&handle, &message, &sink).await?;
            if outcome.state == LoopState::Failed {
                anyhow::bail!(outcome.error.unwrap_or_else(|| "turn failed".into()));
            }
        }
        None => repl(&handle, &sink).await?,
    }

    Ok(())
}

/// Read lines until EOF or `/exit`. Each line is one user message.
async fn repl(handle: &ConversationHandle, sink: &TerminalSink) -> anyhow::Result<()> {
    println!("Studio chat. Ctrl-C stops the current reply, /exit quits.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/exit" || line == "/quit" {
            break;
        }

        let outcome = run_turn(handle, line, sink).await?;
        tracing::debug!(
            state = ?outcome.state,
            round_trips = outcome.round_trips,
            tool_calls = outcome.tool_calls,
            "Turn complete"
        );
    }

    Ok(())
}

/// Send one message, turning Ctrl-C into a stop request for this turn only.
async fn run_turn(
    handle: &ConversationHandle,
    message: &str,
    sink: &TerminalSink,
) -> anyhow::Result<TurnOutcome> {
    let turn = handle.send(message, sink);
    tokio::pin!(turn);

    loop {
        tokio::select! {
            outcome = &mut turn => return Ok(outcome?),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                handle.stop();
            }
        }
    }
}

async fn log_publish_requests(mut rx: mpsc::UnboundedReceiver<PublishRequest>) {
    while let Some(request) = rx.recv().await {
        info!(
            path = %request.path.display(),
            format = %request.format,
            "Publish requested"
        );
        println!(
            "\n[publish] {} -> {} (queued)",
            request.path.display(),
            request.format
        );
    }
}
