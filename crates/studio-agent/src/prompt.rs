//! System prompt builder.

use std::path::Path;

use studio_core::config::Config;
use studio_tools::ToolCatalog;

const DEFAULT_IDENTITY: &str = "You are a writing and publishing assistant inside a document studio. \
     You help the author draft, edit and publish markdown documents using the available tools.";

/// Workspace file whose contents are appended as extra instructions.
pub const INSTRUCTIONS_FILE: &str = "STUDIO.md";

/// Build the system prompt sent with every round trip.
pub fn build_system_prompt(config: &Config, catalog: &ToolCatalog, workspace: &Path) -> String {
    let mut parts = Vec::new();

    parts.push(config.system_prompt().unwrap_or(DEFAULT_IDENTITY).to_string());

    let now = chrono::Utc::now();
    parts.push(format!("Current time: {}", now.format("%Y-%m-%d %H:%M:%S UTC")));

    parts.push(format!("Workspace directory: {}", workspace.display()));

    if !catalog.is_empty() {
        parts.push(format!("Available tools: {}", catalog.names().join(", ")));
    }

    let instructions_path = workspace.join(INSTRUCTIONS_FILE);
    if let Ok(content) = std::fs::read_to_string(&instructions_path) {
        parts.push(format!("--- Studio Instructions ---\n{content}"));
    }

    parts.join("\n\n")
}
