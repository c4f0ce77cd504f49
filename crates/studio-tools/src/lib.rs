//! Tools the model can invoke during a conversation.
//!
//! The [`catalog`] declares what the model is told about; the
//! [`ToolRegistry`] maps each operation name to a [`Tool`] handler and is the
//! [`ToolExecutor`] the conversation engine calls into.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod catalog;
pub mod editor;
pub mod list_directory;
pub mod path_guard;
pub mod publish;
pub mod read_file;
pub mod write_file;

pub use catalog::ToolCatalog;
pub use editor::EditorBuffer;
pub use publish::PublishRequest;

/// Executes a named operation with structured arguments.
///
/// This is the only view the conversation engine has of tool behaviour.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, args: serde_json::Value) -> anyhow::Result<String>;
}

/// Context provided to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace: PathBuf,
    pub restrict_to_workspace: bool,
}

/// A handler for one catalog operation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Operation name, matching a [`ToolCatalog`] entry.
    fn name(&self) -> &str;

    /// Run the operation. An `Err` is reported back to the model as a tool error.
    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<String>;
}

/// Capability table mapping operation names to handlers.
pub struct ToolRegistry {
    context: ToolContext,
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(context: ToolContext) -> Self {
        Self {
            context,
            tools: Vec::new(),
        }
    }

    /// Register a handler. A later registration under the same name replaces
    /// the earlier one.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Catalog operations that have no registered handler.
    pub fn missing_from<'a>(&self, catalog: &'a ToolCatalog) -> Vec<&'a str> {
        catalog
            .names()
            .into_iter()
            .filter(|name| self.get(name).is_none())
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, args: serde_json::Value) -> anyhow::Result<String> {
        match self.get(name) {
            Some(tool) => tool.execute(args, &self.context).await,
            None => anyhow::bail!("Unknown tool: {name}"),
        }
    }
}

/// Register every built-in handler for the [`ToolCatalog::builtin`] operations.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    editor: EditorBuffer,
    publish_tx: mpsc::UnboundedSender<PublishRequest>,
) {
    registry.register(Box::new(read_file::ReadFileTool));
    registry.register(Box::new(write_file::WriteFileTool));
    registry.register(Box::new(list_directory::ListDirectoryTool));
    registry.register(Box::new(editor::GetEditorContentTool::new(editor.clone())));
    registry.register(Box::new(editor::ReplaceEditorContentTool::new(
        editor.clone(),
    )));
    registry.register(Box::new(editor::InsertTextTool::new(editor)));
    registry.register(Box::new(publish::PublishDocumentTool::new(publish_tx)));
}
