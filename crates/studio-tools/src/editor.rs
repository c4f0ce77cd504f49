//! Editor tools operating on the shared in-memory document.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::{Tool, ToolContext};

/// The document currently open in the editor, shared between the host and
/// the editor tools.
#[derive(Debug, Clone, Default)]
pub struct EditorBuffer {
    inner: Arc<RwLock<String>>,
}

impl EditorBuffer {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(content.into())),
        }
    }

    pub fn content(&self) -> String {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn replace(&self, content: impl Into<String>) {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = content.into();
    }

    /// Insert `text` before 1-based `line`. `None`, or a line past the end,
    /// appends. Returns the line the text landed on.
    pub fn insert(&self, text: &str, line: Option<usize>) -> usize {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut lines: Vec<&str> = guard.lines().collect();
        let at = match line {
            Some(n) if n >= 1 && n <= lines.len() => n - 1,
            _ => lines.len(),
        };
        lines.insert(at, text);

        let mut updated = lines.join("\n");
        if guard.ends_with('\n') || guard.is_empty() {
            updated.push('\n');
        }
        *guard = updated;
        at + 1
    }

    pub fn line_count(&self) -> usize {
        self.content().lines().count()
    }
}

pub struct GetEditorContentTool {
    buffer: EditorBuffer,
}

impl GetEditorContentTool {
    pub fn new(buffer: EditorBuffer) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl Tool for GetEditorContentTool {
    fn name(&self) -> &str {
        "get_editor_content"
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<String> {
        let content = self.buffer.content();
        if content.is_empty() {
            return Ok("(editor is empty)".into());
        }
        Ok(content)
    }
}

pub struct ReplaceEditorContentTool {
    buffer: EditorBuffer,
}

impl ReplaceEditorContentTool {
    pub fn new(buffer: EditorBuffer) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl Tool for ReplaceEditorContentTool {
    fn name(&self) -> &str {
        "replace_editor_content"
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<String> {
        let content = params
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'content' parameter"))?;

        self.buffer.replace(content);
        tracing::debug!(bytes = content.len(), "editor content replaced");
        Ok(format!(
            "Editor content replaced ({} lines)",
            self.buffer.line_count()
        ))
    }
}

pub struct InsertTextTool {
    buffer: EditorBuffer,
}

impl InsertTextTool {
    pub fn new(buffer: EditorBuffer) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl Tool for InsertTextTool {
    fn name(&self) -> &str {
        "insert_text"
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _context: &ToolContext,
    ) -> anyhow::Result<String> {
        let text = params
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'text' parameter"))?;

        let line = match params.get("line") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => match v.as_u64() {
                Some(n) if n >= 1 => Some(n as usize),
                _ => anyhow::bail!("'line' must be a positive integer"),
            },
        };

        let at = self.buffer.insert(text, line);
        Ok(format!("Inserted text at line {at}"))
    }
}
