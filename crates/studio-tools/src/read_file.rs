//! File reading tool.

use anyhow::bail;
use async_trait::async_trait;

use crate::path_guard::validate_path;
use crate::{Tool, ToolContext};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<String> {
        let raw_path = params
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing 'path' parameter"))?;

        let path = validate_path(raw_path, &context.workspace, context.restrict_to_workspace)?;

        if !path.exists() {
            bail!("File not found: {}", path.display());
        }
        if !path.is_file() {
            bail!("Not a file: {}", path.display());
        }

        let content = tokio::fs::read_to_string(&path).await?;
        if content.is_empty() {
            return Ok("(empty file)".into());
        }

        let mut result = String::with_capacity(content.len() + content.len() / 8);
        for (i, line) in content.lines().enumerate() {
            result.push_str(&format!("{:>6}\t{line}\n", i + 1));
        }
        Ok(result)
    }
}
