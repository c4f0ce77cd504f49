//! Publish trigger. Conversion itself belongs to the host; this tool only
//! validates the request and queues it.

use std::path::PathBuf;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::catalog::PUBLISH_FORMATS;
use crate::path_guard::validate_path;
use crate::{Tool, ToolContext};

const DEFAULT_FORMAT: &str = "pdf";

/// A document the model asked the host to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub path: PathBuf,
    pub format: String,
}

pub struct PublishDocumentTool {
    tx: mpsc::UnboundedSender<PublishRequest>,
}

impl PublishDocumentTool {
    pub fn new(tx: mpsc::UnboundedSender<PublishRequest>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Tool for PublishDocumentTool {
    fn name(&self) -> &str {
        "publish_document"
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

        let format = params
            .get("format")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_FORMAT)
            .to_lowercase();

        if !PUBLISH_FORMATS.contains(&format.as_str()) {
            bail!(
                "Unsupported format '{format}' (expected one of: {})",
                PUBLISH_FORMATS.join(", ")
            );
        }

        let path = validate_path(raw_path, &context.workspace, context.restrict_to_workspace)?;
        if !path.is_file() {
            bail!("File not found: {}", path.display());
        }

        let message = format!("Queued {format} publish of {}", path.display());
        self.tx
            .send(PublishRequest { path, format })
            .map_err(|_| anyhow::anyhow!("Publisher is not running"))?;

        tracing::info!("{message}");
        Ok(message)
    }
}
