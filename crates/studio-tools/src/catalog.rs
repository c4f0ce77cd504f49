//! Static catalog of operations advertised to the model.

use serde_json::json;

use studio_core::ToolDefinition;

/// Ordered, declarative list of invocable operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
}

/// Output formats accepted by `publish_document`.
pub const PUBLISH_FORMATS: &[&str] = &["pdf", "html", "docx", "epub"];

impl ToolCatalog {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        Self { definitions }
    }

    /// The document-studio operations: file access, editor mutation, publishing.
    pub fn builtin() -> Self {
        Self::new(vec![
            define(
                "read_file",
                "Read the contents of a file in the workspace. Returns content with line numbers.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file (relative to workspace or absolute)"
                        }
                    },
                    "required": ["path"]
                }),
            ),
            define(
                "write_file",
                "Write content to a file, creating it if it doesn't exist. Overwrites existing content.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Path to the file (relative to workspace or absolute)"
                        },
                        "content": {
                            "type": "string",
                            "description": "Content to write"
                        },
                        "create_dirs": {
                            "type": "boolean",
                            "description": "Create parent directories if they don't exist (default: false)"
                        }
                    },
                    "required": ["path", "content"]
                }),
            ),
            define(
                "list_directory",
                "List files and directories in a path, optionally filtered by glob pattern.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Directory to list (relative to workspace or absolute). Default: \".\""
                        },
                        "pattern": {
                            "type": "string",
                            "description": "Glob pattern to filter entries (e.g. \"*.md\")"
                        },
                        "recursive": {
                            "type": "boolean",
                            "description": "Whether to recurse into subdirectories. Default: false"
                        },
                        "limit": {
                            "type": "integer",
                            "description": "Maximum number of entries to return. Default: 200"
                        }
                    }
                }),
            ),
            define(
                "get_editor_content",
                "Return the full text of the document open in the editor.",
                json!({ "type": "object", "properties": {} }),
            ),
            define(
                "replace_editor_content",
                "Replace the entire text of the document open in the editor.",
                json!({
                    "type": "object",
                    "properties": {
                        "content": {
                            "type": "string",
                            "description": "New document text"
                        }
                    },
                    "required": ["content"]
                }),
            ),
            define(
                "insert_text",
                "Insert text into the editor document before the given line, or at the end when no line is given.",
                json!({
                    "type": "object",
                    "properties": {
                        "text": {
                            "type": "string",
                            "description": "Text to insert"
                        },
                        "line": {
                            "type": "integer",
                            "description": "1-based line number to insert before"
                        }
                    },
                    "required": ["text"]
                }),
            ),
            define(
                "publish_document",
                "Publish a markdown document from the workspace to an output format.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "Markdown source file to publish"
                        },
                        "format": {
                            "type": "string",
                            "enum": PUBLISH_FORMATS,
                            "description": "Output format. Default: pdf"
                        }
                    },
                    "required": ["path"]
                }),
            ),
        ])
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.definitions.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn define(name: &str, description: &str, input_schema: serde_json::Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    }
}
