//! Directory listing tool with glob pattern support.

use std::path::Path;

use anyhow::bail;
use async_trait::async_trait;

use crate::path_guard::{ensure_inside, validate_path};
use crate::{Tool, ToolContext};

pub struct ListDirectoryTool;

const DEFAULT_LIMIT: usize = 200;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<String> {
        let raw_path = params
            .get("path")
            .and_then(|v| v.as_str())
            .unwrap_or(".");
        let pattern = params.get("pattern").and_then(|v| v.as_str());
        let recursive = params
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let limit = params
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let dir_path = validate_path(raw_path, &context.workspace, context.restrict_to_workspace)?;

        if !dir_path.exists() {
            bail!("Directory not found: {}", dir_path.display());
        }
        if !dir_path.is_dir() {
            bail!("Not a directory: {}", dir_path.display());
        }

        let mut entries = Vec::new();
        match pattern {
            Some(pat) => {
                if context.restrict_to_workspace
                    && (Path::new(pat).is_absolute() || pat.split(['/', '\\']).any(|p| p == ".."))
                {
                    bail!("Pattern '{pat}' reaches outside the workspace");
                }
                let workspace = context
                    .restrict_to_workspace
                    .then_some(context.workspace.as_path());
                collect_glob(&dir_path, pat, recursive, limit, workspace, &mut entries)?;
            }
            None => {
                collect(&dir_path, &dir_path, recursive, limit, &mut entries)?;
            }
        }

        if entries.is_empty() {
            return Ok(match pattern {
                Some(_) => "No matching entries found.".into(),
                None => "(empty directory)".into(),
            });
        }
        Ok(entries.join("\n"))
    }
}

fn describe(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    if path.is_dir() {
        format!("[dir]  {}/", relative.display())
    } else {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        format!("[file] {} ({size} bytes)", relative.display())
    }
}

fn collect_glob(
    dir: &Path,
    pattern: &str,
    recursive: bool,
    limit: usize,
    workspace: Option<&Path>,
    entries: &mut Vec<String>,
) -> anyhow::Result<()> {
    let full = if recursive {
        format!("{}/**/{pattern}", dir.display())
    } else {
        format!("{}/{pattern}", dir.display())
    };

    let paths = glob::glob(&full).map_err(|e| anyhow::anyhow!("Invalid glob pattern: {e}"))?;
    for path in paths.flatten() {
        if let Some(workspace) = workspace {
            let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
            if ensure_inside(&resolved, workspace).is_err() {
                continue;
            }
        }
        if entries.len() >= limit {
            entries.push(format!("... (truncated at {limit} entries)"));
            break;
        }
        entries.push(describe(dir, &path));
    }
    Ok(())
}

/// Sorted listing; returns `false` once the limit has been hit.
fn collect(
    root: &Path,
    dir: &Path,
    recursive: bool,
    limit: usize,
    entries: &mut Vec<String>,
) -> std::io::Result<bool> {
    let mut children: Vec<_> = std::fs::read_dir(dir)?.filter_map(|e| e.ok()).collect();
    children.sort_by_key(|e| e.file_name());

    for child in children {
        if entries.len() >= limit {
            entries.push(format!("... (truncated at {limit} entries)"));
            return Ok(false);
        }
        let path = child.path();
        entries.push(describe(root, &path));
        if recursive && path.is_dir() && !collect(root, &path, recursive, limit, entries)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(workspace: &Path) -> ToolContext {
        ToolContext {
            workspace: workspace.to_path_buf(),
            restrict_to_workspace: true,
        }
    }

    #[tokio::test]
    async fn test_basic_listing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::write(ws.join("readme.md"), "hello").unwrap();
        std::fs::create_dir(ws.join("chapters")).unwrap();

        let out = ListDirectoryTool
            .execute(json!({"path": "."}), &context(ws))
            .await
            .unwrap();
        assert_eq!(out, "[dir]  chapters/\n[file] readme.md (5 bytes)");
    }

    #[tokio::test]
    async fn test_pattern_filter() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::write(ws.join("intro.md"), "# Intro").unwrap();
        std::fs::write(ws.join("cover.png"), "png").unwrap();

        let out = ListDirectoryTool
            .execute(json!({"pattern": "*.md"}), &context(ws))
            .await
            .unwrap();
        assert!(out.contains("intro.md"));
        assert!(!out.contains("cover.png"));
    }

    #[tokio::test]
    async fn test_recursive_listing() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        std::fs::create_dir_all(ws.join("book/part1")).unwrap();
        std::fs::write(ws.join("book/part1/ch1.md"), "deep").unwrap();
        std::fs::write(ws.join("top.md"), "top").unwrap();

        let out = ListDirectoryTool
            .execute(json!({"recursive": true}), &context(ws))
            .await
            .unwrap();
        assert!(out.contains("book/part1/ch1.md"));
        assert!(out.contains("top.md"));
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.md")), "x").unwrap();
        }
        let out = ListDirectoryTool
            .execute(json!({"limit": 2}), &context(dir.path()))
            .await
            .unwrap();
        assert_eq!(out.lines().count(), 3);
        assert!(out.ends_with("... (truncated at 2 entries)"));
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = ListDirectoryTool
            .execute(json!({}), &context(dir.path()))
            .await
            .unwrap();
        assert_eq!(out, "(empty directory)");
    }

    #[tokio::test]
    async fn test_pattern_cannot_leave_workspace() {
        let outer = tempfile::tempdir().unwrap();
        let ws = outer.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "s").unwrap();
        std::fs::write(ws.join("notes.md"), "n").unwrap();

        for pattern in ["../*", "**/../../*", "/etc/*"] {
            let err = ListDirectoryTool
                .execute(json!({"pattern": pattern}), &context(&ws))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("outside"), "{pattern}: {err}");
        }

        let out = ListDirectoryTool
            .execute(json!({"pattern": "*"}), &context(&ws))
            .await
            .unwrap();
        assert_eq!(out, "[file] notes.md (1 bytes)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pattern_skips_symlinks_out_of_workspace() {
        let outer = tempfile::tempdir().unwrap();
        let ws = outer.path().join("ws");
        std::fs::create_dir(&ws).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "s").unwrap();
        std::os::unix::fs::symlink(outer.path().join("secret.txt"), ws.join("link.txt")).unwrap();

        let out = ListDirectoryTool
            .execute(json!({"pattern": "*.txt"}), &context(&ws))
            .await
            .unwrap();
        assert_eq!(out, "No matching entries found.");
    }

    #[tokio::test]
    async fn test_workspace_restriction() {
        let dir = tempfile::tempdir().unwrap();
        let err = ListDirectoryTool
            .execute(json!({"path": "/etc"}), &context(dir.path()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("outside"));
    }
}
