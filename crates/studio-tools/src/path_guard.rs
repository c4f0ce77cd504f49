//! Path validation so file tools stay inside the workspace.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

fn join_workspace(raw: &str, workspace: &Path) -> PathBuf {
    if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        workspace.join(raw)
    }
}

/// Canonicalize through the deepest existing ancestor, so paths that do not
/// exist yet still resolve `..` and symlinks in their existing prefix.
fn canonicalize_lenient(path: &Path) -> PathBuf {
    let mut ancestor = path.to_path_buf();
    while !ancestor.exists() {
        match ancestor.parent() {
            Some(parent) => ancestor = parent.to_path_buf(),
            None => return path.to_path_buf(),
        }
    }
    match ancestor.canonicalize() {
        Ok(canon) => {
            match path.strip_prefix(&ancestor) {
                Ok(suffix) if !suffix.as_os_str().is_empty() => canon.join(suffix),
                _ => canon,
            }
        }
        Err(_) => path.to_path_buf(),
    }
}

pub(crate) fn ensure_inside(path: &Path, workspace: &Path) -> Result<()> {
    let workspace_canon = workspace
        .canonicalize()
        .unwrap_or_else(|_| workspace.to_path_buf());
    if !path.starts_with(&workspace_canon) || path.components().any(|c| c.as_os_str() == "..") {
        bail!(
            "Path '{}' is outside the workspace '{}'",
            path.display(),
            workspace_canon.display()
        );
    }
    Ok(())
}

/// Validate and resolve a path for reading.
pub fn validate_path(raw: &str, workspace: &Path, restrict: bool) -> Result<PathBuf> {
    let resolved = canonicalize_lenient(&join_workspace(raw, workspace));
    if restrict {
        ensure_inside(&resolved, workspace)?;
    }
    Ok(resolved)
}

/// Validate a path for writing, creating parent dirs when asked.
pub fn validate_write_path(
    raw: &str,
    workspace: &Path,
    restrict: bool,
    create_dirs: bool,
) -> Result<PathBuf> {
    let resolved = canonicalize_lenient(&join_workspace(raw, workspace));
    if restrict {
        ensure_inside(&resolved, workspace)?;
    }

    if let Some(parent) = resolved.parent() {
        if create_dirs {
            std::fs::create_dir_all(parent)?;
        } else if !parent.exists() {
            bail!("Parent directory does not exist: {}", parent.display());
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        std::fs::write(workspace.join("chapter.md"), "hello").unwrap();

        let result = validate_path("chapter.md", workspace, true).unwrap();
        assert!(result.starts_with(workspace.canonicalize().unwrap()));
    }

    #[test]
    fn test_existing_file_has_no_trailing_separator() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        std::fs::write(workspace.join("a.md"), "draft").unwrap();

        let result = validate_path("a.md", workspace, true).unwrap();
        assert_eq!(result, workspace.canonicalize().unwrap().join("a.md"));
        assert!(!result.to_string_lossy().ends_with('/'));
        assert!(result.is_file());

        let write = validate_write_path("a.md", workspace, true, false).unwrap();
        assert_eq!(write, result);
    }

    #[test]
    fn test_escape_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();
        std::fs::create_dir_all(workspace.join("sub")).unwrap();

        let result = validate_path("../../etc/passwd", workspace, true);
        assert!(result.is_err());
    }

    #[test]
    fn test_escape_through_missing_dir_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_write_path("missing/../../outside.md", dir.path(), true, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_unrestricted_allows_escape() {
        let dir = tempfile::tempdir().unwrap();
        let result = validate_path("/tmp", dir.path(), false);
        assert!(result.is_ok());
    }

    #[test]
    fn test_write_path_requires_parent_unless_created() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path();

        assert!(validate_write_path("a/b/c.md", workspace, true, false).is_err());
        let path = validate_write_path("a/b/c.md", workspace, true, true).unwrap();
        assert!(path.parent().unwrap().is_dir());
    }
}
