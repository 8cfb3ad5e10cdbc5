use anyhow::{Context, Result};
use async_trait::async_trait;
use conductor_core::{ConductorError, ToolDefinition, ToolHandler, ToolOutput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::parse_args;

/// Check a caller-supplied path: relative, no `..`, and under one of
/// `allowed_roots`. Returns the path joined onto `root`.
pub fn resolve_path(root: &Path, raw: &str, allowed_roots: &[String]) -> Result<PathBuf, ConductorError> {
    let reject = |why: &str| Err(ConductorError::InvalidPath(format!("{raw}: {why}")));

    if raw.trim().is_empty() {
        return reject("empty path");
    }
    if raw.starts_with('/') || raw.starts_with('\\') || Path::new(raw).is_absolute() {
        return reject("absolute paths are not allowed");
    }
    // Checked on the raw text too, so `a\..\b` is caught on every platform.
    if raw.split(['/', '\\']).any(|seg| seg == "..") {
        return reject("path cannot contain '..'");
    }

    let mut components = Path::new(raw)
        .components()
        .filter(|c| !matches!(c, Component::CurDir));
    let first = match components.next() {
        Some(Component::Normal(first)) => first.to_string_lossy().into_owned(),
        _ => return reject("not a relative path"),
    };
    if components.any(|c| !matches!(c, Component::Normal(_))) {
        return reject("not a plain relative path");
    }
    if !allowed_roots.iter().any(|r| r.trim_end_matches('/') == first) {
        return reject(&format!("must be under one of: {}", allowed_roots.join(", ")));
    }

    Ok(root.join(raw))
}

#[derive(Debug, Deserialize)]
struct ReadArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

/// `file_read` / `file_write` confined to the allowed roots of the workspace.
pub struct FileHandler {
    root: PathBuf,
    allowed_roots: Vec<String>,
}

impl FileHandler {
    pub fn new(root: impl Into<PathBuf>, allowed_roots: Vec<String>) -> Self {
        Self {
            root: root.into(),
            allowed_roots,
        }
    }

    async fn read(&self, args: ReadArgs) -> Result<ToolOutput> {
        let path = resolve_path(&self.root, &args.path, &self.allowed_roots)?;
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", args.path))?;
        Ok(ToolOutput::ok(content))
    }

    async fn write(&self, args: WriteArgs) -> Result<ToolOutput> {
        let path = match resolve_path(&self.root, &args.path, &self.allowed_roots) {
            Ok(path) => path,
            Err(e) => {
                warn!("[FileTool] Rejected write: {e}");
                return Err(e.into());
            }
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, &args.content)
            .await
            .with_context(|| format!("Failed to write {}", args.path))?;
        info!("[FileTool] Wrote {} bytes to {}", args.content.len(), args.path);
        Ok(ToolOutput::ok(format!("Successfully wrote to {}", args.path)))
    }
}

#[async_trait]
impl ToolHandler for FileHandler {
    fn namespace(&self) -> &str {
        "file"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "file_read",
                "Read the contents of a file at the given path.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path relative to the workspace root"}
                    },
                    "required": ["path"]
                }),
            ),
            ToolDefinition::new(
                "file_write",
                "Write content to a file. Overwrites if exists.",
                json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "Path relative to the workspace root"},
                        "content": {"type": "string", "description": "The content to write"}
                    },
                    "required": ["path", "content"]
                }),
            ),
        ]
    }

    async fn call(&self, tool: &str, args: Value) -> Result<ToolOutput> {
        match tool {
            "file_read" => self.read(parse_args(tool, args)?).await,
            "file_write" => self.write(parse_args(tool, args)?).await,
            other => Err(ConductorError::UnknownTool(other.to_string()).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roots() -> Vec<String> {
        vec!["agents".into(), "backend".into(), "src".into()]
    }

    #[test]
    fn accepts_paths_under_allowed_roots() {
        let root = Path::new("/w");
        assert_eq!(
            resolve_path(root, "agents/reviewer.yaml", &roots()).unwrap(),
            PathBuf::from("/w/agents/reviewer.yaml")
        );
        assert!(resolve_path(root, "./src/lib.rs", &roots()).is_ok());
    }

    #[test]
    fn rejects_escapes() {
        let root = Path::new("/w");
        for bad in [
            "agents/../../etc/passwd",
            "backend/../secrets",
            "src/..",
            "../src/x",
            "/etc/passwd",
            "src\\..\\..\\x",
            "docs/readme.md",
            "",
        ] {
            let err = resolve_path(root, bad, &roots()).unwrap_err();
            assert!(matches!(err, ConductorError::InvalidPath(_)), "{bad:?}");
        }
    }

    #[tokio::test]
    async fn traversal_write_leaves_disk_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(dir.path(), roots());
        for root in ["agents", "backend", "src"] {
            let args = json!({"path": format!("{root}/../../escape/x.txt"), "content": "pwned"});
            let err = handler.call("file_write", args).await.unwrap_err();
            assert!(err.to_string().contains(".."));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!dir.path().parent().unwrap().join("escape").exists());
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(dir.path(), roots());
        let out = handler
            .call("file_write", json!({"path": "agents/new/a.yaml", "content": "schema: v2\n"}))
            .await
            .unwrap();
        assert!(!out.is_error);

        let out = handler
            .call("file_read", json!({"path": "agents/new/a.yaml"}))
            .await
            .unwrap();
        assert_eq!(out.text, "schema: v2\n");
    }

    #[tokio::test]
    async fn missing_argument_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let handler = FileHandler::new(dir.path(), roots());
        assert!(handler.call("file_write", json!({"path": "src/x"})).await.is_err());
    }
}
