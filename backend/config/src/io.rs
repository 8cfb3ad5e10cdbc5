//! Reading YAML/JSON config documents from disk.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Document formats recognised by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(DocumentFormat::Yaml),
            Some("json") => Some(DocumentFormat::Json),
            _ => None,
        }
    }
}

/// Parse a document, choosing the parser from the file extension.
pub async fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let Some(format) = DocumentFormat::from_path(path) else {
        bail!("Unsupported config file type: {}", path.display());
    };
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_document(&raw, format).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_document<T: DeserializeOwned>(raw: &str, format: DocumentFormat) -> Result<T> {
    Ok(match format {
        DocumentFormat::Yaml => serde_yaml::from_str(raw)?,
        DocumentFormat::Json => serde_json::from_str(raw)?,
    })
}

/// Config documents in `dir`, sorted by file name. A missing directory yields
/// an empty list.
pub async fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !fs::try_exists(dir).await.unwrap_or(false) {
        debug!(dir = %dir.display(), "Config directory does not exist");
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && DocumentFormat::from_path(&path).is_some() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Doc {
        name: String,
    }

    #[tokio::test]
    async fn reads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "name: alpha\n").unwrap();
        std::fs::write(dir.path().join("b.json"), r#"{"name": "beta"}"#).unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let paths = list_documents(dir.path()).await.unwrap();
        assert_eq!(paths.len(), 2);

        let a: Doc = read_document(&paths[0]).await.unwrap();
        let b: Doc = read_document(&paths[1]).await.unwrap();
        assert_eq!(a.name, "alpha");
        assert_eq!(b.name, "beta");
    }

    #[tokio::test]
    async fn missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = list_documents(&dir.path().join("nope")).await.unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "name = 'x'").unwrap();
        assert!(read_document::<Doc>(&path).await.is_err());
    }
}
