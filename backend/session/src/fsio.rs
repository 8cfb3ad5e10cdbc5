//! Small file primitives shared by the writers.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type FileLock = Arc<tokio::sync::Mutex<()>>;

static APPEND_LOCKS: Lazy<Mutex<HashMap<PathBuf, FileLock>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn append_lock(path: &Path) -> FileLock {
    let mut locks = APPEND_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    if locks.len() > 64 {
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
    Arc::clone(locks.entry(path.to_path_buf()).or_default())
}

/// Append `line` (newline added if missing) with one `write_all` on an
/// `O_APPEND` handle, then flush and `sync_data`. Readers never see a
/// partial line from a completed call.
///
/// Appends to one file land in call order even when a caller is cancelled
/// mid-write: the blocking write owns the file's lock until it finishes.
pub async fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut buf = line.to_string();
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    let guard = append_lock(path).lock_owned().await;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        append_blocking(&path, buf.as_bytes())
    })
    .await
    .context("append task panicked")?
}

fn append_blocking(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    file.flush()?;
    file.sync_data()?;
    Ok(())
}

/// Create `path` with `contents` only if it does not exist yet.
/// Returns `false` when the file was already there.
pub async fn create_new(path: &Path, contents: &str) -> Result<bool> {
    let path = path.to_path_buf();
    let contents = contents.to_string();
    tokio::task::spawn_blocking(move || {
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!("Failed to create {}", path.display())))
            }
        };
        file.write_all(contents.as_bytes())?;
        file.flush()?;
        Ok(true)
    })
    .await
    .context("create task panicked")?
}

/// Write via a temp file and rename so readers see old or new, never half.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}
