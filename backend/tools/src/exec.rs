/// Shell command runner used by the build tools.
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Maximum bytes kept from each of stdout and stderr.
    pub max_output_bytes: usize,
}

impl ExecConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout: Duration::from_secs(600),
            max_output_bytes: 200_000,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub truncated: bool,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run `sh -c <command>`, capturing output. A timeout kills the child and is
/// reported in the result rather than as an error.
pub async fn exec_command(config: &ExecConfig) -> Result<ExecResult> {
    if config.command.trim().is_empty() {
        bail!("Empty command");
    }
    let preview: String = config.command.chars().take(80).collect();
    info!("[Exec] Running: {preview:?}");

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&config.command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &config.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd.spawn().context("Failed to spawn sh")?;
    let mut stdout = child.stdout.take().context("stdout not captured")?;
    let mut stderr = child.stderr.take().context("stderr not captured")?;
    let max = config.max_output_bytes;

    let run = async move {
        let (out, err) = tokio::join!(read_capped(&mut stdout, max), read_capped(&mut stderr, max));
        let (stdout_buf, stdout_cut) = out?;
        let (stderr_buf, stderr_cut) = err?;
        let status = child.wait().await?;
        let truncated = stdout_cut || stderr_cut;

        Ok::<_, anyhow::Error>(ExecResult {
            stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_buf).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            timed_out: false,
            truncated,
        })
    };

    match tokio::time::timeout(config.timeout, run).await {
        Ok(result) => result,
        Err(_) => {
            warn!("[Exec] Command timed out after {}s", config.timeout.as_secs());
            Ok(ExecResult {
                stdout: String::new(),
                stderr: format!("Command timed out after {}s", config.timeout.as_secs()),
                exit_code: -1,
                timed_out: true,
                truncated: false,
            })
        }
    }
}

/// Keep at most `max` bytes, draining the rest so the child never blocks on a
/// full pipe. The flag reports whether anything was dropped.
async fn read_capped<R>(reader: &mut R, max: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max).unwrap_or(u64::MAX).saturating_add(1);
    (&mut *reader).take(limit).read_to_end(&mut buf).await?;
    if buf.len() <= max {
        return Ok((buf, false));
    }
    buf.truncate(max);
    tokio::io::copy(reader, &mut tokio::io::sink()).await?;
    Ok((buf, true))
}

/// Single-quote `arg` for `sh`.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
