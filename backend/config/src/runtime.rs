use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::env::LoadedEnv;

/// Shell commands behind the `build` tool namespace.
#[derive(Debug, Clone, Serialize)]
pub struct BuildCommands {
    pub build: String,
    pub lint: String,
    pub test: String,
    pub timeout_secs: u64,
}

impl Default for BuildCommands {
    fn default() -> Self {
        Self {
            build: "cargo build --workspace".to_string(),
            lint: "cargo clippy --workspace -- -D warnings".to_string(),
            test: "cargo test --workspace".to_string(),
            timeout_secs: 600,
        }
    }
}

/// Conductor runtime configuration.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Workspace root every relative path is resolved against
    pub root: PathBuf,
    /// `output_streams/` (session logs, transcripts, metadata)
    pub output_dir: PathBuf,
    /// `reports/` (summaries)
    pub reports_dir: PathBuf,
    /// `plans/` (read-only, listed for the UI)
    pub plans_dir: PathBuf,
    /// Agent definition files
    pub agents_dir: PathBuf,
    /// Rolling log directory; `None` logs to the console only
    pub log_dir: Option<PathBuf>,
    /// HTTP server bind address
    pub bind_address: String,
    /// HTTP server port
    pub port: u16,
    /// Log level
    pub log_level: String,
    /// External agent CLI binary
    pub query_command: String,
    /// Default invocation timeout
    pub default_timeout_secs: Option<u64>,
    pub build: BuildCommands,
    /// Top-level directories `file_write` may touch
    pub allowed_write_roots: Vec<String>,
}

impl Config {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            output_dir: root.join("output_streams"),
            reports_dir: root.join("reports"),
            plans_dir: root.join("plans"),
            agents_dir: root.join("agents"),
            log_dir: None,
            bind_address: "127.0.0.1".to_string(),
            port: 3001,
            log_level: "info".to_string(),
            query_command: "claude".to_string(),
            default_timeout_secs: None,
            build: BuildCommands::default(),
            allowed_write_roots: vec!["agents".into(), "backend".into(), "src".into()],
            root,
        }
    }

    /// Load configuration from the merged environment with sensible defaults.
    pub fn from_env(env: &LoadedEnv) -> Self {
        let root = env
            .get("CONDUCTOR_ROOT")
            .map(PathBuf::from)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = Self::with_root(&root);

        let dir = |key: &str, default: PathBuf| {
            env.get(key).map(|v| resolve_against(&root, v)).unwrap_or(default)
        };
        config.output_dir = dir("CONDUCTOR_OUTPUT_DIR", config.output_dir);
        config.reports_dir = dir("CONDUCTOR_REPORTS_DIR", config.reports_dir);
        config.plans_dir = dir("CONDUCTOR_PLANS_DIR", config.plans_dir);
        config.agents_dir = dir("CONDUCTOR_AGENTS_DIR", config.agents_dir);
        config.log_dir = env.get("CONDUCTOR_LOG_DIR").map(|v| resolve_against(&root, v));

        if let Some(bind) = env.get("CONDUCTOR_BIND") {
            config.bind_address = bind.to_string();
        }
        if let Some(port) = env.get("CONDUCTOR_PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(level) = env.get("RUST_LOG") {
            config.log_level = level.to_string();
        }
        if let Some(cmd) = env.get("CONDUCTOR_QUERY_CMD") {
            config.query_command = cmd.to_string();
        }
        config.default_timeout_secs = env
            .get("CONDUCTOR_TIMEOUT_SECS")
            .and_then(|t| t.parse().ok())
            .filter(|t| *t > 0);

        if let Some(cmd) = env.get("CONDUCTOR_BUILD_CMD") {
            config.build.build = cmd.to_string();
        }
        if let Some(cmd) = env.get("CONDUCTOR_LINT_CMD") {
            config.build.lint = cmd.to_string();
        }
        if let Some(cmd) = env.get("CONDUCTOR_TEST_CMD") {
            config.build.test = cmd.to_string();
        }
        if let Some(roots) = env.get("CONDUCTOR_WRITE_ROOTS") {
            config.allowed_write_roots = roots
                .split(',')
                .map(|r| r.trim().trim_matches('/').to_string())
                .filter(|r| !r.is_empty())
                .collect();
        }

        config
    }

    pub fn integrations_file(&self) -> PathBuf {
        self.root.join("integrations.yaml")
    }
}

fn resolve_against(root: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() { path } else { root.join(path) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> LoadedEnv {
        LoadedEnv::from_map(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<HashMap<_, _>>())
    }

    #[test]
    fn defaults_follow_root() {
        let config = Config::from_env(&env(&[("CONDUCTOR_ROOT", "/srv/work")]));
        assert_eq!(config.output_dir, PathBuf::from("/srv/work/output_streams"));
        assert_eq!(config.reports_dir, PathBuf::from("/srv/work/reports"));
        assert_eq!(config.port, 3001);
        assert_eq!(config.query_command, "claude");
        assert!(config.default_timeout_secs.is_none());
    }

    #[test]
    fn overrides_apply() {
        let config = Config::from_env(&env(&[
            ("CONDUCTOR_ROOT", "/srv/work"),
            ("CONDUCTOR_OUTPUT_DIR", "streams"),
            ("CONDUCTOR_REPORTS_DIR", "/var/reports"),
            ("CONDUCTOR_PORT", "8081"),
            ("CONDUCTOR_TIMEOUT_SECS", "90"),
            ("CONDUCTOR_WRITE_ROOTS", "src/, docs"),
        ]));
        assert_eq!(config.output_dir, PathBuf::from("/srv/work/streams"));
        assert_eq!(config.reports_dir, PathBuf::from("/var/reports"));
        assert_eq!(config.port, 8081);
        assert_eq!(config.default_timeout_secs, Some(90));
        assert_eq!(config.allowed_write_roots, vec!["src", "docs"]);
    }

    #[test]
    fn bad_port_keeps_default() {
        let config = Config::from_env(&env(&[("CONDUCTOR_ROOT", "/r"), ("CONDUCTOR_PORT", "http")]));
        assert_eq!(config.port, 3001);
    }
}
