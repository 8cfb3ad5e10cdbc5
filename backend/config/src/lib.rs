//! `conductor-config` - runtime configuration for Conductor.
//!
//! Provides:
//! - One-time `.env` loading into an explicit [`LoadedEnv`] value
//! - `${ENV_VAR}` substitution
//! - Agent definitions (tagged by `schema`) and the agent catalog
//! - The integration registry and its per-use resolution
//! - Environment-driven runtime [`Config`]

pub mod agents;
pub mod env;
pub mod integrations;
pub mod io;
pub mod runtime;
pub mod validation;

pub use agents::{AgentCatalog, AgentDefinition, AgentProfile};
pub use env::{collect_referenced_vars, substitute, LoadedEnv, MissingEnvVarError};
pub use integrations::{IntegrationRegistry, IntegrationSpec, IntegrationTransport, ResolvedMcpConfig};
pub use runtime::{BuildCommands, Config};
pub use validation::{validate, ValidationReport};

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything loaded once at process start and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Arc<LoadedEnv>,
    pub config: Config,
    pub agents: Arc<AgentCatalog>,
    pub integrations: Arc<IntegrationRegistry>,
}

impl Settings {
    /// Load `.env` from `CONDUCTOR_ROOT` (or the current directory), then
    /// config, agents and integrations.
    pub async fn load() -> Result<Self> {
        let root = std::env::var("CONDUCTOR_ROOT")
            .map(PathBuf::from)
            .or_else(|_| std::env::current_dir())
            .context("Failed to determine workspace root")?;
        let env = LoadedEnv::load(&root)?;
        Self::from_env(env).await
    }

    pub async fn from_env(env: LoadedEnv) -> Result<Self> {
        let config = Config::from_env(&env);
        let agents = AgentCatalog::load_dir(&config.agents_dir).await?;
        let integrations = IntegrationRegistry::builtin()
            .with_file(&config.integrations_file())
            .await?;

        let report = validate(&agents, &integrations);
        for warning in &report.warnings {
            tracing::warn!(path = %warning.path, message = %warning.message, "Config warning");
        }
        for error in &report.errors {
            tracing::error!(path = %error.path, message = %error.message, "Config error");
        }

        Ok(Self {
            env: Arc::new(env),
            config,
            agents: Arc::new(agents),
            integrations: Arc::new(integrations),
        })
    }
}
