//! Registry of optional external integrations (MCP servers).
//!
//! Entries are static after startup. Each one is resolved per use against a
//! [`LoadedEnv`]; a missing required variable makes that one integration
//! invalid and leaves the rest alone.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::env::{collect_referenced_vars, substitute, LoadedEnv};
use crate::io::read_document;

/// Stand-in value for unset optional variables during substitution.
const UNSET: &str = "\u{0}";

/// How an integration is reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum IntegrationTransport {
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub transport: IntegrationTransport,
    #[serde(default)]
    pub required_env: Vec<String>,
    #[serde(default)]
    pub optional_env: Vec<String>,
    /// Tool names the integration exposes.
    #[serde(default)]
    pub tools: Vec<String>,
}

/// One integration after placeholder resolution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedMcpConfig {
    pub name: String,
    pub valid: bool,
    pub missing_env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<IntegrationTransport>,
    pub tools: Vec<String>,
}

impl ResolvedMcpConfig {
    /// The entry for the `mcpServers` map of an MCP client config.
    pub fn server_entry(&self) -> Option<Value> {
        match self.transport.as_ref()? {
            IntegrationTransport::Command { command, args, env } => Some(json!({
                "command": command,
                "args": args,
                "env": env,
            })),
            IntegrationTransport::Http { url, headers } => Some(json!({
                "type": "http",
                "url": url,
                "headers": headers,
            })),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntegrationsFile {
    #[serde(default)]
    integrations: Vec<IntegrationSpec>,
}

#[derive(Debug, Clone, Default)]
pub struct IntegrationRegistry {
    specs: Vec<IntegrationSpec>,
}

impl IntegrationRegistry {
    pub fn new(specs: Vec<IntegrationSpec>) -> Self {
        Self { specs }
    }

    /// Integrations shipped by default.
    pub fn builtin() -> Self {
        let spec = |name: &str, description: &str, transport, required: &[&str], optional: &[&str], tools: &[&str]| {
            IntegrationSpec {
                name: name.to_string(),
                description: description.to_string(),
                transport,
                required_env: required.iter().map(|s| s.to_string()).collect(),
                optional_env: optional.iter().map(|s| s.to_string()).collect(),
                tools: tools.iter().map(|s| s.to_string()).collect(),
            }
        };

        Self::new(vec![
            spec(
                "github",
                "GitHub issues, pull requests and code search",
                IntegrationTransport::Command {
                    command: "npx".into(),
                    args: vec!["-y".into(), "@modelcontextprotocol/server-github".into()],
                    env: BTreeMap::from([(
                        "GITHUB_PERSONAL_ACCESS_TOKEN".to_string(),
                        "${GITHUB_TOKEN}".to_string(),
                    )]),
                },
                &["GITHUB_TOKEN"],
                &[],
                &["create_issue", "create_pull_request", "search_code", "get_file_contents"],
            ),
            spec(
                "context7",
                "Up-to-date library documentation",
                IntegrationTransport::Http {
                    url: "https://mcp.context7.com/mcp".into(),
                    headers: BTreeMap::from([(
                        "CONTEXT7_API_KEY".to_string(),
                        "${CONTEXT7_API_KEY}".to_string(),
                    )]),
                },
                &[],
                &["CONTEXT7_API_KEY"],
                &["resolve-library-id", "get-library-docs"],
            ),
            spec(
                "sentry",
                "Error monitoring issues and events",
                IntegrationTransport::Http {
                    url: "https://mcp.sentry.dev/mcp".into(),
                    headers: BTreeMap::from([(
                        "Authorization".to_string(),
                        "Bearer ${SENTRY_AUTH_TOKEN}".to_string(),
                    )]),
                },
                &["SENTRY_AUTH_TOKEN"],
                &[],
                &["search_issues", "get_issue_details"],
            ),
            spec(
                "playwright",
                "Browser automation",
                IntegrationTransport::Command {
                    command: "npx".into(),
                    args: vec!["-y".into(), "@playwright/mcp@latest".into()],
                    env: BTreeMap::new(),
                },
                &[],
                &[],
                &["browser_navigate", "browser_click", "browser_snapshot"],
            ),
        ])
    }

    /// Overlay entries from an `integrations.yaml`/`.json` file; same-named
    /// entries replace built-ins. A missing file leaves the registry as is.
    pub async fn with_file(mut self, path: &Path) -> Result<Self> {
        if !path.is_file() {
            debug!(path = %path.display(), "No integrations file");
            return Ok(self);
        }
        let file: IntegrationsFile = read_document(path).await?;
        for spec in file.integrations {
            self.specs.retain(|s| s.name != spec.name);
            self.specs.push(spec);
        }
        info!(path = %path.display(), total = self.specs.len(), "Loaded integrations file");
        Ok(self)
    }

    pub fn specs(&self) -> &[IntegrationSpec] {
        &self.specs
    }

    pub fn get(&self, name: &str) -> Option<&IntegrationSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn resolve(&self, name: &str, env: &LoadedEnv) -> Option<ResolvedMcpConfig> {
        self.get(name).map(|spec| resolve_spec(spec, env))
    }

    pub fn resolve_all(&self, env: &LoadedEnv) -> Vec<ResolvedMcpConfig> {
        self.specs.iter().map(|s| resolve_spec(s, env)).collect()
    }

    /// `{"mcpServers": {...}}` for the named integrations that resolve as
    /// valid. Unknown or invalid names are left out. `None` when nothing
    /// remains.
    pub fn mcp_servers_config(&self, names: &[String], env: &LoadedEnv) -> Option<Value> {
        let mut servers = Map::new();
        for name in names {
            match self.resolve(name, env) {
                Some(resolved) if resolved.valid => {
                    if let Some(entry) = resolved.server_entry() {
                        servers.insert(resolved.name.clone(), entry);
                    }
                }
                Some(resolved) => {
                    debug!(integration = %name, missing = ?resolved.missing_env, "Skipping invalid integration");
                }
                None => debug!(integration = %name, "Unknown integration"),
            }
        }
        (!servers.is_empty()).then(|| json!({ "mcpServers": servers }))
    }
}

fn resolve_spec(spec: &IntegrationSpec, env: &LoadedEnv) -> ResolvedMcpConfig {
    let transport_value = serde_json::to_value(&spec.transport).unwrap_or(Value::Null);

    let mut missing: Vec<String> = spec
        .required_env
        .iter()
        .filter(|var| env.get(var).is_none())
        .cloned()
        .collect();

    // Placeholders naming a variable not declared optional are treated as
    // required.
    for var in collect_referenced_vars(&transport_value) {
        if env.get(&var).is_none() && !spec.optional_env.contains(&var) && !missing.contains(&var) {
            missing.push(var);
        }
    }

    if !missing.is_empty() {
        return ResolvedMcpConfig {
            name: spec.name.clone(),
            valid: false,
            missing_env: missing,
            transport: None,
            tools: spec.tools.clone(),
        };
    }

    // Unset optional vars resolve to empty, and map entries left empty are
    // dropped.
    let mut vars: HashMap<String, String> = env.vars().clone();
    for var in &spec.optional_env {
        vars.entry(var.clone()).or_default();
    }
    let lenient = LoadedEnv::from_map(
        vars.into_iter()
            .map(|(k, v)| if v.is_empty() { (k, UNSET.to_string()) } else { (k, v) })
            .collect(),
    );

    let transport = substitute(&transport_value, &lenient)
        .ok()
        .and_then(|v| serde_json::from_value::<IntegrationTransport>(v).ok())
        .map(strip_unset_entries);

    ResolvedMcpConfig {
        name: spec.name.clone(),
        valid: transport.is_some(),
        missing_env: Vec::new(),
        transport,
        tools: spec.tools.clone(),
    }
}

/// Drop env/header entries that referenced an unset optional variable.
fn strip_unset_entries(transport: IntegrationTransport) -> IntegrationTransport {
    let keep = |v: &String| !v.contains(UNSET);
    match transport {
        IntegrationTransport::Command { command, args, env } => IntegrationTransport::Command {
            command,
            args: args.into_iter().filter(keep).collect(),
            env: env.into_iter().filter(|(_, v)| keep(v)).collect(),
        },
        IntegrationTransport::Http { url, headers } => IntegrationTransport::Http {
            url,
            headers: headers.into_iter().filter(|(_, v)| keep(v)).collect(),
        },
    }
}
