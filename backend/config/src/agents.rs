//! Agent definitions.
//!
//! Definition files carry an explicit `schema` discriminant; a file without
//! one (or with an unknown value) is rejected at load time instead of being
//! guessed at. Both schema versions normalize to an [`AgentProfile`].

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use conductor_core::ConductorError;

use crate::io::{list_documents, read_document};

/// First-generation agent file: tools as a comma-separated string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinitionV1 {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// System prompt.
    #[serde(default)]
    pub prompt: Option<String>,
    /// e.g. "Read, Write, Bash"
    #[serde(default)]
    pub tools: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDefinitionV2 {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_turns: Option<u32>,
    /// Integration registry entries this agent may use.
    #[serde(default)]
    pub integrations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum AgentDefinition {
    #[serde(rename = "v1")]
    V1(AgentDefinitionV1),
    #[serde(rename = "v2")]
    V2(AgentDefinitionV2),
}

/// The normalized agent configuration the invoker consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub name: String,
    pub description: String,
    pub system_prompt: Option<String>,
    pub allowed_tools: Vec<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub integrations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
}

impl AgentProfile {
    /// A profile with no configuration beyond its name.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: None,
            allowed_tools: Vec::new(),
            model: None,
            max_turns: None,
            integrations: Vec::new(),
            source: None,
        }
    }
}

impl From<AgentDefinition> for AgentProfile {
    fn from(def: AgentDefinition) -> Self {
        match def {
            AgentDefinition::V1(v1) => AgentProfile {
                name: v1.name,
                description: v1.description,
                system_prompt: v1.prompt,
                allowed_tools: v1
                    .tools
                    .as_deref()
                    .map(split_tool_list)
                    .unwrap_or_default(),
                model: v1.model,
                max_turns: None,
                integrations: Vec::new(),
                source: None,
            },
            AgentDefinition::V2(v2) => AgentProfile {
                name: v2.name,
                description: v2.description,
                system_prompt: v2.system_prompt,
                allowed_tools: v2.allowed_tools,
                model: v2.model,
                max_turns: v2.max_turns,
                integrations: v2.integrations,
                source: None,
            },
        }
    }
}

fn split_tool_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// A definition file that failed to load.
#[derive(Debug)]
pub struct RejectedDefinition {
    pub path: PathBuf,
    pub reason: String,
}

/// All agent profiles found in the agents directory, keyed by name.
#[derive(Debug, Default)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentProfile>,
    rejected: Vec<RejectedDefinition>,
}

impl AgentCatalog {
    /// Load every `.yaml`/`.yml`/`.json` definition in `dir`.
    ///
    /// Bad files are recorded in [`AgentCatalog::rejected`] and skipped so one
    /// broken definition cannot take the others down.
    pub async fn load_dir(dir: &Path) -> Result<Self> {
        let mut catalog = Self::default();
        for path in list_documents(dir).await? {
            match read_document::<AgentDefinition>(&path).await {
                Ok(def) => {
                    let mut profile = AgentProfile::from(def);
                    profile.source = Some(path.clone());
                    if let Some(previous) = catalog.agents.get(&profile.name) {
                        let reason = format!(
                            "duplicate agent name '{}' (already defined in {})",
                            profile.name,
                            previous
                                .source
                                .as_deref()
                                .map(|p| p.display().to_string())
                                .unwrap_or_default()
                        );
                        warn!(path = %path.display(), "{}", reason);
                        catalog.rejected.push(RejectedDefinition { path, reason });
                        continue;
                    }
                    catalog.agents.insert(profile.name.clone(), profile);
                }
                Err(e) => {
                    let reason = format!("{e:#}");
                    warn!(path = %path.display(), error = %reason, "Rejected agent definition");
                    catalog.rejected.push(RejectedDefinition { path, reason });
                }
            }
        }
        info!(
            dir = %dir.display(),
            agents = catalog.agents.len(),
            rejected = catalog.rejected.len(),
            "Loaded agent catalog"
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, profile: AgentProfile) {
        self.agents.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&AgentProfile> {
        self.agents.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&AgentProfile, ConductorError> {
        self.get(name)
            .ok_or_else(|| ConductorError::AgentNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.agents.values()
    }

    pub fn rejected(&self) -> &[RejectedDefinition] {
        &self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
