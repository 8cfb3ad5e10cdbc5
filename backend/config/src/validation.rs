//! Cross-checks between the agent catalog and the integration registry.

use crate::agents::AgentCatalog;
use crate::integrations::IntegrationRegistry;
use thiserror::Error;

/// A finding with the agent/field path it concerns.
#[derive(Debug, Error)]
#[error("Config validation issue at '{path}': {message}")]
pub struct ConfigValidationError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

pub fn validate(catalog: &AgentCatalog, integrations: &IntegrationRegistry) -> ValidationReport {
    let mut report = ValidationReport::default();

    for rejected in catalog.rejected() {
        report.error(rejected.path.display().to_string(), rejected.reason.clone());
    }

    for profile in catalog.profiles() {
        let base = format!("agents.{}", profile.name);
        if profile.name.trim().is_empty() {
            report.error(base.clone(), "Agent name must not be empty");
        }
        if profile.system_prompt.as_deref().map_or(true, |p| p.trim().is_empty()) {
            report.warn(format!("{base}.systemPrompt"), "No system prompt; runner defaults apply");
        }
        if profile.max_turns == Some(0) {
            report.error(format!("{base}.maxTurns"), "maxTurns must be at least 1");
        }
        for name in &profile.integrations {
            if integrations.get(name).is_none() {
                report.warn(
                    format!("{base}.integrations"),
                    format!("Unknown integration '{name}'"),
                );
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentProfile;

    #[test]
    fn flags_unknown_integration_and_zero_turns() {
        let mut catalog = AgentCatalog::default();
        let mut profile = AgentProfile::bare("backend-agent");
        profile.system_prompt = Some("Build things.".into());
        profile.max_turns = Some(0);
        profile.integrations = vec!["github".into(), "jira".into()];
        catalog.insert(profile);

        let report = validate(&catalog, &IntegrationRegistry::builtin());
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("jira"));
    }

    #[test]
    fn clean_catalog_is_valid() {
        let mut catalog = AgentCatalog::default();
        let mut profile = AgentProfile::bare("testing-agent");
        profile.system_prompt = Some("Test.".into());
        catalog.insert(profile);
        assert!(validate(&catalog, &IntegrationRegistry::builtin()).is_valid());
    }
}
