//! Environment loading and `${VAR}` substitution.
//!
//! `.env` is read once into a [`LoadedEnv`] value that is passed to whoever
//! needs it; the process environment is never mutated. Values already set in
//! the process environment win over the file.
//!
//! Placeholders use `${VAR_NAME}` with uppercase `[A-Z_][A-Z0-9_]*` names.
//! `$${VAR}` escapes to a literal `${VAR}`.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// `$${VAR}` (escaped) or `${VAR}`.
static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex"));

/// Error returned when a placeholder names an unset or empty variable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced at: {path}")]
pub struct MissingEnvVarError {
    pub var_name: String,
    pub path: String,
}

/// The merged view of `.env` plus the process environment.
#[derive(Debug, Clone, Default)]
pub struct LoadedEnv {
    vars: HashMap<String, String>,
    file_keys: BTreeSet<String>,
    dotenv_path: Option<PathBuf>,
}

impl LoadedEnv {
    /// Load `<dir>/.env` (if present) and overlay the process environment.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(".env");
        let mut file_vars = HashMap::new();
        let dotenv_path = if path.is_file() {
            let iter = dotenvy::from_path_iter(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            for item in iter {
                let (key, value) =
                    item.with_context(|| format!("Failed to parse {}", path.display()))?;
                file_vars.insert(key, value);
            }
            info!(path = %path.display(), vars = file_vars.len(), "Loaded .env");
            Some(path)
        } else {
            debug!(path = %path.display(), "No .env file");
            None
        };

        let mut env = Self::from_parts(file_vars, std::env::vars());
        env.dotenv_path = dotenv_path;
        Ok(env)
    }

    /// Build from explicit maps (file values first, process values overlaid).
    pub fn from_parts(
        file_vars: HashMap<String, String>,
        process_vars: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let file_keys = file_vars.keys().cloned().collect();
        let mut vars = file_vars;
        vars.extend(process_vars);
        Self {
            vars,
            file_keys,
            dotenv_path: None,
        }
    }

    /// Build from a single map, as if it were the process environment.
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        Self::from_parts(HashMap::new(), vars)
    }

    /// A variable's value, treating empty strings as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Variables that came from `.env`, with their effective values. Child
    /// processes get these on top of the inherited environment.
    pub fn file_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.file_keys
            .iter()
            .filter_map(|k| self.vars.get(k).map(|v| (k.as_str(), v.as_str())))
    }

    pub fn dotenv_path(&self) -> Option<&Path> {
        self.dotenv_path.as_deref()
    }
}

/// Substitute every `${VAR}` in the value tree; fails on the first missing var.
pub fn substitute(value: &Value, env: &LoadedEnv) -> Result<Value, MissingEnvVarError> {
    substitute_at(value, env, "")
}

fn substitute_at(value: &Value, env: &LoadedEnv, path: &str) -> Result<Value, MissingEnvVarError> {
    match value {
        Value::String(s) => substitute_str(s, env, path).map(Value::String),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| substitute_at(v, env, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let child = if path.is_empty() { k.clone() } else { format!("{path}.{k}") };
                out.insert(k.clone(), substitute_at(v, env, &child)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute placeholders in one string.
pub fn substitute_str(s: &str, env: &LoadedEnv, path: &str) -> Result<String, MissingEnvVarError> {
    if !s.contains('$') {
        return Ok(s.to_string());
    }

    let mut missing: Option<MissingEnvVarError> = None;
    let out = PLACEHOLDER.replace_all(s, |caps: &Captures| {
        let whole = &caps[0];
        let name = &caps[1];
        if whole.starts_with("$$") {
            return format!("${{{name}}}");
        }
        match env.get(name) {
            Some(v) => v.to_string(),
            None => {
                missing.get_or_insert_with(|| MissingEnvVarError {
                    var_name: name.to_string(),
                    path: path.to_string(),
                });
                String::new()
            }
        }
    });

    match missing {
        Some(err) => Err(err),
        None => Ok(out.into_owned()),
    }
}

/// All variable names referenced (unescaped) anywhere in the value tree.
pub fn collect_referenced_vars(value: &Value) -> Vec<String> {
    let mut vars = BTreeSet::new();
    collect_into(value, &mut vars);
    vars.into_iter().collect()
}

fn collect_into(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => {
            for caps in PLACEHOLDER.captures_iter(s) {
                if !caps[0].starts_with("$$") {
                    out.insert(caps[1].to_string());
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_into(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_into(v, out)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(pairs: &[(&str, &str)]) -> LoadedEnv {
        LoadedEnv::from_map(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn substitutes_nested_values() {
        let v = json!({"a": {"b": "token ${MY_VAR}"}, "list": ["${MY_VAR}"]});
        let out = substitute(&v, &env(&[("MY_VAR", "hello")])).unwrap();
        assert_eq!(out["a"]["b"], "token hello");
        assert_eq!(out["list"][0], "hello");
    }

    #[test]
    fn missing_var_reports_name_and_path() {
        let v = json!({"headers": {"Authorization": "Bearer ${SENTRY_AUTH_TOKEN}"}});
        let err = substitute(&v, &env(&[])).unwrap_err();
        assert_eq!(err.var_name, "SENTRY_AUTH_TOKEN");
        assert_eq!(err.path, "headers.Authorization");
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let err = substitute_str("${EMPTY}", &env(&[("EMPTY", "")]), "x").unwrap_err();
        assert_eq!(err.var_name, "EMPTY");
    }

    #[test]
    fn escaped_placeholder_is_literal() {
        let out = substitute_str("keep $${LITERAL} and ${REAL}", &env(&[("REAL", "1")]), "").unwrap();
        assert_eq!(out, "keep ${LITERAL} and 1");
        assert_eq!(collect_referenced_vars(&json!("$${LITERAL} ${REAL}")), vec!["REAL"]);
    }

    #[test]
    fn process_env_overrides_file() {
        let file: HashMap<_, _> = [("A".to_string(), "file".to_string()), ("B".to_string(), "file".to_string())].into();
        let loaded = LoadedEnv::from_parts(file, vec![("A".to_string(), "process".to_string())]);
        assert_eq!(loaded.get("A"), Some("process"));
        assert_eq!(loaded.get("B"), Some("file"));
        let mut from_file: Vec<_> = loaded.file_vars().collect();
        from_file.sort();
        assert_eq!(from_file, vec![("A", "process"), ("B", "file")]);
    }

    #[test]
    fn load_reads_dotenv_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "CONDUCTOR_TEST_ONLY_KEY=from-file\n# comment\n").unwrap();
        let loaded = LoadedEnv::load(dir.path()).unwrap();
        assert_eq!(loaded.get("CONDUCTOR_TEST_ONLY_KEY"), Some("from-file"));
        assert!(loaded.dotenv_path().is_some());
    }

    #[test]
    fn load_without_dotenv_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = LoadedEnv::load(dir.path()).unwrap();
        assert!(loaded.dotenv_path().is_none());
        assert_eq!(loaded.file_vars().count(), 0);
    }
}
