//! Configuration management for sqlrack.
//!
//! This module defines the structure of the `sqlrack.toml` configuration
//! file and provides functionality to load and parse it. The `[values]`
//! table carries option values keyed by catalogue id, so a profile can
//! pre-fill a scan the same way a saved form would.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::catalog::{Catalog, ValueSet};

/// Top-level configuration structure corresponding to `sqlrack.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tool: ToolConfig,
    pub run: RunSettings,
    /// Option values keyed by catalogue id; `--set` overrides these.
    pub values: toml::Table,
}

/// Where and how to invoke sqlmap.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// The sqlmap invocation. May carry arguments of its own, e.g.
    /// `python3 /opt/sqlmap/sqlmap.py`.
    pub path: String,
    /// Interpreter prepended when `path` points at a `.py` script that is
    /// not runnable by itself.
    pub python: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: "sqlmap".to_string(),
            python: "python3".to_string(),
        }
    }
}

/// Runtime limits for supervised runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Maximum number of lines to keep in memory per run.
    pub max_lines: usize,
    /// Strip ANSI escape codes from stored and printed output.
    pub strip_ansi: bool,
    /// Grace period before a cancelled run is force-killed, in milliseconds.
    pub term_grace_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_lines: 10_000,
            strip_ansi: true,
            term_grace_ms: 2_000,
        }
    }
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Applies a `[values]` table onto a `ValueSet`, validating each entry
/// against the catalogue.
pub fn apply_values(catalog: &Catalog, table: &toml::Table, values: &mut ValueSet) -> Result<()> {
    for (id, value) in table {
        let raw = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(n) => n.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            other => bail!(
                "config [values] entry '{id}' must be a string, integer, or boolean (got {})",
                other.type_str()
            ),
        };
        values
            .set_parsed(catalog, id, &raw)
            .with_context(|| format!("config [values] entry '{id}'"))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OptionValue;

    #[test]
    fn parses_profile_with_values() {
        let raw = r#"
[tool]
path = "/opt/sqlmap/sqlmap.py"
python = "python3.12"

[run]
max_lines = 500
strip_ansi = false
term_grace_ms = 1000

[values]
target_url = "http://x/a.php?id=1"
req_timeout = 45
req_random_agent = true
"#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.tool.path, "/opt/sqlmap/sqlmap.py");
        assert_eq!(config.tool.python, "python3.12");
        assert_eq!(config.run.max_lines, 500);
        assert!(!config.run.strip_ansi);
        assert_eq!(config.run.term_grace_ms, 1000);

        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        apply_values(&catalog, &config.values, &mut values).unwrap();
        assert_eq!(
            values.get("target_url"),
            Some(&OptionValue::Text("http://x/a.php?id=1".into()))
        );
        assert_eq!(values.get("req_timeout"), Some(&OptionValue::Int(45)));
        assert_eq!(values.get("req_random_agent"), Some(&OptionValue::Flag(true)));
    }

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tool.path, "sqlmap");
        assert_eq!(config.run.max_lines, 10_000);
        assert!(config.run.strip_ansi);
        assert!(config.values.is_empty());
    }

    #[test]
    fn rejects_unknown_value_id() {
        let catalog = Catalog::sqlmap();
        let mut values = ValueSet::new();
        let mut table = toml::Table::new();
        table.insert("bogus".into(), toml::Value::Boolean(true));
        assert!(apply_values(&catalog, &table, &mut values).is_err());
    }
}
