//! Configuration - engine settings from YAML, deployment parameters from JSON

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::chain::DevChainConfig;
use crate::error::ParamErrorKind;
use crate::providers::{ConfigProvider, ParamLookup};

const CONFIG_FILE: &str = "deployflow.yml";

/// Top-level config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub devnet: DevChainConfig,
}

impl Config {
    /// Load config from YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Use `deployflow.yml` from the current directory if present, defaults otherwise
    pub fn auto_load() -> Result<Self> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            return Self::from_file(path);
        }
        Ok(Self::default())
    }
}

/// Transaction-lifecycle settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between confirmation checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Blocks without confirmation before a transaction is bumped
    #[serde(default = "default_blocks_before_bump")]
    pub blocks_before_bump: u64,
    /// Replacements allowed before giving up
    #[serde(default = "default_max_replacements")]
    pub max_replacements: u32,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_blocks_before_bump() -> u64 {
    5
}

fn default_max_replacements() -> u32 {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            blocks_before_bump: default_blocks_before_bump(),
            max_replacements: default_max_replacements(),
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }
}

/// Deployment parameters supplied as a flat JSON object.
///
/// `None` means no parameters object was given at all, which is reported
/// differently from an object that lacks a key.
#[derive(Debug, Clone, Default)]
pub struct JsonParameters {
    params: Option<HashMap<String, Value>>,
}

impl JsonParameters {
    /// No parameters object
    pub fn none() -> Self {
        Self { params: None }
    }

    pub fn from_map(params: HashMap<String, Value>) -> Self {
        Self {
            params: Some(params),
        }
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self::from_map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Load a parameters file (a JSON object)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading parameters {}", path.display()))?;
        let params: HashMap<String, Value> = serde_json::from_str(&content)
            .with_context(|| format!("parameters file {} must be a JSON object", path.display()))?;
        log::info!("Loaded {} parameters from {}", params.len(), path.display());
        Ok(Self::from_map(params))
    }

    pub fn is_supplied(&self) -> bool {
        self.params.is_some()
    }
}

impl ConfigProvider for JsonParameters {
    fn has_param(&self, label: &str) -> ParamLookup {
        match &self.params {
            None => ParamLookup::NotFound(ParamErrorKind::NoParams),
            Some(params) if params.contains_key(label) => ParamLookup::Found,
            Some(_) => ParamLookup::NotFound(ParamErrorKind::ParamMissing),
        }
    }

    fn get_param(&self, label: &str) -> Option<Value> {
        self.params.as_ref().and_then(|p| p.get(label)).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_engine_defaults() {
        let config: Config = serde_yaml::from_str("engine:\n  poll_interval_ms: 50\n").unwrap();
        assert_eq!(config.engine.poll_interval_ms, 50);
        assert_eq!(config.engine.blocks_before_bump, 5);
        assert_eq!(config.engine.max_replacements, 4);
        assert_eq!(config.engine.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_empty_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployflow.yml");
        std::fs::write(&path, "{}\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_parameter_lookup_kinds() {
        let none = JsonParameters::none();
        assert_eq!(
            none.has_param("x"),
            ParamLookup::NotFound(ParamErrorKind::NoParams)
        );

        let some = JsonParameters::from_pairs([("x", json!(1))]);
        assert_eq!(some.has_param("x"), ParamLookup::Found);
        assert_eq!(some.get_param("x"), Some(json!(1)));
        assert_eq!(
            some.has_param("y"),
            ParamLookup::NotFound(ParamErrorKind::ParamMissing)
        );
    }

    #[test]
    fn test_parameters_file_must_be_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(JsonParameters::from_file(&path).is_err());

        std::fs::write(&path, r#"{"owner": "0x01"}"#).unwrap();
        let params = JsonParameters::from_file(&path).unwrap();
        assert!(params.is_supplied());
        assert_eq!(params.get_param("owner"), Some(json!("0x01")));
    }
}
