//! Artifact store - compiled contract metadata loaded from Hardhat-style JSON

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::DeployError;
use crate::providers::ArtifactProvider;

/// Compiled contract or library: bytecode plus interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    #[serde(default)]
    pub abi: serde_json::Value,
    pub bytecode: String,
}

impl Artifact {
    pub fn new(contract_name: impl Into<String>, bytecode: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            abi: serde_json::Value::Array(Vec::new()),
            bytecode: bytecode.into(),
        }
    }

    pub fn with_abi(mut self, abi: serde_json::Value) -> Self {
        self.abi = abi;
        self
    }

    /// Load a single artifact file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading artifact {}", path.display()))?;
        let artifact: Artifact = serde_json::from_str(&content)
            .with_context(|| format!("parsing artifact {}", path.display()))?;
        Ok(artifact)
    }

    /// Names of the functions declared in the ABI
    pub fn function_names(&self) -> Vec<String> {
        function_names(&self.abi)
    }
}

/// Function names declared in a JSON ABI
pub fn function_names(abi: &serde_json::Value) -> Vec<String> {
    abi.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter(|e| e.get("type").and_then(|t| t.as_str()) == Some("function"))
                .filter_map(|e| e.get("name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// In-memory registry of artifacts keyed by contract name
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<String, Artifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` artifact under `dir` (recursively)
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut store = Self::new();
        store.scan(dir)?;
        log::info!("Loaded {} artifacts from {}", store.len(), dir.display());
        Ok(store)
    }

    fn scan(&mut self, dir: &Path) -> Result<()> {
        for entry in std::fs::read_dir(dir)
            .with_context(|| format!("reading artifacts directory {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                self.scan(&path)?;
            } else if path.extension().and_then(|s| s.to_str()) == Some("json") {
                // Build-info and debug files share the extension but not the shape
                match Artifact::from_file(&path) {
                    Ok(artifact) => self.insert(artifact),
                    Err(e) => log::debug!("Skipping {}: {:#}", path.display(), e),
                }
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, artifact: Artifact) {
        self.artifacts
            .insert(artifact.contract_name.clone(), artifact);
    }

    pub fn with(mut self, artifact: Artifact) -> Self {
        self.insert(artifact);
        self
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactProvider for ArtifactStore {
    fn get_artifact(&self, name: &str) -> crate::core::Result<Artifact> {
        self.artifacts
            .get(name)
            .cloned()
            .ok_or_else(|| DeployError::ArtifactNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name() {
        let store = ArtifactStore::new().with(Artifact::new("Token", "0x6000"));
        assert_eq!(store.get_artifact("Token").unwrap().bytecode, "0x6000");
        assert_eq!(
            store.get_artifact("Missing"),
            Err(DeployError::ArtifactNotFound {
                name: "Missing".into()
            })
        );
    }

    #[test]
    fn test_load_dir_skips_foreign_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Token.json"),
            r#"{"contractName":"Token","abi":[{"type":"function","name":"mint"}],"bytecode":"0x60"}"#,
        )
        .unwrap();
        std::fs::create_dir(dir.path().join("build-info")).unwrap();
        std::fs::write(dir.path().join("build-info/abc.json"), r#"{"id":"abc"}"#).unwrap();

        let store = ArtifactStore::load_dir(dir.path()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get_artifact("Token").unwrap().function_names(),
            vec!["mint"]
        );
    }
}
