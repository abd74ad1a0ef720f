//! Deployment journal - record per-vertex outcomes across runs

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::chain::{Address, TxHash};
use crate::core::{DeploymentResult, VertexId, VertexOutcome, VertexOutput, VertexStatus};

pub const JOURNAL_DIR: &str = ".deployflow/deployments";

const LATEST: &str = "latest.json";

/// One deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentJournal {
    pub id: String,
    pub module: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub vertices: BTreeMap<VertexId, JournalEntry>,
}

/// What happened to a single vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub label: String,
    pub status: VertexStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JournalEntry {
    fn from_outcome(label: &str, outcome: &VertexOutcome) -> Self {
        let mut entry = Self {
            label: label.to_string(),
            status: VertexStatus::Completed,
            address: None,
            tx: None,
            error: None,
        };
        match outcome {
            VertexOutcome::Completed(output) => {
                if let VertexOutput::Contract { address, .. } = output {
                    entry.address = Some(address.clone());
                }
                entry.tx = output.transaction().cloned();
            }
            VertexOutcome::Failed(e) => {
                entry.status = VertexStatus::Failed;
                entry.error = Some(e.to_string());
            }
            VertexOutcome::Skipped { cause } => {
                entry.status = VertexStatus::Skipped;
                entry.error = Some(format!("dependency {} did not complete", cause));
            }
        }
        entry
    }
}

impl DeploymentJournal {
    /// Start a journal for a run of `module`
    pub fn new(module: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            id: started_at.format("%Y-%m-%d-%H-%M-%S-%3f").to_string(),
            module: module.into(),
            started_at,
            finished_at: None,
            vertices: BTreeMap::new(),
        }
    }

    /// Copy every vertex outcome from an execution result
    pub fn record(&mut self, result: &DeploymentResult) {
        for (id, report) in result.reports() {
            self.vertices
                .insert(id, JournalEntry::from_outcome(&report.label, &report.outcome));
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.vertices
            .values()
            .all(|e| e.status == VertexStatus::Completed)
    }

    /// Save under `dir` and point `latest.json` at it
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;

        let file_name = format!("{}.json", self.id);
        let path = dir.join(&file_name);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, &json)?;

        let latest_path = dir.join(LATEST);
        let _ = fs::remove_file(&latest_path);
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&file_name, &latest_path)?;
        }
        #[cfg(not(unix))]
        {
            fs::write(&latest_path, &json)?;
        }

        log::info!("Journal written to {}", path.display());
        Ok(path)
    }

    pub fn load(dir: &Path, id: &str) -> Result<Self> {
        Self::read(&dir.join(format!("{}.json", id)))
    }

    pub fn load_latest(dir: &Path) -> Result<Self> {
        let latest_path = dir.join(LATEST);
        if !latest_path.exists() {
            anyhow::bail!("No deployments recorded in {}", dir.display());
        }
        Self::read(&latest_path)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let journal: DeploymentJournal = serde_json::from_str(&content)?;
        Ok(journal)
    }

    /// Journal ids, most recent first
    pub fn list_all(dir: &Path) -> Result<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if stem != "latest" {
                        ids.push(stem.to_string());
                    }
                }
            }
        }

        ids.sort();
        ids.reverse();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;

    #[test]
    fn test_entries_from_outcomes() {
        let done = JournalEntry::from_outcome(
            "M#Token",
            &VertexOutcome::Completed(VertexOutput::Contract {
                address: Address::new("0xc0de"),
                tx: Some(TxHash::new("0x01")),
            }),
        );
        assert_eq!(done.status, VertexStatus::Completed);
        assert_eq!(done.address, Some(Address::new("0xc0de")));
        assert_eq!(done.tx, Some(TxHash::new("0x01")));

        let failed = JournalEntry::from_outcome(
            "M#Token.mint",
            &VertexOutcome::Failed(DeployError::TransactionReverted { hash: "0x02".into() }),
        );
        assert_eq!(failed.status, VertexStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Transaction 0x02 reverted"));

        let skipped = JournalEntry::from_outcome(
            "M#send/1",
            &VertexOutcome::Skipped {
                cause: "M#Token.mint".into(),
            },
        );
        assert_eq!(skipped.status, VertexStatus::Skipped);
    }

    #[test]
    fn test_save_load_and_list() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = DeploymentJournal::new("Token");
        first.id = "2026-01-01-00-00-00-000".into();
        first.finish();
        first.save(dir.path()).unwrap();

        let mut second = DeploymentJournal::new("Token");
        second.id = "2026-01-02-00-00-00-000".into();
        second.vertices.insert(
            0,
            JournalEntry {
                label: "Token#Token".into(),
                status: VertexStatus::Failed,
                address: None,
                tx: None,
                error: Some("boom".into()),
            },
        );
        second.save(dir.path()).unwrap();

        assert_eq!(
            DeploymentJournal::list_all(dir.path()).unwrap(),
            vec![second.id.clone(), first.id.clone()]
        );

        let latest = DeploymentJournal::load_latest(dir.path()).unwrap();
        assert_eq!(latest.id, second.id);
        assert!(!latest.is_success());
        assert_eq!(latest.vertices[&0].error.as_deref(), Some("boom"));

        let loaded = DeploymentJournal::load(dir.path(), &first.id).unwrap();
        assert!(loaded.finished_at.is_some());
        assert!(loaded.is_success());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nothing");
        assert!(DeploymentJournal::list_all(&missing).unwrap().is_empty());
        assert!(DeploymentJournal::load_latest(&missing).is_err());
    }
}
