//! Error taxonomy for graph resolution and transaction handling

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::VertexId;

/// Why a required parameter could not be found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParamErrorKind {
    /// No parameters object was supplied at all
    NoParams,
    /// A parameters object was supplied but lacks the key
    ParamMissing,
}

impl fmt::Display for ParamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoParams => write!(f, "no-params"),
            Self::ParamMissing => write!(f, "param-missing"),
        }
    }
}

fn describe_param_error(label: &str, kind: &ParamErrorKind) -> String {
    match kind {
        ParamErrorKind::NoParams => format!(
            "No parameters object provided to deploy options, but module requires parameter \"{}\"",
            label
        ),
        ParamErrorKind::ParamMissing => format!("No parameter provided for \"{}\"", label),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    // Internal invariants
    #[error("Graph invariant violated: {0}")]
    GraphInvariant(String),

    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    // User-facing resolution errors
    #[error("{}", describe_param_error(.label, .kind))]
    Parameter { label: String, kind: ParamErrorKind },

    #[error("Artifact not found: {name}")]
    ArtifactNotFound { name: String },

    #[error("Invalid argument for {label}: {message}")]
    InvalidArgument { label: String, message: String },

    #[error("Config error: {0}")]
    Config(String),

    // Transaction lifecycle
    #[error("Invalid fee override: {0}")]
    InvalidFeeOverride(String),

    #[error("Transaction {hash} has neither a legacy gas price nor a complete EIP-1559 fee pair")]
    TransactionFeeModel { hash: String },

    #[error("Transaction {hash} not confirmed after {replacements} replacements")]
    TransactionTimeout { hash: String, replacements: u32 },

    #[error("Transaction {hash} reverted")]
    TransactionReverted { hash: String },

    #[error("Network error: {0}")]
    Network(String),
}

impl DeployError {
    /// A Virtual vertex reached a stage that only accepts data-bearing vertices
    pub fn virtual_vertex(id: VertexId, label: &str) -> Self {
        Self::GraphInvariant(format!(
            "virtual vertex {} ({}) reached the transformer; virtual vertices must be eliminated while building the graph",
            id, label
        ))
    }

    /// A variant appeared where it has no meaning
    pub fn unexpected_tag(tag: &str, context: &str) -> Self {
        Self::GraphInvariant(format!("unexpected '{}' in {}", tag, context))
    }

    /// True for failures caused by a bug in graph construction rather than user input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::GraphInvariant(_) | Self::TransactionFeeModel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_messages_are_distinct() {
        let no_params = DeployError::Parameter {
            label: "owner".to_string(),
            kind: ParamErrorKind::NoParams,
        };
        let missing = DeployError::Parameter {
            label: "owner".to_string(),
            kind: ParamErrorKind::ParamMissing,
        };

        assert_eq!(
            no_params.to_string(),
            "No parameters object provided to deploy options, but module requires parameter \"owner\""
        );
        assert_eq!(missing.to_string(), "No parameter provided for \"owner\"");
    }

    #[test]
    fn test_virtual_vertex_names_id_and_label() {
        let err = DeployError::virtual_vertex(7, "Sub#end");
        let msg = err.to_string();
        assert!(msg.contains("7"));
        assert!(msg.contains("Sub#end"));
        assert!(err.is_internal());
    }

    #[test]
    fn test_cycle_display() {
        let err = DeployError::Cycle {
            path: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: A -> B -> A");
    }
}
