//! Execution graph - resolved, execution-ready vertices

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use super::adjacency::{Adjacency, VertexId};
use super::future::{ResolvedArg, VertexRef};
use crate::artifacts::Artifact;
use crate::chain::{Address, TxOverrides};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ExecutionVertex {
    ContractDeploy {
        artifact: Artifact,
        args: Vec<ResolvedArg>,
        libraries: BTreeMap<String, ResolvedArg>,
    },
    LibraryDeploy {
        artifact: Artifact,
        args: Vec<ResolvedArg>,
    },
    DeployedContract {
        address: Address,
        abi: Value,
    },
    ContractCall {
        contract: ResolvedArg,
        method: String,
        args: Vec<ResolvedArg>,
        value: ResolvedArg,
    },
    SentEth {
        to: ResolvedArg,
        value: ResolvedArg,
    },
}

impl ExecutionVertex {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ContractDeploy { .. } => "contract-deploy",
            Self::LibraryDeploy { .. } => "library-deploy",
            Self::DeployedContract { .. } => "deployed-contract",
            Self::ContractCall { .. } => "contract-call",
            Self::SentEth { .. } => "sent-eth",
        }
    }

    /// Vertex results this vertex still waits on
    pub fn dependencies(&self) -> Vec<&VertexRef> {
        let slots: Vec<&ResolvedArg> = match self {
            Self::ContractDeploy { args, libraries, .. } => {
                args.iter().chain(libraries.values()).collect()
            }
            Self::LibraryDeploy { args, .. } => args.iter().collect(),
            Self::DeployedContract { .. } => Vec::new(),
            Self::ContractCall {
                contract,
                args,
                value,
                ..
            } => std::iter::once(contract)
                .chain(args.iter())
                .chain(std::iter::once(value))
                .collect(),
            Self::SentEth { to, value } => vec![to, value],
        };
        slots.into_iter().filter_map(ResolvedArg::dependency).collect()
    }

    /// Whether running this vertex sends a transaction
    pub fn is_on_chain(&self) -> bool {
        !matches!(self, Self::DeployedContract { .. })
    }
}

/// A resolved vertex with the identity it had in the declarative graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub id: VertexId,
    pub label: String,
    pub vertex: ExecutionVertex,
    #[serde(default, skip_serializing_if = "TxOverrides::is_empty")]
    pub overrides: TxOverrides,
}

impl fmt::Display for ExecutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.vertex.tag(), self.label)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionGraph {
    vertices: BTreeMap<VertexId, ExecutionNode>,
    adjacency: Adjacency,
}

impl ExecutionGraph {
    pub fn new(vertices: BTreeMap<VertexId, ExecutionNode>, adjacency: Adjacency) -> Self {
        Self {
            vertices,
            adjacency,
        }
    }

    pub fn vertex(&self, id: VertexId) -> Option<&ExecutionNode> {
        self.vertices.get(&id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.vertices.values()
    }

    pub fn adjacency(&self) -> &Adjacency {
        &self.adjacency
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices in dependency order (ties by id); `None` if the graph is cyclic
    pub fn ordered(&self) -> Option<Vec<&ExecutionNode>> {
        let order = self.adjacency.topological_order().ok()?;
        Some(order.iter().filter_map(|id| self.vertices.get(id)).collect())
    }
}
