//! Declarative graph - the deployment actions a module declares, with their
//! data and ordering dependencies

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::adjacency::{Adjacency, VertexId};
use super::future::{ArgValue, Future, RegisteredParameters};
use super::Result;
use crate::artifacts::Artifact;
use crate::chain::{Address, TxOverrides};
use crate::error::DeployError;

/// What a declarative vertex asks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DeclarativeKind {
    ContractFromRegistry {
        name: String,
        args: Vec<ArgValue>,
        libraries: BTreeMap<String, ArgValue>,
    },
    ContractFromArtifact {
        artifact: Artifact,
        args: Vec<ArgValue>,
        libraries: BTreeMap<String, ArgValue>,
    },
    ExistingContract {
        address: Address,
        abi: Value,
    },
    MethodCall {
        contract: ArgValue,
        method: String,
        args: Vec<ArgValue>,
        value: ArgValue,
    },
    LibraryFromRegistry {
        name: String,
        args: Vec<ArgValue>,
    },
    LibraryFromArtifact {
        artifact: Artifact,
        args: Vec<ArgValue>,
    },
    SendEth {
        to: ArgValue,
        value: ArgValue,
    },
    Virtual,
}

impl DeclarativeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ContractFromRegistry { .. } => "contract-from-registry",
            Self::ContractFromArtifact { .. } => "contract-from-artifact",
            Self::ExistingContract { .. } => "existing-contract",
            Self::MethodCall { .. } => "method-call",
            Self::LibraryFromRegistry { .. } => "library-from-registry",
            Self::LibraryFromArtifact { .. } => "library-from-artifact",
            Self::SendEth { .. } => "send-eth",
            Self::Virtual => "virtual",
        }
    }

    /// Every argument slot, in declaration order
    pub fn arguments(&self) -> Vec<&ArgValue> {
        match self {
            Self::ContractFromRegistry { args, libraries, .. }
            | Self::ContractFromArtifact { args, libraries, .. } => {
                args.iter().chain(libraries.values()).collect()
            }
            Self::LibraryFromRegistry { args, .. } | Self::LibraryFromArtifact { args, .. } => {
                args.iter().collect()
            }
            Self::MethodCall {
                contract,
                args,
                value,
                ..
            } => std::iter::once(contract)
                .chain(args.iter())
                .chain(std::iter::once(value))
                .collect(),
            Self::SendEth { to, value } => vec![to, value],
            Self::ExistingContract { .. } | Self::Virtual => Vec::new(),
        }
    }

    /// Futures that appear anywhere in this vertex
    pub fn futures(&self) -> Vec<&Future> {
        self.arguments()
            .into_iter()
            .filter_map(ArgValue::as_future)
            .collect()
    }
}

/// A node of the declarative graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarativeVertex {
    pub id: VertexId,
    pub scope: String,
    pub label: String,
    pub kind: DeclarativeKind,
    #[serde(default, skip_serializing_if = "TxOverrides::is_empty")]
    pub overrides: TxOverrides,
}

impl DeclarativeVertex {
    /// `Scope#label`
    pub fn qualified_label(&self) -> String {
        format!("{}#{}", self.scope, self.label)
    }
}

impl fmt::Display for DeclarativeVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.kind.tag(), self.qualified_label())
    }
}

/// Vertices keyed by id, their dependency edges, and per-scope parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeclarativeGraph {
    vertices: BTreeMap<VertexId, DeclarativeVertex>,
    adjacency: Adjacency,
    #[serde(default)]
    registered_parameters: RegisteredParameters,
    next_id: VertexId,
}

impl DeclarativeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, deriving dependency edges from its futures plus the
    /// explicit `after` hints. Referenced vertices must already exist.
    pub fn add_vertex(
        &mut self,
        scope: impl Into<String>,
        label: impl Into<String>,
        kind: DeclarativeKind,
        after: &[VertexId],
        overrides: TxOverrides,
    ) -> Result<VertexId> {
        let id = self.next_id;
        let vertex = DeclarativeVertex {
            id,
            scope: scope.into(),
            label: label.into(),
            kind,
            overrides,
        };

        let mut deps: Vec<VertexId> = vertex
            .kind
            .futures()
            .iter()
            .filter_map(|f| f.dependency())
            .collect();
        deps.extend_from_slice(after);

        for dep in &deps {
            if !self.vertices.contains_key(dep) {
                return Err(DeployError::Config(format!(
                    "{} depends on unknown vertex {}",
                    vertex.qualified_label(),
                    dep
                )));
            }
        }

        self.next_id += 1;
        self.adjacency.add_vertex(id);
        for dep in deps {
            self.adjacency.add_edge(dep, id);
        }
        self.vertices.insert(id, vertex);
        Ok(id)
    }

    /// Add an ordering edge between two existing vertices
    pub fn add_dependency(&mut self, dependency: VertexId, dependent: VertexId) -> Result<()> {
        for id in [dependency, dependent] {
            if !self.vertices.contains_key(&id) {
                return Err(DeployError::Config(format!("unknown vertex {}", id)));
            }
        }
        self.adjacency.add_edge(dependency, dependent);
        Ok(())
    }

    pub fn register_parameters(&mut self, scope: impl Into<String>, params: HashMap<String, Value>) {
        self.registered_parameters
            .entry(scope.into())
            .or_default()
            .extend(params);
    }

    pub fn registered_parameters(&self) -> &RegisteredParameters {
        &self.registered_parameters
    }

    pub fn vertex(&self, id: VertexId) -> Option<&DeclarativeVertex> {
        self.vertices.get(&id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &DeclarativeVertex> {
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

    /// Find a vertex by its qualified label
    pub fn find(&self, qualified_label: &str) -> Option<&DeclarativeVertex> {
        self.vertices
            .values()
            .find(|v| v.qualified_label() == qualified_label)
    }

    /// Reject dependency cycles, naming the vertices involved
    pub fn validate(&self) -> Result<()> {
        match self.adjacency.find_cycle() {
            None => Ok(()),
            Some(cycle) => Err(DeployError::Cycle {
                path: cycle
                    .iter()
                    .map(|id| {
                        self.vertices
                            .get(id)
                            .map(|v| v.qualified_label())
                            .unwrap_or_else(|| id.to_string())
                    })
                    .collect(),
            }),
        }
    }

    /// Remove every Virtual vertex, handing its dependencies to its dependents.
    /// Returns the ids removed.
    pub fn eliminate_virtuals(&mut self) -> Result<Vec<VertexId>> {
        let virtuals: Vec<VertexId> = self
            .vertices
            .values()
            .filter(|v| v.kind == DeclarativeKind::Virtual)
            .map(|v| v.id)
            .collect();

        for id in &virtuals {
            let referenced_as_data = self.vertices.values().any(|v| {
                v.kind
                    .futures()
                    .iter()
                    .any(|f| matches!(f, Future::VertexResult(r) if r.vertex == *id))
            });
            if referenced_as_data {
                let label = self.vertices[id].qualified_label();
                return Err(DeployError::Config(format!(
                    "{} has no value and cannot be used as an argument",
                    label
                )));
            }

            self.adjacency.eliminate(*id);
            self.vertices.remove(id);
            log::debug!("Eliminated virtual vertex {}", id);
        }

        Ok(virtuals)
    }
}
