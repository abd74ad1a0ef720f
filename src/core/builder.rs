//! Module builder - declares deployment actions and assembles the
//! declarative graph

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::adjacency::VertexId;
use super::future::{ArgValue, Future, ParameterFuture, ParameterKind, VertexRef};
use super::graph::{DeclarativeGraph, DeclarativeKind};
use super::Result;
use crate::artifacts::Artifact;
use crate::chain::{Address, TxOverrides};
use crate::error::DeployError;

/// A declared action, usable as an argument or an `after` target
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub id: VertexId,
    pub scope: String,
    pub label: String,
    ordering_only: bool,
}

impl Handle {
    pub fn qualified_label(&self) -> String {
        format!("{}#{}", self.scope, self.label)
    }

    /// Submodule handles carry no value
    pub fn is_ordering_only(&self) -> bool {
        self.ordering_only
    }

    /// The value this action produces. Submodule handles only order.
    pub fn future(&self) -> ArgValue {
        let r = VertexRef {
            vertex: self.id,
            label: self.qualified_label(),
        };
        if self.ordering_only {
            ArgValue::Future(Future::Virtual(r))
        } else {
            ArgValue::Future(Future::VertexResult(r))
        }
    }
}

impl From<&Handle> for ArgValue {
    fn from(handle: &Handle) -> Self {
        handle.future()
    }
}

/// Optional settings shared by every action
#[derive(Debug, Clone, Default)]
pub struct ActionOptions {
    /// Label override, otherwise derived from the action
    pub id: Option<String>,
    pub args: Vec<ArgValue>,
    pub libraries: BTreeMap<String, ArgValue>,
    pub after: Vec<VertexId>,
    pub value: Option<ArgValue>,
    pub overrides: TxOverrides,
}

impl ActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<ArgValue>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn library(mut self, name: impl Into<String>, address: impl Into<ArgValue>) -> Self {
        self.libraries.insert(name.into(), address.into());
        self
    }

    pub fn after(mut self, handle: &Handle) -> Self {
        self.after.push(handle.id);
        self
    }

    pub fn value(mut self, value: impl Into<ArgValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn overrides(mut self, overrides: TxOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

pub struct ModuleBuilder {
    graph: DeclarativeGraph,
    scope: String,
    /// Dependencies every action in the current scope picks up
    implicit_after: Vec<VertexId>,
    labels: HashSet<String>,
    transfers: HashMap<String, usize>,
    created: Vec<VertexId>,
}

impl ModuleBuilder {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            graph: DeclarativeGraph::new(),
            scope: module.into(),
            implicit_after: Vec::new(),
            labels: HashSet::new(),
            transfers: HashMap::new(),
            created: Vec::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Deploy a contract whose artifact is looked up by name
    pub fn contract(&mut self, name: &str, opts: ActionOptions) -> Result<Handle> {
        let kind = DeclarativeKind::ContractFromRegistry {
            name: name.to_string(),
            args: opts.args.clone(),
            libraries: opts.libraries.clone(),
        };
        self.add(name, kind, opts)
    }

    pub fn contract_from_artifact(
        &mut self,
        name: &str,
        artifact: Artifact,
        opts: ActionOptions,
    ) -> Result<Handle> {
        let kind = DeclarativeKind::ContractFromArtifact {
            artifact,
            args: opts.args.clone(),
            libraries: opts.libraries.clone(),
        };
        self.add(name, kind, opts)
    }

    /// Reference a contract that is already deployed
    pub fn contract_at(
        &mut self,
        name: &str,
        address: Address,
        abi: Value,
        opts: ActionOptions,
    ) -> Result<Handle> {
        self.add(name, DeclarativeKind::ExistingContract { address, abi }, opts)
    }

    pub fn call(&mut self, contract: &Handle, method: &str, opts: ActionOptions) -> Result<Handle> {
        let kind = DeclarativeKind::MethodCall {
            contract: contract.future(),
            method: method.to_string(),
            args: opts.args.clone(),
            value: opts.value.clone().unwrap_or_else(|| ArgValue::literal(0)),
        };
        self.add(&format!("{}.{}", contract.label, method), kind, opts)
    }

    pub fn library(&mut self, name: &str, opts: ActionOptions) -> Result<Handle> {
        let kind = DeclarativeKind::LibraryFromRegistry {
            name: name.to_string(),
            args: opts.args.clone(),
        };
        self.add(name, kind, opts)
    }

    pub fn library_from_artifact(
        &mut self,
        name: &str,
        artifact: Artifact,
        opts: ActionOptions,
    ) -> Result<Handle> {
        let kind = DeclarativeKind::LibraryFromArtifact {
            artifact,
            args: opts.args.clone(),
        };
        self.add(name, kind, opts)
    }

    /// Plain value transfer, labelled `send/N` within the scope
    pub fn send_eth(
        &mut self,
        to: impl Into<ArgValue>,
        value: impl Into<ArgValue>,
        opts: ActionOptions,
    ) -> Result<Handle> {
        let count = self.transfers.entry(self.scope.clone()).or_default();
        *count += 1;
        let label = format!("send/{}", count);
        let kind = DeclarativeKind::SendEth {
            to: to.into(),
            value: value.into(),
        };
        self.add(&label, kind, opts)
    }

    /// Required parameter of the current scope
    pub fn param(&self, label: &str) -> ArgValue {
        self.parameter(label, ParameterKind::Required)
    }

    pub fn optional_param(&self, label: &str, default: impl Into<Value>) -> ArgValue {
        self.parameter(
            label,
            ParameterKind::Optional {
                default: default.into(),
            },
        )
    }

    fn parameter(&self, label: &str, kind: ParameterKind) -> ArgValue {
        ArgValue::Future(Future::Parameter(ParameterFuture {
            scope: self.scope.clone(),
            label: label.to_string(),
            kind,
        }))
    }

    /// Declare a submodule in scope `name`.
    ///
    /// `parameters` are registered for the submodule's own parameters and
    /// every inner action depends on `opts.after`. The returned handle
    /// depends on every inner action and may only be used for ordering.
    pub fn use_module<F>(
        &mut self,
        name: &str,
        parameters: HashMap<String, Value>,
        opts: ActionOptions,
        body: F,
    ) -> Result<Handle>
    where
        F: FnOnce(&mut ModuleBuilder) -> Result<()>,
    {
        let qualified = format!("{}#{}", name, name);
        if self.labels.contains(&qualified) {
            return Err(DeployError::Config(format!("module {} is used twice", name)));
        }

        self.graph.register_parameters(name, parameters);

        let outer_scope = std::mem::replace(&mut self.scope, name.to_string());
        let mut inner_after = self.implicit_after.clone();
        inner_after.extend(opts.after.iter().copied());
        let outer_after = std::mem::replace(&mut self.implicit_after, inner_after);
        let start = self.created.len();

        let outcome = body(self);

        self.scope = outer_scope;
        self.implicit_after = outer_after;
        outcome?;

        let inner: Vec<VertexId> = self.created[start..].to_vec();
        let id = self
            .graph
            .add_vertex(name, name, DeclarativeKind::Virtual, &inner, TxOverrides::default())?;
        self.labels.insert(qualified);
        self.created.push(id);
        log::debug!("Module {} declared {} actions", name, inner.len());

        Ok(Handle {
            id,
            scope: name.to_string(),
            label: name.to_string(),
            ordering_only: true,
        })
    }

    fn add(&mut self, default_label: &str, kind: DeclarativeKind, opts: ActionOptions) -> Result<Handle> {
        let label = opts.id.unwrap_or_else(|| default_label.to_string());
        let qualified = format!("{}#{}", self.scope, label);
        if let Some(Future::Virtual(r)) = kind
            .futures()
            .into_iter()
            .find(|f| matches!(f, Future::Virtual(_)))
        {
            return Err(DeployError::Config(format!(
                "{}: module {} has no value; use it in `after` instead",
                qualified, r.label
            )));
        }
        if self.labels.contains(&qualified) {
            return Err(DeployError::Config(format!(
                "duplicate action {}; give it an explicit id",
                qualified
            )));
        }

        let mut after = self.implicit_after.clone();
        after.extend(opts.after);
        let id = self
            .graph
            .add_vertex(self.scope.clone(), label.clone(), kind, &after, opts.overrides)?;
        self.labels.insert(qualified);
        self.created.push(id);

        Ok(Handle {
            id,
            scope: self.scope.clone(),
            label,
            ordering_only: false,
        })
    }

    /// Eliminate submodule markers and check the result is acyclic
    pub fn build(mut self) -> Result<DeclarativeGraph> {
        let removed = self.graph.eliminate_virtuals()?;
        self.graph.validate()?;
        log::info!(
            "Module {} built: {} vertices ({} submodule markers removed)",
            self.scope,
            self.graph.len(),
            removed.len()
        );
        Ok(self.graph)
    }
}
