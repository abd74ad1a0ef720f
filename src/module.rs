//! Module files - deployment modules declared in YAML
//!
//! ```yaml
//! name: Token
//! actions:
//!   - id: math
//!     library: Math
//!   - id: token
//!     contract: Token
//!     args: ["Gold", { param: supply, default: 1000 }]
//!     libraries: { Math: { ref: math } }
//!   - call: token
//!     method: mint
//!     args: [{ param: owner }, 100]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::artifacts::Artifact;
use crate::chain::{Address, TxOverrides};
use crate::core::{ActionOptions, ArgValue, DeclarativeGraph, Handle, ModuleBuilder};
use crate::error::DeployError;

/// Top-level module file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleFile {
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

/// One action; exactly one action key must be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    /// Key other actions use to reference this one
    #[serde(default)]
    pub id: Option<String>,
    /// Overrides the derived label
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub contract: Option<String>,
    #[serde(default)]
    pub contract_artifact: Option<PathBuf>,
    #[serde(default)]
    pub existing: Option<String>,
    #[serde(default)]
    pub call: Option<String>,
    #[serde(default)]
    pub library: Option<String>,
    #[serde(default)]
    pub library_artifact: Option<PathBuf>,
    #[serde(default)]
    pub send_eth: Option<ArgSpec>,
    #[serde(default)]
    pub module: Option<String>,

    /// Name of an existing contract
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub abi: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub libraries: BTreeMap<String, ArgSpec>,
    #[serde(default)]
    pub value: Option<ArgSpec>,
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub overrides: TxOverrides,

    /// Submodule body
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
}

/// An argument in a module file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    Ref {
        #[serde(rename = "ref")]
        reference: String,
    },
    Param {
        param: String,
        #[serde(default)]
        default: Option<Value>,
    },
    Literal(Value),
}

impl ModuleFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading module {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing module {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Declare every action and build the graph. Artifact paths are relative
    /// to `base_dir`.
    pub fn build(&self, base_dir: &Path) -> Result<DeclarativeGraph> {
        let mut builder = ModuleBuilder::new(self.name.clone());
        let mut handles = HashMap::new();
        declare(&mut builder, &self.actions, &mut handles, base_dir)
            .with_context(|| format!("declaring module {}", self.name))?;
        let graph = builder
            .build()
            .with_context(|| format!("building module {}", self.name))?;
        Ok(graph)
    }
}

/// Load a module file and build its declarative graph
pub fn load_module(path: &Path) -> Result<DeclarativeGraph> {
    let module = ModuleFile::from_file(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    module.build(base_dir)
}

fn declare(
    builder: &mut ModuleBuilder,
    actions: &[ActionSpec],
    handles: &mut HashMap<String, Handle>,
    base_dir: &Path,
) -> crate::core::Result<()> {
    for (index, action) in actions.iter().enumerate() {
        let handle = declare_action(builder, action, handles, base_dir)
            .map_err(|e| match e {
                DeployError::Config(msg) => {
                    DeployError::Config(format!("action {} in {}: {}", index + 1, builder.scope(), msg))
                }
                other => other,
            })?;

        if let Some(id) = &action.id {
            if handles.insert(id.clone(), handle).is_some() {
                return Err(DeployError::Config(format!("duplicate action id '{}'", id)));
            }
        }
    }
    Ok(())
}

fn declare_action(
    builder: &mut ModuleBuilder,
    action: &ActionSpec,
    handles: &mut HashMap<String, Handle>,
    base_dir: &Path,
) -> crate::core::Result<Handle> {
    let keys = [
        action.contract.is_some(),
        action.contract_artifact.is_some(),
        action.existing.is_some(),
        action.call.is_some(),
        action.library.is_some(),
        action.library_artifact.is_some(),
        action.send_eth.is_some(),
        action.module.is_some(),
    ];
    if keys.iter().filter(|set| **set).count() != 1 {
        return Err(DeployError::Config(
            "expected exactly one of contract, contract_artifact, existing, call, library, library_artifact, send_eth, module".into(),
        ));
    }

    let mut opts = ActionOptions::new().overrides(action.overrides);
    opts.id = action.label.clone();
    for id in &action.after {
        opts = opts.after(lookup(handles, id)?);
    }

    if let Some(name) = &action.module {
        if !action.args.is_empty()
            || !action.libraries.is_empty()
            || action.value.is_some()
            || !action.overrides.is_empty()
        {
            return Err(DeployError::Config(format!(
                "module '{}' takes only id, label, after, parameters and actions",
                name
            )));
        }
        let parameters = action.parameters.clone();
        let inner = &action.actions;
        return builder.use_module(name, parameters, opts, |sub| {
            declare(sub, inner, handles, base_dir)
        });
    }

    for arg in &action.args {
        opts = opts.arg(argument(builder, handles, arg)?);
    }
    for (name, arg) in &action.libraries {
        opts = opts.library(name.clone(), argument(builder, handles, arg)?);
    }
    if let Some(value) = &action.value {
        opts = opts.value(argument(builder, handles, value)?);
    }

    if let Some(name) = &action.contract {
        builder.contract(name, opts)
    } else if let Some(path) = &action.contract_artifact {
        let artifact = load_artifact(base_dir, path)?;
        let name = artifact.contract_name.clone();
        builder.contract_from_artifact(&name, artifact, opts)
    } else if let Some(address) = &action.existing {
        let name = action
            .name
            .as_deref()
            .ok_or_else(|| DeployError::Config("existing contract needs a name".into()))?;
        let abi = action.abi.clone().unwrap_or_else(|| Value::Array(Vec::new()));
        builder.contract_at(name, Address::new(address.clone()), abi, opts)
    } else if let Some(target) = &action.call {
        let method = action
            .method
            .as_deref()
            .ok_or_else(|| DeployError::Config(format!("call on '{}' needs a method", target)))?;
        let contract = lookup(handles, target)?.clone();
        if contract.is_ordering_only() {
            return Err(DeployError::Config(format!(
                "module '{}' is not a contract; call one of its actions instead",
                target
            )));
        }
        builder.call(&contract, method, opts)
    } else if let Some(name) = &action.library {
        builder.library(name, opts)
    } else if let Some(path) = &action.library_artifact {
        let artifact = load_artifact(base_dir, path)?;
        let name = artifact.contract_name.clone();
        builder.library_from_artifact(&name, artifact, opts)
    } else if let Some(to) = &action.send_eth {
        let to = argument(builder, handles, to)?;
        let value = opts.value.take().unwrap_or_else(|| ArgValue::literal(0));
        builder.send_eth(to, value, opts)
    } else {
        Err(DeployError::Config("action has no kind".into()))
    }
}

fn lookup<'a>(handles: &'a HashMap<String, Handle>, id: &str) -> crate::core::Result<&'a Handle> {
    handles
        .get(id)
        .ok_or_else(|| DeployError::Config(format!("unknown action id '{}'", id)))
}

fn argument(
    builder: &ModuleBuilder,
    handles: &HashMap<String, Handle>,
    arg: &ArgSpec,
) -> crate::core::Result<ArgValue> {
    match arg {
        ArgSpec::Literal(value) => Ok(ArgValue::Literal(value.clone())),
        ArgSpec::Param {
            param,
            default: None,
        } => Ok(builder.param(param)),
        ArgSpec::Param {
            param,
            default: Some(default),
        } => Ok(builder.optional_param(param, default.clone())),
        ArgSpec::Ref { reference } => {
            let handle = lookup(handles, reference)?;
            if handle.is_ordering_only() {
                return Err(DeployError::Config(format!(
                    "module '{}' has no value; use it in `after` instead",
                    reference
                )));
            }
            Ok(handle.future())
        }
    }
}

fn load_artifact(base_dir: &Path, path: &Path) -> crate::core::Result<Artifact> {
    let full = base_dir.join(path);
    Artifact::from_file(&full).map_err(|e| DeployError::Config(format!("{:#}", e)))
}
