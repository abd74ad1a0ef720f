//! Futures - placeholder values and their resolution
//!
//! A future is either a deployment parameter (resolved here, before
//! execution), the result of another vertex (kept as a dependency and bound
//! by the executor just before its consumer runs), or a virtual ordering
//! marker that never carries data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::adjacency::VertexId;
use super::Result;
use crate::error::{DeployError, ParamErrorKind};
use crate::providers::{ConfigProvider, ParamLookup};

/// Parameters registered per scope: scope -> (name -> value)
pub type RegisteredParameters = HashMap<String, HashMap<String, Value>>;

/// Reference to another vertex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexRef {
    pub vertex: VertexId,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Required,
    Optional { default: Value },
}

/// A named deployment-time parameter declared in `scope`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterFuture {
    pub scope: String,
    pub label: String,
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Future {
    Parameter(ParameterFuture),
    VertexResult(VertexRef),
    Virtual(VertexRef),
}

impl Future {
    pub fn tag(&self) -> &'static str {
        match self {
            Future::Parameter(_) => "parameter",
            Future::VertexResult(_) => "vertex-result",
            Future::Virtual(_) => "virtual",
        }
    }

    /// The vertex this future depends on, if any
    pub fn dependency(&self) -> Option<VertexId> {
        match self {
            Future::Parameter(_) => None,
            Future::VertexResult(r) | Future::Virtual(r) => Some(r.vertex),
        }
    }
}

/// An argument in a declarative vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    Literal(Value),
    Future(Future),
}

impl ArgValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        ArgValue::Literal(value.into())
    }

    pub fn as_future(&self) -> Option<&Future> {
        match self {
            ArgValue::Future(f) => Some(f),
            ArgValue::Literal(_) => None,
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        ArgValue::Literal(value)
    }
}

impl From<Future> for ArgValue {
    fn from(future: Future) -> Self {
        ArgValue::Future(future)
    }
}

/// An argument in an execution vertex: a concrete value, or the output of a
/// vertex that has not run yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedArg {
    Value(Value),
    Dependency(VertexRef),
}

impl ResolvedArg {
    pub fn dependency(&self) -> Option<&VertexRef> {
        match self {
            ResolvedArg::Dependency(r) => Some(r),
            ResolvedArg::Value(_) => None,
        }
    }
}

/// Everything parameter resolution needs, passed explicitly
pub struct ResolutionContext<'a> {
    pub registered: &'a RegisteredParameters,
    pub config: &'a dyn ConfigProvider,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(registered: &'a RegisteredParameters, config: &'a dyn ConfigProvider) -> Self {
        Self { registered, config }
    }

    /// Resolve one argument
    pub fn resolve(&self, arg: &ArgValue) -> Result<ResolvedArg> {
        match arg {
            ArgValue::Literal(value) => Ok(ResolvedArg::Value(value.clone())),
            ArgValue::Future(Future::Parameter(param)) => {
                self.resolve_parameter(param).map(ResolvedArg::Value)
            }
            ArgValue::Future(Future::VertexResult(r)) => Ok(ResolvedArg::Dependency(r.clone())),
            ArgValue::Future(future @ Future::Virtual(r)) => Err(DeployError::unexpected_tag(
                future.tag(),
                &format!("a data position (references vertex {} {})", r.vertex, r.label),
            )),
        }
    }

    /// Resolve an argument list element-wise, preserving order
    pub fn resolve_all(&self, args: &[ArgValue]) -> Result<Vec<ResolvedArg>> {
        args.iter().map(|arg| self.resolve(arg)).collect()
    }

    /// Scope registration first, then the config provider, then the default
    pub fn resolve_parameter(&self, param: &ParameterFuture) -> Result<Value> {
        if let Some(value) = self
            .registered
            .get(&param.scope)
            .and_then(|scope| scope.get(&param.label))
        {
            return Ok(value.clone());
        }

        let missing = match self.config.has_param(&param.label) {
            ParamLookup::Found => match self.config.get_param(&param.label) {
                Some(value) => return Ok(value),
                None => ParamErrorKind::ParamMissing,
            },
            ParamLookup::NotFound(kind) => kind,
        };

        match &param.kind {
            ParameterKind::Optional { default } => Ok(default.clone()),
            ParameterKind::Required => Err(DeployError::Parameter {
                label: param.label.clone(),
                kind: missing,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonParameters;
    use serde_json::json;

    fn required(scope: &str, label: &str) -> ParameterFuture {
        ParameterFuture {
            scope: scope.into(),
            label: label.into(),
            kind: ParameterKind::Required,
        }
    }

    fn optional(scope: &str, label: &str, default: Value) -> ParameterFuture {
        ParameterFuture {
            scope: scope.into(),
            label: label.into(),
            kind: ParameterKind::Optional { default },
        }
    }

    fn registered(scope: &str, label: &str, value: Value) -> RegisteredParameters {
        let mut table = RegisteredParameters::new();
        table
            .entry(scope.to_string())
            .or_default()
            .insert(label.to_string(), value);
        table
    }

    #[test]
    fn test_scope_registration_takes_precedence() {
        let reg = registered("Sub", "supply", json!(10));
        let config = JsonParameters::from_pairs([("supply", json!(99))]);
        let ctx = ResolutionContext::new(&reg, &config);

        assert_eq!(ctx.resolve_parameter(&required("Sub", "supply")).unwrap(), json!(10));
        // Another scope does not see the registration
        assert_eq!(ctx.resolve_parameter(&required("Root", "supply")).unwrap(), json!(99));
    }

    #[test]
    fn test_required_without_config_is_no_params() {
        let reg = RegisteredParameters::new();
        let config = JsonParameters::none();
        let ctx = ResolutionContext::new(&reg, &config);

        let err = ctx.resolve_parameter(&required("M", "owner")).unwrap_err();
        assert_eq!(
            err,
            DeployError::Parameter {
                label: "owner".into(),
                kind: ParamErrorKind::NoParams
            }
        );
    }

    #[test]
    fn test_required_missing_key_is_param_missing() {
        let reg = RegisteredParameters::new();
        let config = JsonParameters::from_pairs([("other", json!(1))]);
        let ctx = ResolutionContext::new(&reg, &config);

        let err = ctx.resolve_parameter(&required("M", "owner")).unwrap_err();
        assert_eq!(
            err,
            DeployError::Parameter {
                label: "owner".into(),
                kind: ParamErrorKind::ParamMissing
            }
        );
    }

    #[test]
    fn test_optional_falls_back_to_default_either_way() {
        let reg = RegisteredParameters::new();
        let default = json!({"nested": [1, 2]});

        for config in [
            JsonParameters::none(),
            JsonParameters::from_pairs([("other", json!(1))]),
        ] {
            let ctx = ResolutionContext::new(&reg, &config);
            let value = ctx
                .resolve_parameter(&optional("M", "cfg", default.clone()))
                .unwrap();
            assert_eq!(value, default);
        }
    }

    #[test]
    fn test_literals_and_vertex_results_pass_through() {
        let reg = RegisteredParameters::new();
        let config = JsonParameters::none();
        let ctx = ResolutionContext::new(&reg, &config);
        let dep = VertexRef {
            vertex: 3,
            label: "M#Token".into(),
        };

        let resolved = ctx
            .resolve_all(&[
                ArgValue::literal("name"),
                ArgValue::Future(Future::VertexResult(dep.clone())),
                ArgValue::literal(7),
            ])
            .unwrap();

        assert_eq!(
            resolved,
            vec![
                ResolvedArg::Value(json!("name")),
                ResolvedArg::Dependency(dep),
                ResolvedArg::Value(json!(7)),
            ]
        );
    }

    #[test]
    fn test_virtual_future_in_data_position_is_invariant_error() {
        let reg = RegisteredParameters::new();
        let config = JsonParameters::none();
        let ctx = ResolutionContext::new(&reg, &config);

        let err = ctx
            .resolve(&ArgValue::Future(Future::Virtual(VertexRef {
                vertex: 1,
                label: "Sub".into(),
            })))
            .unwrap_err();
        assert!(matches!(err, DeployError::GraphInvariant(ref m) if m.contains("virtual")));
    }
}
