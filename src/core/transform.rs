//! Graph transformer - converts each declarative vertex into its execution
//! form, resolving parameters and keeping vertex results as dependencies

use std::collections::BTreeMap;

use super::future::{ArgValue, ResolutionContext, ResolvedArg};
use super::graph::{DeclarativeGraph, DeclarativeKind, DeclarativeVertex};
use super::plan::{ExecutionGraph, ExecutionNode, ExecutionVertex};
use super::Result;
use crate::error::DeployError;
use crate::providers::{ArtifactProvider, ConfigProvider};

/// Build the execution graph for a declarative graph
pub fn transform(
    graph: &DeclarativeGraph,
    artifacts: &dyn ArtifactProvider,
    config: &dyn ConfigProvider,
) -> Result<ExecutionGraph> {
    graph.validate()?;

    let ctx = ResolutionContext::new(graph.registered_parameters(), config);
    let mut vertices = BTreeMap::new();

    for vertex in graph.vertices() {
        let converted = convert_vertex(vertex, artifacts, &ctx)?;
        log::debug!("Transformed {} -> {}", vertex, converted.tag());
        vertices.insert(
            vertex.id,
            ExecutionNode {
                id: vertex.id,
                label: vertex.qualified_label(),
                vertex: converted,
                overrides: vertex.overrides,
            },
        );
    }

    log::info!("Execution graph ready: {} vertices", vertices.len());
    Ok(ExecutionGraph::new(vertices, graph.adjacency().clone()))
}

fn convert_vertex(
    vertex: &DeclarativeVertex,
    artifacts: &dyn ArtifactProvider,
    ctx: &ResolutionContext<'_>,
) -> Result<ExecutionVertex> {
    match &vertex.kind {
        DeclarativeKind::ContractFromRegistry {
            name,
            args,
            libraries,
        } => Ok(ExecutionVertex::ContractDeploy {
            artifact: artifacts.get_artifact(name)?,
            args: ctx.resolve_all(args)?,
            libraries: resolve_libraries(libraries, ctx)?,
        }),
        DeclarativeKind::ContractFromArtifact {
            artifact,
            args,
            libraries,
        } => Ok(ExecutionVertex::ContractDeploy {
            artifact: artifact.clone(),
            args: ctx.resolve_all(args)?,
            libraries: resolve_libraries(libraries, ctx)?,
        }),
        DeclarativeKind::ExistingContract { address, abi } => {
            Ok(ExecutionVertex::DeployedContract {
                address: address.clone(),
                abi: abi.clone(),
            })
        }
        DeclarativeKind::MethodCall {
            contract,
            method,
            args,
            value,
        } => Ok(ExecutionVertex::ContractCall {
            contract: ctx.resolve(contract)?,
            method: method.clone(),
            args: ctx.resolve_all(args)?,
            value: ctx.resolve(value)?,
        }),
        DeclarativeKind::LibraryFromRegistry { name, args } => Ok(ExecutionVertex::LibraryDeploy {
            artifact: artifacts.get_artifact(name)?,
            args: ctx.resolve_all(args)?,
        }),
        DeclarativeKind::LibraryFromArtifact { artifact, args } => {
            Ok(ExecutionVertex::LibraryDeploy {
                artifact: artifact.clone(),
                args: ctx.resolve_all(args)?,
            })
        }
        DeclarativeKind::SendEth { to, value } => Ok(ExecutionVertex::SentEth {
            to: ctx.resolve(to)?,
            value: ctx.resolve(value)?,
        }),
        DeclarativeKind::Virtual => Err(DeployError::virtual_vertex(
            vertex.id,
            &vertex.qualified_label(),
        )),
    }
}

fn resolve_libraries(
    libraries: &BTreeMap<String, ArgValue>,
    ctx: &ResolutionContext<'_>,
) -> Result<BTreeMap<String, ResolvedArg>> {
    libraries
        .iter()
        .map(|(name, arg)| Ok((name.clone(), ctx.resolve(arg)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Artifact, ArtifactStore};
    use crate::chain::{Address, TxOverrides};
    use crate::config::JsonParameters;
    use crate::core::future::{Future, ParameterFuture, ParameterKind, VertexRef};
    use crate::error::ParamErrorKind;
    use serde_json::json;

    fn store() -> ArtifactStore {
        ArtifactStore::new()
            .with(Artifact::new("Token", "0x6001"))
            .with(Artifact::new("Math", "0x6002"))
    }

    fn param(label: &str) -> ArgValue {
        ArgValue::Future(Future::Parameter(ParameterFuture {
            scope: "M".into(),
            label: label.into(),
            kind: ParameterKind::Required,
        }))
    }

    #[test]
    fn test_registry_contract_resolves_artifact_and_args() {
        let mut g = DeclarativeGraph::new();
        let math = g
            .add_vertex(
                "M",
                "Math",
                DeclarativeKind::LibraryFromRegistry {
                    name: "Math".into(),
                    args: vec![],
                },
                &[],
                TxOverrides::default(),
            )
            .unwrap();
        let token = g
            .add_vertex(
                "M",
                "Token",
                DeclarativeKind::ContractFromRegistry {
                    name: "Token".into(),
                    args: vec![ArgValue::literal("Gold"), param("supply")],
                    libraries: [(
                        "Math".to_string(),
                        ArgValue::Future(Future::VertexResult(VertexRef {
                            vertex: math,
                            label: "M#Math".into(),
                        })),
                    )]
                    .into_iter()
                    .collect(),
                },
                &[],
                TxOverrides::default(),
            )
            .unwrap();

        let params = JsonParameters::from_pairs([("supply", json!(1000))]);
        let plan = transform(&g, &store(), &params).unwrap();

        assert_eq!(plan.len(), 2);
        match &plan.vertex(token).unwrap().vertex {
            ExecutionVertex::ContractDeploy {
                artifact,
                args,
                libraries,
            } => {
                assert_eq!(artifact.bytecode, "0x6001");
                assert_eq!(
                    args,
                    &vec![
                        ResolvedArg::Value(json!("Gold")),
                        ResolvedArg::Value(json!(1000))
                    ]
                );
                assert_eq!(libraries["Math"].dependency().unwrap().vertex, math);
            }
            other => panic!("unexpected vertex {:?}", other),
        }
        assert_eq!(plan.adjacency().dependencies(token), vec![math]);
    }

    #[test]
    fn test_virtual_vertex_is_fatal() {
        let mut g = DeclarativeGraph::new();
        let v = g
            .add_vertex("Sub", "Sub", DeclarativeKind::Virtual, &[], TxOverrides::default())
            .unwrap();

        let err = transform(&g, &store(), &JsonParameters::none()).unwrap_err();
        match err {
            DeployError::GraphInvariant(msg) => {
                assert!(msg.contains(&v.to_string()));
                assert!(msg.contains("Sub#Sub"));
            }
            other => panic!("expected invariant error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_artifact() {
        let mut g = DeclarativeGraph::new();
        g.add_vertex(
            "M",
            "Nope",
            DeclarativeKind::ContractFromRegistry {
                name: "Nope".into(),
                args: vec![],
                libraries: BTreeMap::new(),
            },
            &[],
            TxOverrides::default(),
        )
        .unwrap();

        let err = transform(&g, &store(), &JsonParameters::none()).unwrap_err();
        assert_eq!(err, DeployError::ArtifactNotFound { name: "Nope".into() });
    }

    #[test]
    fn test_method_call_keeps_contract_reference() {
        let mut g = DeclarativeGraph::new();
        let existing = g
            .add_vertex(
                "M",
                "Dai",
                DeclarativeKind::ExistingContract {
                    address: Address::new("0xda1"),
                    abi: json!([]),
                },
                &[],
                TxOverrides::default(),
            )
            .unwrap();
        let call = g
            .add_vertex(
                "M",
                "Dai.approve",
                DeclarativeKind::MethodCall {
                    contract: ArgValue::Future(Future::VertexResult(VertexRef {
                        vertex: existing,
                        label: "M#Dai".into(),
                    })),
                    method: "approve".into(),
                    args: vec![param("spender")],
                    value: ArgValue::literal(0),
                },
                &[],
                TxOverrides::default(),
            )
            .unwrap();

        let params = JsonParameters::from_pairs([("spender", json!("0x5e"))]);
        let plan = transform(&g, &store(), &params).unwrap();

        let node = plan.vertex(call).unwrap();
        assert_eq!(node.label, "M#Dai.approve");
        let deps: Vec<_> = node.vertex.dependencies().iter().map(|r| r.vertex).collect();
        assert_eq!(deps, vec![existing]);
        assert!(matches!(
            plan.vertex(existing).unwrap().vertex,
            ExecutionVertex::DeployedContract { .. }
        ));
    }

    #[test]
    fn test_missing_parameter_surfaces() {
        let mut g = DeclarativeGraph::new();
        g.add_vertex(
            "M",
            "send/1",
            DeclarativeKind::SendEth {
                to: ArgValue::literal("0x01"),
                value: param("amount"),
            },
            &[],
            TxOverrides::default(),
        )
        .unwrap();

        let err = transform(&g, &store(), &JsonParameters::none()).unwrap_err();
        assert_eq!(
            err,
            DeployError::Parameter {
                label: "amount".into(),
                kind: ParamErrorKind::NoParams
            }
        );
    }
}
