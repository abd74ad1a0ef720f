//! Deployment executor - runs an execution graph against the chain
//!
//! Ready vertices run concurrently on the calling task through a
//! `FuturesUnordered`; each on-chain vertex owns one confirmation loop in the
//! transaction engine. Vertex results are bound into their consumers right
//! before the consumer starts.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::adjacency::VertexId;
use super::future::ResolvedArg;
use super::plan::{ExecutionGraph, ExecutionNode, ExecutionVertex};
use super::scheduler::Scheduler;
use super::Result;
use crate::chain::{Address, Signer, TransactionEngine, TransactionRequest, TxHash};
use crate::config::EngineConfig;
use crate::error::DeployError;
use crate::providers::{ChainProvider, ConfirmationProvider, FeeEstimator, Sender, SignerProvider};

/// What a completed vertex produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VertexOutput {
    Contract { address: Address, tx: Option<TxHash> },
    Call { tx: TxHash },
    Transfer { tx: TxHash },
}

impl VertexOutput {
    /// The value consumers see: an address for contracts, a hash otherwise
    pub fn value(&self) -> Value {
        match self {
            VertexOutput::Contract { address, .. } => Value::String(address.to_string()),
            VertexOutput::Call { tx } | VertexOutput::Transfer { tx } => {
                Value::String(tx.to_string())
            }
        }
    }

    pub fn transaction(&self) -> Option<&TxHash> {
        match self {
            VertexOutput::Contract { tx, .. } => tx.as_ref(),
            VertexOutput::Call { tx } | VertexOutput::Transfer { tx } => Some(tx),
        }
    }
}

/// Execution event
#[derive(Debug, Clone)]
pub enum VertexEvent {
    Started { id: VertexId, label: String },
    Completed { id: VertexId, label: String, output: VertexOutput },
    Failed { id: VertexId, label: String, error: DeployError },
    Skipped { id: VertexId, label: String, cause: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum VertexOutcome {
    Completed(VertexOutput),
    Failed(DeployError),
    /// A dependency failed or was skipped; `cause` names the failed vertex
    Skipped { cause: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexReport {
    pub label: String,
    pub outcome: VertexOutcome,
}

/// Per-vertex outcome of one `execute` call
#[derive(Debug, Clone, Default)]
pub struct DeploymentResult {
    outcomes: BTreeMap<VertexId, VertexReport>,
}

impl DeploymentResult {
    fn record(&mut self, id: VertexId, label: &str, outcome: VertexOutcome) {
        self.outcomes.insert(
            id,
            VertexReport {
                label: label.to_string(),
                outcome,
            },
        );
    }

    pub fn is_success(&self) -> bool {
        self.outcomes
            .values()
            .all(|r| matches!(r.outcome, VertexOutcome::Completed(_)))
    }

    pub fn reports(&self) -> impl Iterator<Item = (VertexId, &VertexReport)> {
        self.outcomes.iter().map(|(id, r)| (*id, r))
    }

    pub fn report(&self, id: VertexId) -> Option<&VertexReport> {
        self.outcomes.get(&id)
    }

    pub fn output(&self, id: VertexId) -> Option<&VertexOutput> {
        match &self.outcomes.get(&id)?.outcome {
            VertexOutcome::Completed(output) => Some(output),
            _ => None,
        }
    }

    pub fn failed(&self) -> Vec<(VertexId, &DeployError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| match &r.outcome {
                VertexOutcome::Failed(e) => Some((*id, e)),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<VertexId> {
        self.outcomes
            .iter()
            .filter(|(_, r)| matches!(r.outcome, VertexOutcome::Skipped { .. }))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn transaction_hashes(&self) -> Vec<&TxHash> {
        self.outcomes
            .values()
            .filter_map(|r| match &r.outcome {
                VertexOutcome::Completed(output) => output.transaction(),
                _ => None,
            })
            .collect()
    }
}

/// Network collaborators the executor drives
#[derive(Clone)]
pub struct Services {
    pub signer: Arc<dyn SignerProvider>,
    pub chain: Arc<dyn ChainProvider>,
    pub confirmations: Arc<dyn ConfirmationProvider>,
    pub fees: Arc<dyn FeeEstimator>,
    pub sender: Arc<dyn Sender>,
}

/// A vertex with every argument bound to a concrete value
enum Job {
    Existing(Address),
    Deploy(TransactionRequest),
    Call(TransactionRequest),
    Transfer(TransactionRequest),
}

pub struct Executor {
    services: Services,
    transactions: TransactionEngine,
    event_tx: mpsc::UnboundedSender<VertexEvent>,
}

impl Executor {
    /// Create a new executor
    pub fn new(services: Services, config: EngineConfig) -> (Self, mpsc::UnboundedReceiver<VertexEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transactions = TransactionEngine::new(
            services.chain.clone(),
            services.confirmations.clone(),
            services.fees.clone(),
            services.sender.clone(),
            &config,
        );

        (
            Self {
                services,
                transactions,
                event_tx: tx,
            },
            rx,
        )
    }

    /// Run every vertex of `graph`, recording a per-vertex outcome.
    ///
    /// Vertex failures are reported in the result, not as `Err`; an `Err`
    /// means the graph could not be executed at all.
    pub async fn execute(&self, graph: &ExecutionGraph) -> Result<DeploymentResult> {
        if let Some(cycle) = graph.adjacency().find_cycle() {
            return Err(DeployError::Cycle {
                path: cycle
                    .iter()
                    .map(|id| {
                        graph
                            .vertex(*id)
                            .map(|n| n.label.clone())
                            .unwrap_or_else(|| id.to_string())
                    })
                    .collect(),
            });
        }

        let signer = self.services.signer.default_signer()?;
        log::info!(
            "Executing {} vertices as {}",
            graph.len(),
            signer.address
        );

        let mut scheduler = Scheduler::new(graph.adjacency().clone());
        let mut outputs: HashMap<VertexId, VertexOutput> = HashMap::new();
        let mut result = DeploymentResult::default();
        let mut in_flight = FuturesUnordered::new();

        loop {
            for id in scheduler.schedule_next() {
                let node = graph.vertex(id).ok_or_else(|| {
                    DeployError::GraphInvariant(format!("vertex {} has no execution node", id))
                })?;
                scheduler.mark_started(id)?;
                log::info!("Starting {}", node);
                let _ = self.event_tx.send(VertexEvent::Started {
                    id,
                    label: node.label.clone(),
                });

                match prepare(node, &outputs) {
                    Ok(job) => in_flight.push(self.run_vertex(node, job, &signer)),
                    Err(e) => self.fail(graph, &mut scheduler, &mut result, node, e)?,
                }
            }

            let Some((node, outcome)) = in_flight.next().await else {
                break;
            };

            match outcome {
                Ok(output) => {
                    scheduler.mark_done(node.id)?;
                    log::info!("Completed {} -> {}", node.label, output.value());
                    let _ = self.event_tx.send(VertexEvent::Completed {
                        id: node.id,
                        label: node.label.clone(),
                        output: output.clone(),
                    });
                    result.record(node.id, &node.label, VertexOutcome::Completed(output.clone()));
                    outputs.insert(node.id, output);
                }
                Err(e) => self.fail(graph, &mut scheduler, &mut result, node, e)?,
            }
        }

        if !scheduler.all_done() {
            return Err(DeployError::GraphInvariant(format!(
                "execution stalled with pending vertices {:?}",
                scheduler.pending()
            )));
        }

        let failed = result.failed().len();
        let skipped = result.skipped().len();
        if failed == 0 {
            log::info!("Deployment finished: {} vertices completed", graph.len());
        } else {
            log::warn!(
                "Deployment finished with {} failed and {} skipped vertices",
                failed,
                skipped
            );
        }
        Ok(result)
    }

    fn fail(
        &self,
        graph: &ExecutionGraph,
        scheduler: &mut Scheduler,
        result: &mut DeploymentResult,
        node: &ExecutionNode,
        error: DeployError,
    ) -> Result<()> {
        log::warn!("{} failed: {}", node.label, error);
        let skipped = scheduler.mark_failed(node.id)?;
        let _ = self.event_tx.send(VertexEvent::Failed {
            id: node.id,
            label: node.label.clone(),
            error: error.clone(),
        });
        result.record(node.id, &node.label, VertexOutcome::Failed(error));

        for id in skipped {
            let label = graph
                .vertex(id)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| id.to_string());
            log::warn!("Skipping {} (depends on {})", label, node.label);
            let _ = self.event_tx.send(VertexEvent::Skipped {
                id,
                label: label.clone(),
                cause: node.label.clone(),
            });
            result.record(
                id,
                &label,
                VertexOutcome::Skipped {
                    cause: node.label.clone(),
                },
            );
        }
        Ok(())
    }

    async fn run_vertex<'a>(
        &self,
        node: &'a ExecutionNode,
        job: Job,
        signer: &Signer,
    ) -> (&'a ExecutionNode, Result<VertexOutput>) {
        let outcome = self.run_job(node, job, signer).await;
        (node, outcome)
    }

    async fn run_job(&self, node: &ExecutionNode, job: Job, signer: &Signer) -> Result<VertexOutput> {
        match job {
            Job::Existing(address) => Ok(VertexOutput::Contract { address, tx: None }),
            Job::Deploy(request) => {
                let tx = self.transactions.deploy(signer, request, &node.overrides).await?;
                let address = self.successful_receipt(&tx).await?.contract_address.ok_or_else(|| {
                    DeployError::GraphInvariant(format!("deployment {} produced no contract address", tx))
                })?;
                Ok(VertexOutput::Contract {
                    address,
                    tx: Some(tx),
                })
            }
            Job::Call(request) => {
                let tx = self.transactions.call(signer, request, &node.overrides).await?;
                self.successful_receipt(&tx).await?;
                Ok(VertexOutput::Call { tx })
            }
            Job::Transfer(request) => {
                let tx = self.transactions.call(signer, request, &node.overrides).await?;
                self.successful_receipt(&tx).await?;
                Ok(VertexOutput::Transfer { tx })
            }
        }
    }

    async fn successful_receipt(&self, tx: &TxHash) -> Result<crate::chain::Receipt> {
        let receipt = self
            .services
            .chain
            .transaction_receipt(tx)
            .await?
            .ok_or_else(|| DeployError::Network(format!("no receipt for confirmed {}", tx)))?;
        if !receipt.success {
            return Err(DeployError::TransactionReverted { hash: tx.to_string() });
        }
        Ok(receipt)
    }
}

/// Bind dependency arguments to producer outputs and build the transaction
fn prepare(node: &ExecutionNode, outputs: &HashMap<VertexId, VertexOutput>) -> Result<Job> {
    let bind = |arg: &ResolvedArg| -> Result<Value> {
        match arg {
            ResolvedArg::Value(v) => Ok(v.clone()),
            ResolvedArg::Dependency(r) => outputs
                .get(&r.vertex)
                .map(VertexOutput::value)
                .ok_or_else(|| {
                    DeployError::GraphInvariant(format!(
                        "{} started before {} produced a result",
                        node.label, r.label
                    ))
                }),
        }
    };
    let bind_all = |args: &[ResolvedArg]| args.iter().map(bind).collect::<Result<Vec<_>>>();

    match &node.vertex {
        ExecutionVertex::ContractDeploy {
            artifact,
            args,
            libraries,
        } => {
            let libraries = libraries
                .iter()
                .map(|(name, arg)| Ok((name.clone(), address(&node.label, &bind(arg)?)?)))
                .collect::<Result<BTreeMap<_, _>>>()?;
            Ok(Job::Deploy(TransactionRequest::deploy(
                artifact.bytecode.clone(),
                bind_all(args)?,
                libraries,
                artifact.abi.clone(),
            )))
        }
        ExecutionVertex::LibraryDeploy { artifact, args } => Ok(Job::Deploy(TransactionRequest::deploy(
            artifact.bytecode.clone(),
            bind_all(args)?,
            BTreeMap::new(),
            artifact.abi.clone(),
        ))),
        ExecutionVertex::DeployedContract { address, .. } => Ok(Job::Existing(address.clone())),
        ExecutionVertex::ContractCall {
            contract,
            method,
            args,
            value,
        } => Ok(Job::Call(TransactionRequest::call(
            address(&node.label, &bind(contract)?)?,
            method.clone(),
            bind_all(args)?,
            amount(&node.label, &bind(value)?)?,
        ))),
        ExecutionVertex::SentEth { to, value } => Ok(Job::Transfer(TransactionRequest::transfer(
            address(&node.label, &bind(to)?)?,
            amount(&node.label, &bind(value)?)?,
        ))),
    }
}

fn address(label: &str, value: &Value) -> Result<Address> {
    Address::from_value(value).ok_or_else(|| DeployError::InvalidArgument {
        label: label.to_string(),
        message: format!("expected an address, got {}", value),
    })
}

/// Wei amount from a JSON number or a decimal/hex string
fn amount(label: &str, value: &Value) -> Result<u128> {
    let parsed = match value {
        Value::Null => Some(0),
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u128::from_str_radix(hex, 16).ok(),
            None => s.parse::<u128>().ok(),
        },
        _ => None,
    };
    parsed.ok_or_else(|| DeployError::InvalidArgument {
        label: label.to_string(),
        message: format!("expected a non-negative amount, got {}", value),
    })
}
