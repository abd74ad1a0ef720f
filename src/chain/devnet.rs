//! In-process development chain
//!
//! Blocks are mined lazily: every block-number query produces one new block,
//! and pending transactions that pay at least `min_gas_price` and have waited
//! `confirmation_blocks` are included in it. That keeps the chain fully
//! deterministic for tests and lets the CLI run a deployment end to end.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::nonce::BrokeredSender;
use super::types::{Address, Fee, FeeQuote, Receipt, Signer, TransactionRequest, TxData, TxHash};
use crate::artifacts::function_names;
use crate::core::{Result, Services};
use crate::error::DeployError;
use crate::providers::{
    Broadcaster, ChainProvider, ConfirmationProvider, FeeEstimator, SignerProvider,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevChainConfig {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Price quoted by the fee estimator
    #[serde(default = "default_gas_price")]
    pub gas_price: u64,
    /// Transactions paying less stay pending forever
    #[serde(default)]
    pub min_gas_price: u64,
    /// Blocks a transaction waits in the pool before it can be mined
    #[serde(default = "default_confirmation_blocks")]
    pub confirmation_blocks: u64,
    /// Quote and fill EIP-1559 fees instead of legacy gas prices
    #[serde(default)]
    pub eip1559: bool,
    /// The default signer
    #[serde(default = "default_account")]
    pub account: String,
}

fn default_chain_id() -> u64 {
    31337
}

fn default_gas_price() -> u64 {
    1_000_000_000
}

fn default_confirmation_blocks() -> u64 {
    1
}

fn default_account() -> String {
    "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string()
}

impl Default for DevChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            gas_price: default_gas_price(),
            min_gas_price: 0,
            confirmation_blocks: default_confirmation_blocks(),
            eip1559: false,
            account: default_account(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DevTxStatus {
    Pending,
    Replaced,
    Mined { block: u64, success: bool },
}

/// A transaction as the dev chain recorded it
#[derive(Debug, Clone, Serialize)]
pub struct DevTransaction {
    pub hash: TxHash,
    pub from: Address,
    pub nonce: u64,
    pub request: TransactionRequest,
    pub submitted_at: u64,
    pub status: DevTxStatus,
    pub contract_address: Option<Address>,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    hashes: u64,
    deployments: u64,
    txs: HashMap<TxHash, DevTransaction>,
    /// Submission order
    order: Vec<TxHash>,
    pending: HashMap<(Address, u64), TxHash>,
    next_nonce: HashMap<Address, u64>,
    code: HashMap<Address, Value>,
}

pub struct DevChain {
    config: DevChainConfig,
    state: Mutex<ChainState>,
}

impl DevChain {
    pub fn new(config: DevChainConfig) -> Self {
        log::info!(
            "Dev chain {} ready (signer {}, gas price {})",
            config.chain_id,
            config.account,
            config.gas_price
        );
        Self {
            config,
            state: Mutex::new(ChainState::default()),
        }
    }

    /// Collaborators for an executor that deploys to this chain
    pub fn services(self: &Arc<Self>) -> Services {
        Services {
            signer: self.clone(),
            chain: self.clone(),
            confirmations: self.clone(),
            fees: self.clone(),
            sender: Arc::new(BrokeredSender::new(self.clone())),
        }
    }

    pub fn config(&self) -> &DevChainConfig {
        &self.config
    }

    /// Every transaction `account` submitted, in submission order
    pub fn transactions_from(&self, account: &Address) -> Result<Vec<DevTransaction>> {
        let state = self.state()?;
        Ok(state
            .order
            .iter()
            .filter_map(|hash| state.txs.get(hash))
            .filter(|tx| &tx.from == account)
            .cloned()
            .collect())
    }

    /// ABI of a contract deployed on this chain
    pub fn code_at(&self, address: &Address) -> Result<Option<Value>> {
        Ok(self.state()?.code.get(address).cloned())
    }

    fn state(&self) -> Result<MutexGuard<'_, ChainState>> {
        self.state
            .lock()
            .map_err(|_| DeployError::Network("dev chain state poisoned".into()))
    }

    fn default_fee(&self) -> Fee {
        self.quote().to_fee()
    }

    fn quote(&self) -> FeeQuote {
        let gas_price = u128::from(self.config.gas_price);
        if self.config.eip1559 {
            FeeQuote {
                gas_price,
                max_fee_per_gas: Some(gas_price),
                max_priority_fee_per_gas: Some((gas_price / 10).max(1)),
            }
        } else {
            FeeQuote::legacy(gas_price)
        }
    }

    fn mine_block(&self, state: &mut ChainState) -> u64 {
        state.block += 1;
        let block = state.block;
        let min_price = u128::from(self.config.min_gas_price);

        let ready: Vec<TxHash> = state
            .order
            .iter()
            .filter(|hash| {
                state.txs.get(*hash).map_or(false, |tx| {
                    tx.status == DevTxStatus::Pending
                        && block.saturating_sub(tx.submitted_at) >= self.config.confirmation_blocks
                        && tx.request.fee.map_or(0, |f| f.effective_price()) >= min_price
                })
            })
            .cloned()
            .collect();

        for hash in ready {
            let Some(mut tx) = state.txs.remove(&hash) else {
                continue;
            };
            let success = match &tx.request.data {
                TxData::Deploy { abi, .. } => {
                    state.deployments += 1;
                    let address = Address::new(format!("0x{:040x}", 0xc0de_0000u64 + state.deployments));
                    state.code.insert(address.clone(), abi.clone());
                    tx.contract_address = Some(address);
                    true
                }
                TxData::Call { method, .. } => match tx.request.to.as_ref().and_then(|to| state.code.get(to)) {
                    Some(abi) => function_names(abi).iter().any(|name| name == method),
                    None => true,
                },
                TxData::Empty => true,
            };

            log::debug!(
                "Mined {} in block {} (success: {})",
                tx.hash,
                block,
                success
            );
            tx.status = DevTxStatus::Mined { block, success };
            state.pending.remove(&(tx.from.clone(), tx.nonce));
            state.txs.insert(hash, tx);
        }

        block
    }
}

impl ChainProvider for DevChain {
    fn block_number(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move {
            let mut state = self.state()?;
            Ok(self.mine_block(&mut state))
        })
    }

    fn get_transaction(&self, hash: &TxHash) -> BoxFuture<'_, Result<Option<TransactionRequest>>> {
        let hash = hash.clone();
        Box::pin(async move { Ok(self.state()?.txs.get(&hash).map(|tx| tx.request.clone())) })
    }

    fn transaction_receipt(&self, hash: &TxHash) -> BoxFuture<'_, Result<Option<Receipt>>> {
        let hash = hash.clone();
        Box::pin(async move {
            let state = self.state()?;
            Ok(state.txs.get(&hash).and_then(|tx| match tx.status {
                DevTxStatus::Mined { block, success } => Some(Receipt {
                    hash: tx.hash.clone(),
                    block_number: block,
                    success,
                    contract_address: tx.contract_address.clone(),
                }),
                _ => None,
            }))
        })
    }
}

impl ConfirmationProvider for DevChain {
    fn is_confirmed(&self, hash: &TxHash) -> BoxFuture<'_, Result<bool>> {
        let hash = hash.clone();
        Box::pin(async move {
            let state = self.state()?;
            Ok(matches!(
                state.txs.get(&hash).map(|tx| tx.status),
                Some(DevTxStatus::Mined { .. })
            ))
        })
    }
}

impl FeeEstimator for DevChain {
    fn estimate_fee(&self) -> BoxFuture<'_, Result<FeeQuote>> {
        Box::pin(async move { Ok(self.quote()) })
    }
}

impl SignerProvider for DevChain {
    fn default_signer(&self) -> Result<Signer> {
        Ok(Signer::new(Address::new(self.config.account.clone())))
    }
}

impl Broadcaster for DevChain {
    fn pending_nonce(&self, account: &Address) -> BoxFuture<'_, Result<u64>> {
        let account = account.clone();
        Box::pin(async move { Ok(self.state()?.next_nonce.get(&account).copied().unwrap_or(0)) })
    }

    fn broadcast(
        &self,
        signer: &Signer,
        tx: &TransactionRequest,
        nonce: u64,
    ) -> BoxFuture<'_, Result<TxHash>> {
        let from = signer.address.clone();
        let mut request = tx.clone();
        Box::pin(async move {
            let fee = *request.fee.get_or_insert_with(|| self.default_fee());
            let mut state = self.state()?;
            let expected = state.next_nonce.get(&from).copied().unwrap_or(0);

            if nonce > expected {
                return Err(DeployError::Network(format!(
                    "nonce too high for {}: got {}, expected {}",
                    from, nonce, expected
                )));
            }

            if nonce < expected {
                let Some(previous) = state.pending.get(&(from.clone(), nonce)).cloned() else {
                    return Err(DeployError::Network(format!(
                        "nonce too low for {}: {} already mined",
                        from, nonce
                    )));
                };
                let previous_price = state
                    .txs
                    .get(&previous)
                    .and_then(|tx| tx.request.fee)
                    .map_or(0, |f| f.effective_price());
                if fee.effective_price() <= previous_price {
                    return Err(DeployError::Network(format!(
                        "replacement transaction underpriced ({} <= {})",
                        fee.effective_price(),
                        previous_price
                    )));
                }
                if let Some(old) = state.txs.get_mut(&previous) {
                    old.status = DevTxStatus::Replaced;
                }
            } else {
                state.next_nonce.insert(from.clone(), expected + 1);
            }

            state.hashes += 1;
            let hash = TxHash::new(format!("0x{:064x}", state.hashes));
            let submitted_at = state.block;
            state.pending.insert((from.clone(), nonce), hash.clone());
            state.order.push(hash.clone());
            state.txs.insert(
                hash.clone(),
                DevTransaction {
                    hash: hash.clone(),
                    from,
                    nonce,
                    request,
                    submitted_at,
                    status: DevTxStatus::Pending,
                    contract_address: None,
                },
            );
            Ok(hash)
        })
    }
}
