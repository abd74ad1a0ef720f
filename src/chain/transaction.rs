//! Transaction engine - send, poll for confirmation, and replace stalled
//! transactions with fee-bumped resends under a bounded budget

use std::sync::Arc;
use std::time::Duration;

use super::types::{Fee, FeeQuote, Signer, TransactionRequest, TxHash, TxOverrides};
use crate::config::EngineConfig;
use crate::core::Result;
use crate::error::DeployError;
use crate::providers::{ChainProvider, ConfirmationProvider, FeeEstimator, Sender};

/// `floor(previous * 1.10) + 1`
pub fn bump_price(previous: u128) -> u128 {
    previous.saturating_mul(11) / 10 + 1
}

/// Replacement fee for a stalled transaction given a fresh network quote
pub fn bumped_fee(previous: &Fee, quote: &FeeQuote) -> Fee {
    match *previous {
        Fee::Legacy { gas_price } => Fee::Legacy {
            gas_price: quote.gas_price.max(bump_price(gas_price)),
        },
        Fee::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            let estimate = quote.max_fee_per_gas.unwrap_or(quote.gas_price);
            Fee::Eip1559 {
                max_fee_per_gas: estimate.max(bump_price(max_fee_per_gas)),
                max_priority_fee_per_gas: bump_price(max_priority_fee_per_gas),
            }
        }
    }
}

/// The live attempt for one logical transaction
#[derive(Debug, Clone)]
pub struct TransactionAttempt {
    pub request: TransactionRequest,
    pub nonce: u64,
    pub sent_at_block: u64,
    pub hash: TxHash,
}

/// Sends transactions and drives them to confirmation
#[derive(Clone)]
pub struct TransactionEngine {
    chain: Arc<dyn ChainProvider>,
    confirmations: Arc<dyn ConfirmationProvider>,
    fees: Arc<dyn FeeEstimator>,
    sender: Arc<dyn Sender>,
    poll_interval: Duration,
    blocks_before_bump: u64,
    max_replacements: u32,
}

impl TransactionEngine {
    pub fn new(
        chain: Arc<dyn ChainProvider>,
        confirmations: Arc<dyn ConfirmationProvider>,
        fees: Arc<dyn FeeEstimator>,
        sender: Arc<dyn Sender>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            chain,
            confirmations,
            fees,
            sender,
            poll_interval: config.poll_interval(),
            blocks_before_bump: config.blocks_before_bump,
            max_replacements: config.max_replacements,
        }
    }

    /// Send a contract creation and wait for it to confirm
    pub async fn deploy(
        &self,
        signer: &Signer,
        request: TransactionRequest,
        overrides: &TxOverrides,
    ) -> Result<TxHash> {
        self.send_and_confirm(signer, request, overrides).await
    }

    /// Send a call or transfer and wait for it to confirm
    pub async fn call(
        &self,
        signer: &Signer,
        request: TransactionRequest,
        overrides: &TxOverrides,
    ) -> Result<TxHash> {
        self.send_and_confirm(signer, request, overrides).await
    }

    async fn send_and_confirm(
        &self,
        signer: &Signer,
        request: TransactionRequest,
        overrides: &TxOverrides,
    ) -> Result<TxHash> {
        let request = overrides.apply(request)?;

        let sent_at_block = self.chain.block_number().await?;
        let (nonce, hash) = self.sender.send(signer, &request, sent_at_block).await?;
        log::info!(
            "Sent {} from {} (nonce {}, block {})",
            hash,
            signer.address,
            nonce,
            sent_at_block
        );

        let mut attempt = TransactionAttempt {
            request,
            nonce,
            sent_at_block,
            hash,
        };
        let mut replacements = 0u32;

        loop {
            let current_block = self.chain.block_number().await?;

            if self.confirmations.is_confirmed(&attempt.hash).await? {
                log::info!(
                    "Confirmed {} at block {} after {} replacements",
                    attempt.hash,
                    current_block,
                    replacements
                );
                return Ok(attempt.hash);
            }

            let elapsed = current_block.saturating_sub(attempt.sent_at_block);
            if elapsed >= self.blocks_before_bump {
                if replacements >= self.max_replacements {
                    log::warn!(
                        "Giving up on {} (nonce {}) after {} replacements",
                        attempt.hash,
                        attempt.nonce,
                        replacements
                    );
                    return Err(DeployError::TransactionTimeout {
                        hash: attempt.hash.to_string(),
                        replacements,
                    });
                }

                attempt = self.replace(signer, &attempt, current_block).await?;
                replacements += 1;
            } else {
                log::debug!(
                    "{} pending for {} blocks (block {})",
                    attempt.hash,
                    elapsed,
                    current_block
                );
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Resend `attempt` under the same nonce with a bumped fee
    async fn replace(
        &self,
        signer: &Signer,
        attempt: &TransactionAttempt,
        current_block: u64,
    ) -> Result<TransactionAttempt> {
        let live = self
            .chain
            .get_transaction(&attempt.hash)
            .await?
            .unwrap_or_else(|| attempt.request.clone());
        let quote = self.fees.estimate_fee().await?;

        let previous = live.fee.ok_or_else(|| DeployError::TransactionFeeModel {
            hash: attempt.hash.to_string(),
        })?;
        let fee = bumped_fee(&previous, &quote);
        let request = TransactionRequest {
            fee: Some(fee),
            ..live
        };

        let hash = self
            .sender
            .send_and_replace(signer, &request, current_block, attempt.nonce)
            .await?;
        log::warn!(
            "Replaced stalled {} with {} (nonce {}, price {} -> {})",
            attempt.hash,
            hash,
            attempt.nonce,
            previous.effective_price(),
            fee.effective_price()
        );

        Ok(TransactionAttempt {
            request,
            nonce: attempt.nonce,
            sent_at_block: current_block,
            hash,
        })
    }
}
