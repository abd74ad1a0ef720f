//! Nonce broker - exclusive, monotonic nonce allocation per signer

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::types::{Address, Signer, TransactionRequest, TxHash};
use crate::core::Result;
use crate::error::DeployError;
use crate::providers::{Broadcaster, Sender};

/// Next nonce to hand out, once known
type Lane = Arc<tokio::sync::Mutex<Option<u64>>>;

/// Serializes nonce allocation per signer address
#[derive(Default)]
pub struct NonceBroker {
    lanes: Mutex<HashMap<Address, Lane>>,
}

impl NonceBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lane(&self, account: &Address) -> Result<Lane> {
        let mut lanes = self
            .lanes
            .lock()
            .map_err(|_| DeployError::GraphInvariant("nonce broker lock poisoned".into()))?;
        Ok(lanes.entry(account.clone()).or_default().clone())
    }
}

/// `Sender` that allocates nonces through a [`NonceBroker`] and hands the
/// raw transaction to a broadcaster
pub struct BrokeredSender<B> {
    broadcaster: Arc<B>,
    broker: NonceBroker,
}

impl<B: Broadcaster> BrokeredSender<B> {
    pub fn new(broadcaster: Arc<B>) -> Self {
        Self {
            broadcaster,
            broker: NonceBroker::new(),
        }
    }
}

impl<B: Broadcaster + 'static> Sender for BrokeredSender<B> {
    fn send(
        &self,
        signer: &Signer,
        tx: &TransactionRequest,
        _block_number_when_sent: u64,
    ) -> BoxFuture<'_, Result<(u64, TxHash)>> {
        let signer = signer.clone();
        let tx = tx.clone();
        Box::pin(async move {
            let lane = self.broker.lane(&signer.address)?;
            // Held across the broadcast so no other send can take this nonce
            let mut next = lane.lock().await;

            let pending = self.broadcaster.pending_nonce(&signer.address).await?;
            let nonce = next.map_or(pending, |local| local.max(pending));

            let hash = self.broadcaster.broadcast(&signer, &tx, nonce).await?;
            *next = Some(nonce + 1);
            log::debug!("Allocated nonce {} for {}", nonce, signer.address);
            Ok((nonce, hash))
        })
    }

    fn send_and_replace(
        &self,
        signer: &Signer,
        tx: &TransactionRequest,
        _block_number_when_sent: u64,
        nonce: u64,
    ) -> BoxFuture<'_, Result<TxHash>> {
        let signer = signer.clone();
        let tx = tx.clone();
        Box::pin(async move { self.broadcaster.broadcast(&signer, &tx, nonce).await })
    }
}
