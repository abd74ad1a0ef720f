//! Collaborator contracts consumed by the engine
//!
//! Local lookups (artifacts, parameters, the signer) are synchronous.
//! Anything that talks to the network returns a `BoxFuture` so the executor
//! can keep many confirmation loops in flight on one task.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::artifacts::Artifact;
use crate::chain::{Address, FeeQuote, Receipt, Signer, TransactionRequest, TxHash};
use crate::core::Result;
use crate::error::ParamErrorKind;

/// Result of asking the config provider whether it knows a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamLookup {
    Found,
    NotFound(ParamErrorKind),
}

/// Compiled contract metadata, located by name
pub trait ArtifactProvider: Send + Sync {
    fn get_artifact(&self, name: &str) -> Result<Artifact>;
}

/// Deployment-time parameter source
pub trait ConfigProvider: Send + Sync {
    fn has_param(&self, label: &str) -> ParamLookup;

    fn get_param(&self, label: &str) -> Option<Value>;
}

/// Key custody lives behind this
pub trait SignerProvider: Send + Sync {
    fn default_signer(&self) -> Result<Signer>;
}

/// Read access to chain state
pub trait ChainProvider: Send + Sync {
    fn block_number(&self) -> BoxFuture<'_, Result<u64>>;

    /// The transaction as currently known to the network (with its fee populated)
    fn get_transaction(&self, hash: &TxHash) -> BoxFuture<'_, Result<Option<TransactionRequest>>>;

    fn transaction_receipt(&self, hash: &TxHash) -> BoxFuture<'_, Result<Option<Receipt>>>;
}

pub trait ConfirmationProvider: Send + Sync {
    fn is_confirmed(&self, hash: &TxHash) -> BoxFuture<'_, Result<bool>>;
}

pub trait FeeEstimator: Send + Sync {
    fn estimate_fee(&self) -> BoxFuture<'_, Result<FeeQuote>>;
}

/// Sends transactions, owning nonce allocation for each signer
pub trait Sender: Send + Sync {
    /// Send under a freshly allocated nonce, returning `(nonce, hash)`
    fn send(
        &self,
        signer: &Signer,
        tx: &TransactionRequest,
        block_number_when_sent: u64,
    ) -> BoxFuture<'_, Result<(u64, TxHash)>>;

    /// Resend under an existing nonce, superseding the transaction that used it
    fn send_and_replace(
        &self,
        signer: &Signer,
        tx: &TransactionRequest,
        block_number_when_sent: u64,
        nonce: u64,
    ) -> BoxFuture<'_, Result<TxHash>>;
}

/// Raw transaction submission, below nonce management
pub trait Broadcaster: Send + Sync {
    /// Number of transactions the network has seen from `account`
    fn pending_nonce(&self, account: &Address) -> BoxFuture<'_, Result<u64>>;

    fn broadcast(
        &self,
        signer: &Signer,
        tx: &TransactionRequest,
        nonce: u64,
    ) -> BoxFuture<'_, Result<TxHash>>;
}
