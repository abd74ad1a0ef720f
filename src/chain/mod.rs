pub mod devnet;
pub mod nonce;
pub mod transaction;
pub mod types;

pub use devnet::{DevChain, DevChainConfig, DevTransaction, DevTxStatus};
pub use nonce::{BrokeredSender, NonceBroker};
pub use transaction::{bump_price, bumped_fee, TransactionAttempt, TransactionEngine};
pub use types::{Address, Fee, FeeQuote, Receipt, Signer, TransactionRequest, TxData, TxHash, TxOverrides};
