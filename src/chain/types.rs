//! Chain-facing value types - addresses, transactions, fees, receipts

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::Result;
use crate::error::DeployError;

/// Account or contract address (`0x`-prefixed hex)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Parse from a JSON value, accepting only `0x` strings
    pub fn from_value(value: &serde_json::Value) -> Option<Self> {
        value
            .as_str()
            .filter(|s| s.starts_with("0x") && s.len() > 2)
            .map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transaction hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The account that signs and pays for transactions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signer {
    pub address: Address,
}

impl Signer {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

/// Fee terms of a transaction. The two models are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fee {
    Legacy {
        gas_price: u128,
    },
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
}

impl Fee {
    /// Highest per-gas price the sender is willing to pay
    pub fn effective_price(&self) -> u128 {
        match self {
            Fee::Legacy { gas_price } => *gas_price,
            Fee::Eip1559 {
                max_fee_per_gas, ..
            } => *max_fee_per_gas,
        }
    }
}

/// Payload carried by a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxData {
    /// Plain value transfer
    Empty,
    /// Contract creation
    Deploy {
        bytecode: String,
        args: Vec<serde_json::Value>,
        #[serde(default)]
        libraries: BTreeMap<String, Address>,
        #[serde(default)]
        abi: serde_json::Value,
    },
    /// Method invocation on an existing contract
    Call {
        method: String,
        args: Vec<serde_json::Value>,
    },
}

/// An unsigned transaction as handed to the sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub to: Option<Address>,
    pub data: TxData,
    #[serde(default)]
    pub value: u128,
    pub gas_limit: Option<u64>,
    pub fee: Option<Fee>,
}

impl TransactionRequest {
    pub fn deploy(
        bytecode: impl Into<String>,
        args: Vec<serde_json::Value>,
        libraries: BTreeMap<String, Address>,
        abi: serde_json::Value,
    ) -> Self {
        Self {
            to: None,
            data: TxData::Deploy {
                bytecode: bytecode.into(),
                args,
                libraries,
                abi,
            },
            value: 0,
            gas_limit: None,
            fee: None,
        }
    }

    pub fn call(to: Address, method: impl Into<String>, args: Vec<serde_json::Value>, value: u128) -> Self {
        Self {
            to: Some(to),
            data: TxData::Call {
                method: method.into(),
                args,
            },
            value,
            gas_limit: None,
            fee: None,
        }
    }

    pub fn transfer(to: Address, value: u128) -> Self {
        Self {
            to: Some(to),
            data: TxData::Empty,
            value,
            gas_limit: None,
            fee: None,
        }
    }
}

/// Network fee estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub gas_price: u128,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl FeeQuote {
    pub fn legacy(gas_price: u128) -> Self {
        Self {
            gas_price,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        }
    }

    /// Fee terms for a transaction that has none yet
    pub fn to_fee(&self) -> Fee {
        match (self.max_fee_per_gas, self.max_priority_fee_per_gas) {
            (Some(max_fee_per_gas), Some(max_priority_fee_per_gas)) => Fee::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            _ => Fee::Legacy {
                gas_price: self.gas_price,
            },
        }
    }
}

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub hash: TxHash,
    pub block_number: u64,
    pub success: bool,
    pub contract_address: Option<Address>,
}

/// Explicit per-action transaction overrides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOverrides {
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<u64>,
    #[serde(default)]
    pub max_fee_per_gas: Option<u64>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<u64>,
}

impl TxOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The fee model these overrides select, if any
    pub fn fee(&self) -> Result<Option<Fee>> {
        match (
            self.gas_price,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
        ) {
            (None, None, None) => Ok(None),
            (Some(gas_price), None, None) => Ok(Some(Fee::Legacy {
                gas_price: gas_price.into(),
            })),
            (None, Some(max_fee), Some(max_priority_fee)) if max_priority_fee > max_fee => {
                Err(DeployError::InvalidFeeOverride(format!(
                    "maxPriorityFeePerGas {} exceeds maxFeePerGas {}",
                    max_priority_fee, max_fee
                )))
            }
            (None, Some(max_fee), Some(max_priority_fee)) => Ok(Some(Fee::Eip1559 {
                max_fee_per_gas: max_fee.into(),
                max_priority_fee_per_gas: max_priority_fee.into(),
            })),
            (Some(_), _, _) => Err(DeployError::InvalidFeeOverride(
                "gasPrice cannot be combined with maxFeePerGas/maxPriorityFeePerGas".into(),
            )),
            (None, _, _) => Err(DeployError::InvalidFeeOverride(
                "maxFeePerGas and maxPriorityFeePerGas must be set together".into(),
            )),
        }
    }

    /// Apply to a request, replacing whatever the overrides specify
    pub fn apply(&self, mut request: TransactionRequest) -> Result<TransactionRequest> {
        if let Some(fee) = self.fee()? {
            request.fee = Some(fee);
        }
        if let Some(gas_limit) = self.gas_limit {
            request.gas_limit = Some(gas_limit);
        }
        Ok(request)
    }
}
