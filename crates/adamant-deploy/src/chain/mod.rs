mod broadcast;
mod mock_chain;
mod secretcli;

use std::{fmt, time::Duration};

use adamant_addresses::ContractLink;
use async_trait::async_trait;
pub use broadcast::Broadcaster;
pub use mock_chain::MockChain;
pub use secretcli::SecretCli;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    constants::{BROADCAST_TIMEOUT, FACTORY_GAS_LIMIT, FEE_DENOM, GAS_PRICE},
    messages::{ExecuteRequest, InstantiateRequest},
};

/// The account that signs every transaction of a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SigningIdentity {
    /// The name of the key in the signer's keyring.
    pub key_name: String,
    pub address: String,
}

/// Gas, fee and commit policy for a single transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct TxOptions {
    pub gas_limit: u64,
    pub gas_price: f64,
    pub fee_denom: String,
    pub wait_for_commit: bool,
    pub timeout: Duration,
}

impl Default for TxOptions {
    fn default() -> Self {
        Self {
            gas_limit: FACTORY_GAS_LIMIT,
            gas_price: GAS_PRICE,
            fee_denom: FEE_DENOM.to_string(),
            wait_for_commit: true,
            timeout: BROADCAST_TIMEOUT,
        }
    }
}

impl TxOptions {
    /// The fee paid for the transaction in `fee_denom`, rounded up.
    pub fn fee_amount(&self) -> u128 {
        (self.gas_limit as f64 * self.gas_price).ceil() as u128
    }

    /// The fee in the `<amount><denom>` form the chain tooling expects.
    pub fn fee(&self) -> String {
        format!("{}{}", self.fee_amount(), self.fee_denom)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMessage {
    Instantiate(InstantiateRequest),
    Execute(ExecuteRequest),
}

impl TxMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            TxMessage::Instantiate(_) => "instantiate",
            TxMessage::Execute(_) => "execute",
        }
    }
}

impl From<InstantiateRequest> for TxMessage {
    fn from(request: InstantiateRequest) -> Self {
        TxMessage::Instantiate(request)
    }
}

impl From<ExecuteRequest> for TxMessage {
    fn from(request: ExecuteRequest) -> Self {
        TxMessage::Execute(request)
    }
}

/// Messages that are signed and submitted together. The chain executes them
/// in order and either all of them succeed or the whole transaction reverts.
#[derive(Clone, Debug, PartialEq)]
pub struct TransactionEnvelope {
    pub messages: Vec<TxMessage>,
    pub options: TxOptions,
}

/// What the chain reported for a transaction, before the code is checked.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TxResponse {
    pub txhash: String,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub height: u64,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub codespace: String,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default, deserialize_with = "deserialize_u64")]
    pub gas_used: u64,
    /// The raw response of every message in the transaction.
    #[serde(skip)]
    pub responses: Vec<Vec<u8>>,
}

/// The cosmos tooling prints 64 bit integers as strings.
pub(crate) fn deserialize_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("{} is not a u64", n))),
        Value::String(s) if s.is_empty() => Ok(0),
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!(
            "expected an integer, got {}",
            other
        ))),
    }
}

/// A transaction that the chain accepted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionResult {
    pub txhash: String,
    pub height: u64,
    pub gas_used: u64,
    pub raw_log: String,
    /// Indexed like the envelope's messages. Empty when the broadcast didn't
    /// wait for the commit.
    pub responses: Vec<Vec<u8>>,
}

/// Diagnostics for a transaction the chain refused.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rejection {
    /// Missing when the transaction never reached the chain, e.g. when
    /// signing failed.
    pub txhash: Option<String>,
    pub code: Option<u32>,
    pub codespace: String,
    pub raw_log: String,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.txhash {
            Some(txhash) => write!(f, "transaction {}", txhash)?,
            None => write!(f, "transaction")?,
        }
        if let Some(code) = self.code {
            write!(f, " failed with code {}", code)?;
            if !self.codespace.is_empty() {
                write!(f, " ({})", self.codespace)?;
            }
        } else {
            write!(f, " failed")?;
        }
        write!(f, ": {}", self.raw_log)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("broadcast of {} was not committed within {timeout:?}", .txhash.as_deref().unwrap_or("transaction"))]
    BroadcastTimeout {
        txhash: Option<String>,
        timeout: Duration,
    },
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(Rejection),
    #[error("failed to decode {schema} response: {reason}")]
    Decode { schema: &'static str, reason: String },
    #[error("query against {contract} failed: {reason}")]
    Query { contract: String, reason: String },
}

impl ChainError {
    pub fn decode(schema: &'static str, reason: impl ToString) -> Self {
        ChainError::Decode {
            schema,
            reason: reason.to_string(),
        }
    }

    pub fn query(contract: &str, reason: impl ToString) -> Self {
        ChainError::Query {
            contract: contract.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn rejected(raw_log: impl ToString) -> Self {
        ChainError::BroadcastRejected(Rejection {
            raw_log: raw_log.to_string(),
            ..Default::default()
        })
    }
}

/// A connection to a chain that can sign on behalf of one identity.
///
/// Implementations submit envelopes as they are. Response counting, timeouts
/// and polling for the commit are the `Broadcaster`'s job.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    fn identity(&self) -> &SigningIdentity;

    fn chain_id(&self) -> &str;

    /// Signs and submits the envelope without waiting for the commit. The
    /// response carries the hash and the outcome of the chain's admission
    /// check, but no message responses.
    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<TxResponse, ChainError>;

    /// Looks up a submitted transaction. `None` until it is committed.
    async fn committed(&self, txhash: &str) -> Result<Option<TxResponse>, ChainError>;

    async fn query(&self, contract: &ContractLink, query: &Value) -> Result<Value, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_amount() {
        let options = TxOptions::default();
        assert_eq!(options.fee_amount(), 5_000);
        assert_eq!(options.fee(), "5000uscrt");

        let options = TxOptions {
            gas_limit: 2_000_000,
            ..Default::default()
        };
        assert_eq!(options.fee_amount(), 200_000);

        // Fractional fees are rounded up.
        let options = TxOptions {
            gas_limit: 33,
            gas_price: 0.25,
            ..Default::default()
        };
        assert_eq!(options.fee_amount(), 9);
    }

    #[test]
    fn test_tx_response_json() -> eyre::Result<()> {
        let response: TxResponse = serde_json::from_str(
            r#"{
                "height": "9452167",
                "txhash": "6C2E8C6FC8A0E5F2C5F6F0A8E9A1B0E2B16D5B9F3F7E0DF8C8E0D5C6A3B1E2F4",
                "codespace": "compute",
                "code": 3,
                "data": "",
                "raw_log": "out of gas",
                "gas_wanted": "50000",
                "gas_used": 50123
            }"#,
        )?;
        assert_eq!(response.height, 9_452_167);
        assert_eq!(response.code, 3);
        assert_eq!(response.codespace, "compute");
        assert_eq!(response.gas_used, 50_123);
        assert!(response.responses.is_empty());
        Ok(())
    }

    #[test]
    fn test_rejection_display() {
        let rejection = Rejection {
            txhash: Some("ABCD".to_string()),
            code: Some(11),
            codespace: "sdk".to_string(),
            raw_log: "out of gas".to_string(),
        };
        assert_eq!(
            rejection.to_string(),
            "transaction ABCD failed with code 11 (sdk): out of gas"
        );
        let rejection = Rejection {
            raw_log: "key not found".to_string(),
            ..Default::default()
        };
        assert_eq!(rejection.to_string(), "transaction failed: key not found");
    }
}
