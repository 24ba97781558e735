//! This module builds the instantiate and execute messages that drive the
//! factory contract. Everything in here is pure: nothing is signed or sent.
use std::fmt;

use adamant_addresses::{ContractLink, ContractReference, TokenDescriptor};
use cosmwasm_std::Binary;
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Instantiates one contract from an uploaded template.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InstantiateRequest {
    pub admin: Option<String>,
    pub sender: String,
    pub contract: ContractReference,
    pub label: String,
    pub init_msg: Value,
}

impl InstantiateRequest {
    pub fn new<M: Serialize>(
        sender: &str,
        contract: &ContractReference,
        label: &str,
        init_msg: &M,
    ) -> Result<Self> {
        if label.is_empty() {
            return Err(eyre!("contract labels can't be empty"));
        }
        Ok(Self {
            admin: None,
            sender: sender.to_string(),
            contract: contract.clone(),
            label: label.to_string(),
            init_msg: serde_json::to_value(init_msg)?,
        })
    }

    pub fn with_admin(mut self, admin: &str) -> Self {
        self.admin = Some(admin.to_string());
        self
    }
}

/// Executes one message against an instantiated contract.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExecuteRequest {
    pub sender: String,
    pub contract_address: String,
    pub code_hash: String,
    pub msg: Value,
}

impl ExecuteRequest {
    pub fn new<M: Serialize>(sender: &str, contract: &ContractLink, msg: &M) -> Result<Self> {
        Ok(Self {
            sender: sender.to_string(),
            contract_address: contract.address.clone(),
            code_hash: contract.code_hash.clone(),
            msg: serde_json::to_value(msg)?,
        })
    }
}

/// Factory messages ///

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FactoryInitMsg {
    pub pair_code_id: u64,
    pub token_code_id: u64,
    pub token_code_hash: String,
    pub pair_code_hash: String,
    pub prng_seed: Binary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetInfo {
    Token {
        contract_addr: String,
        token_code_hash: String,
        viewing_key: String,
    },
    NativeToken {
        denom: String,
    },
}

impl AssetInfo {
    pub fn token(token: &TokenDescriptor, viewing_key: &str) -> Self {
        AssetInfo::Token {
            contract_addr: token.address.clone(),
            token_code_hash: token.code_hash.clone(),
            viewing_key: viewing_key.to_string(),
        }
    }

    /// Whether both references point at the same asset. Viewing keys are
    /// ignored since the factory doesn't report them back faithfully.
    pub fn same_asset(&self, other: &AssetInfo) -> bool {
        match (self, other) {
            (
                AssetInfo::Token { contract_addr: a, .. },
                AssetInfo::Token { contract_addr: b, .. },
            ) => a == b,
            (AssetInfo::NativeToken { denom: a }, AssetInfo::NativeToken { denom: b }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for AssetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetInfo::Token { contract_addr, .. } => write!(f, "{}", contract_addr),
            AssetInfo::NativeToken { denom } => write!(f, "{}", denom),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FactoryExecuteMsg {
    CreatePair { asset_infos: [AssetInfo; 2] },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FactoryQueryMsg {
    Config {},
    Pair {
        asset_infos: [AssetInfo; 2],
    },
    Pairs {
        #[serde(skip_serializing_if = "Option::is_none")]
        start_after: Option<[AssetInfo; 2]>,
        #[serde(skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    PairSettings {},
}

/// Builds the message that instantiates the factory. The sender is also the
/// factory's admin.
pub fn instantiate_factory(
    sender: &str,
    factory: &ContractReference,
    label: &str,
    init_msg: &FactoryInitMsg,
) -> Result<InstantiateRequest> {
    Ok(InstantiateRequest::new(sender, factory, label, init_msg)?.with_admin(sender))
}

/// Builds one `create_pair` message per quote token. Every pair has `base` as
/// its first asset and the messages follow the order of `quotes`.
pub fn create_pairs(
    sender: &str,
    factory: &ContractLink,
    base: &TokenDescriptor,
    quotes: &[TokenDescriptor],
    viewing_key: &str,
) -> Result<Vec<ExecuteRequest>> {
    quotes
        .iter()
        .map(|quote| {
            let msg = FactoryExecuteMsg::CreatePair {
                asset_infos: [
                    AssetInfo::token(base, viewing_key),
                    AssetInfo::token(quote, viewing_key),
                ],
            };
            ExecuteRequest::new(sender, factory, &msg)
        })
        .collect()
}
