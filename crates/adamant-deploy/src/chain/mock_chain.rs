use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use adamant_addresses::{ContractLink, ADDRESS_PREFIX};
use async_trait::async_trait;
use bech32::{ToBase32, Variant};
use prost::Message;
use serde_json::{json, Value};

use super::{
    ChainConnection, ChainError, SigningIdentity, TransactionEnvelope, TxMessage, TxResponse,
};
use crate::{
    constants::{FACTORY_CODE_HASH, FACTORY_CODE_ID},
    decode::{MsgExecuteContractResponse, MsgInstantiateContractResponse},
    messages::{AssetInfo, FactoryExecuteMsg, FactoryInitMsg, FactoryQueryMsg},
};

// Mirrors the factory's pagination bounds.
const DEFAULT_PAIRS_LIMIT: u32 = 10;
const MAX_PAIRS_LIMIT: u32 = 30;

const DEPLOYER_ADDRESS: &str = "secret1qqqqqqqqqqqqqqqqqqq0llllllllllllty6zjj";

/// Builds a deterministic bech32 address from a counter.
pub fn mock_address(n: u64) -> Result<String, bech32::Error> {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&n.to_be_bytes());
    bech32::encode(ADDRESS_PREFIX, bytes.to_base32(), Variant::Bech32)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CodeKind {
    Factory,
    Other,
}

#[derive(Clone, Debug)]
struct MockPair {
    asset_infos: [AssetInfo; 2],
    contract_addr: String,
    liquidity_token: String,
}

impl MockPair {
    /// The factory stores pairs under their sorted asset identities and lists
    /// them in that order.
    fn key(asset_infos: &[AssetInfo; 2]) -> String {
        let mut assets = [asset_infos[0].to_string(), asset_infos[1].to_string()];
        assets.sort();
        assets.concat()
    }
}

#[derive(Clone, Debug)]
enum MockContract {
    Factory {
        owner: String,
        pair_code_id: u64,
        token_code_id: u64,
        pair_code_hash: String,
        pairs: Vec<MockPair>,
    },
    Other,
}

#[derive(Clone, Debug)]
struct Deployed {
    code_hash: String,
    contract: MockContract,
}

#[derive(Clone, Debug, Default)]
struct Ledger {
    next_address: u64,
    height: u64,
    codes: HashMap<u64, (String, CodeKind)>,
    contracts: HashMap<String, Deployed>,
}

#[derive(Debug, Default)]
struct MockState {
    ledger: Ledger,
    broadcasts: Vec<TransactionEnvelope>,
    committed: HashMap<String, TxResponse>,
    queries: Vec<(String, Value)>,
    rejections: HashMap<usize, (u32, String)>,
    delay: Option<Duration>,
    disconnected: bool,
    drop_responses: bool,
    hold_commits: bool,
    failed_lookups: usize,
    fail_queries: bool,
}

/// An in-memory chain that understands the factory's messages. Transactions
/// are applied to a copy of the ledger that only replaces the real one when
/// every message succeeded.
#[derive(Debug)]
pub struct MockChain {
    identity: SigningIdentity,
    chain_id: String,
    state: Mutex<MockState>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.ledger.next_address = 1;
        state.ledger.codes.insert(
            FACTORY_CODE_ID,
            (FACTORY_CODE_HASH.to_string(), CodeKind::Factory),
        );
        Self {
            identity: SigningIdentity {
                key_name: "deployer".to_string(),
                address: DEPLOYER_ADDRESS.to_string(),
            },
            chain_id: "secretdev-1".to_string(),
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity_address(&self) -> String {
        self.identity.address.clone()
    }

    /// Registers an uploaded template that isn't a factory.
    pub fn store_code(&self, code_id: u64, code_hash: &str) {
        self.state()
            .ledger
            .codes
            .insert(code_id, (code_hash.to_string(), CodeKind::Other));
    }

    /// Rejects the broadcast with the given index, counting from zero.
    pub fn reject_broadcast(&self, index: usize, code: u32, raw_log: &str) {
        self.state()
            .rejections
            .insert(index, (code, raw_log.to_string()));
    }

    pub fn reject_next_broadcast(&self, code: u32, raw_log: &str) {
        let index = self.state().broadcasts.len();
        self.reject_broadcast(index, code, raw_log);
    }

    pub fn delay_broadcasts(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn disconnect(&self) {
        self.state().disconnected = true;
    }

    /// Commits transactions without any message responses.
    pub fn drop_responses(&self) {
        self.state().drop_responses = true;
    }

    /// Applies submitted transactions but never reports them as committed.
    pub fn hold_commits(&self) {
        self.state().hold_commits = true;
    }

    /// Fails the next `count` commit lookups as if the node was unreachable.
    pub fn fail_lookups(&self, count: usize) {
        self.state().failed_lookups = count;
    }

    pub fn fail_queries(&self) {
        self.state().fail_queries = true;
    }

    pub fn broadcasts(&self) -> Vec<TransactionEnvelope> {
        self.state().broadcasts.clone()
    }

    pub fn queries(&self) -> Vec<(String, Value)> {
        self.state().queries.clone()
    }

    /// The contract addresses of the pairs a factory has registered.
    pub fn pairs(&self, factory: &str) -> Vec<[String; 2]> {
        match self.state().ledger.contracts.get(factory) {
            Some(Deployed {
                contract: MockContract::Factory { pairs, .. },
                ..
            }) => pairs
                .iter()
                .map(|pair| {
                    [
                        pair.asset_infos[0].to_string(),
                        pair.asset_infos[1].to_string(),
                    ]
                })
                .collect(),
            _ => vec![],
        }
    }

    fn deploy_address(ledger: &mut Ledger) -> Result<String, (u32, String)> {
        let address = mock_address(ledger.next_address).map_err(|e| (2, e.to_string()))?;
        ledger.next_address += 1;
        Ok(address)
    }

    fn apply(ledger: &mut Ledger, message: &TxMessage) -> Result<Vec<u8>, (u32, String)> {
        match message {
            TxMessage::Instantiate(request) => {
                let (code_hash, kind) = ledger
                    .codes
                    .get(&request.contract.code_id)
                    .cloned()
                    .ok_or((2, format!("code id {} not found", request.contract.code_id)))?;
                if !code_hash.eq_ignore_ascii_case(&request.contract.code_hash) {
                    return Err((2, "code hash mismatch".to_string()));
                }
                let contract = match kind {
                    CodeKind::Factory => {
                        let init: FactoryInitMsg = serde_json::from_value(request.init_msg.clone())
                            .map_err(|e| (2, format!("Error parsing into type: {}", e)))?;
                        MockContract::Factory {
                            owner: request.sender.clone(),
                            pair_code_id: init.pair_code_id,
                            token_code_id: init.token_code_id,
                            pair_code_hash: init.pair_code_hash,
                            pairs: vec![],
                        }
                    }
                    CodeKind::Other => MockContract::Other,
                };
                let address = Self::deploy_address(ledger)?;
                ledger
                    .contracts
                    .insert(address.clone(), Deployed { code_hash, contract });
                Ok(MsgInstantiateContractResponse {
                    address,
                    data: vec![],
                }
                .encode_to_vec())
            }
            TxMessage::Execute(request) => {
                let contract_addr = Self::deploy_address(ledger)?;
                let liquidity_token = Self::deploy_address(ledger)?;
                let deployed = ledger
                    .contracts
                    .get_mut(&request.contract_address)
                    .ok_or((2, format!("contract {} not found", request.contract_address)))?;
                if !deployed.code_hash.eq_ignore_ascii_case(&request.code_hash) {
                    return Err((2, "code hash mismatch".to_string()));
                }
                if let MockContract::Factory { pairs, .. } = &mut deployed.contract {
                    let msg: FactoryExecuteMsg = serde_json::from_value(request.msg.clone())
                        .map_err(|e| (2, format!("Error parsing into type: {}", e)))?;
                    let FactoryExecuteMsg::CreatePair { asset_infos } = msg;
                    if pairs.iter().any(|pair| {
                        pair.asset_infos[0].same_asset(&asset_infos[0])
                            && pair.asset_infos[1].same_asset(&asset_infos[1])
                    }) {
                        return Err((2, "Pair already exists".to_string()));
                    }
                    pairs.push(MockPair {
                        asset_infos,
                        contract_addr,
                        liquidity_token,
                    });
                }
                Ok(MsgExecuteContractResponse { data: vec![] }.encode_to_vec())
            }
        }
    }

    fn answer(contract: &MockContract, query: &Value) -> Result<Value, String> {
        let MockContract::Factory {
            owner,
            pair_code_id,
            token_code_id,
            pair_code_hash,
            pairs,
        } = contract
        else {
            return Err("contract doesn't answer queries".to_string());
        };
        let query: FactoryQueryMsg = serde_json::from_value(query.clone())
            .map_err(|e| format!("Error parsing into type: {}", e))?;
        let pair_json = |pair: &MockPair| {
            json!({
                "asset_infos": pair.asset_infos,
                "contract_addr": pair.contract_addr,
                "liquidity_token": pair.liquidity_token,
                "token_code_hash": pair_code_hash,
            })
        };
        match query {
            FactoryQueryMsg::Config {} => Ok(json!({
                "owner": owner,
                "pair_code_id": pair_code_id,
                "token_code_id": token_code_id,
            })),
            FactoryQueryMsg::Pair { asset_infos } => pairs
                .iter()
                .find(|pair| {
                    pair.asset_infos[0].same_asset(&asset_infos[0])
                        && pair.asset_infos[1].same_asset(&asset_infos[1])
                })
                .map(pair_json)
                .ok_or_else(|| "PairInfoRaw not found".to_string()),
            FactoryQueryMsg::Pairs { start_after, limit } => {
                let limit = limit.unwrap_or(DEFAULT_PAIRS_LIMIT).min(MAX_PAIRS_LIMIT) as usize;
                let start_after = start_after.map(|assets| MockPair::key(&assets));
                let mut listed = pairs
                    .iter()
                    .filter(|pair| match &start_after {
                        Some(start_after) => MockPair::key(&pair.asset_infos) > *start_after,
                        None => true,
                    })
                    .collect::<Vec<_>>();
                listed.sort_by_key(|pair| MockPair::key(&pair.asset_infos));
                Ok(json!({
                    "pairs": listed.into_iter().take(limit).map(pair_json).collect::<Vec<_>>(),
                }))
            }
            FactoryQueryMsg::PairSettings {} => Ok(json!({
                "pair_settings": {
                    "swap_fee": {
                        "commission_rate_nom": "3",
                        "commission_rate_denom": "1000",
                    },
                    "dev_fund": null,
                    "swap_data_endpoint": null,
                }
            })),
        }
    }
}

#[async_trait]
impl ChainConnection for MockChain {
    fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<TxResponse, ChainError> {
        let delay = {
            let state = self.state();
            if state.disconnected {
                return Err(ChainError::Connection(
                    "error sending request: connection refused".to_string(),
                ));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let index = state.broadcasts.len();
        state.broadcasts.push(envelope.clone());
        let txhash = format!("{:064X}", index + 1);

        let rejected = |code: u32, raw_log: String| TxResponse {
            txhash: txhash.clone(),
            code,
            codespace: "compute".to_string(),
            raw_log,
            gas_used: envelope.options.gas_limit,
            ..Default::default()
        };
        if let Some((code, raw_log)) = state.rejections.remove(&index) {
            return Ok(rejected(code, raw_log));
        }

        let mut ledger = state.ledger.clone();
        let mut responses = vec![];
        for (i, message) in envelope.messages.iter().enumerate() {
            match Self::apply(&mut ledger, message) {
                Ok(response) => responses.push(response),
                Err((code, log)) => {
                    return Ok(rejected(
                        code,
                        format!("failed to execute message; message index: {}: {}", i, log),
                    ))
                }
            }
        }
        ledger.height += 1;
        let height = ledger.height;
        state.ledger = ledger;

        if state.drop_responses {
            responses.clear();
        }
        state.committed.insert(
            txhash.clone(),
            TxResponse {
                txhash: txhash.clone(),
                height,
                gas_used: envelope.options.gas_limit / 2,
                responses,
                ..Default::default()
            },
        );
        Ok(TxResponse {
            txhash,
            ..Default::default()
        })
    }

    async fn committed(&self, txhash: &str) -> Result<Option<TxResponse>, ChainError> {
        let mut state = self.state();
        if state.disconnected || state.failed_lookups > 0 {
            state.failed_lookups = state.failed_lookups.saturating_sub(1);
            return Err(ChainError::Connection(
                "error sending request: connection refused".to_string(),
            ));
        }
        if state.hold_commits {
            return Ok(None);
        }
        Ok(state.committed.get(txhash).cloned())
    }

    async fn query(&self, contract: &ContractLink, query: &Value) -> Result<Value, ChainError> {
        let mut state = self.state();
        if state.disconnected {
            return Err(ChainError::query(
                &contract.address,
                "error sending request: connection refused",
            ));
        }
        state
            .queries
            .push((contract.address.clone(), query.clone()));
        if state.fail_queries {
            return Err(ChainError::query(&contract.address, "query failed"));
        }
        let deployed = state
            .ledger
            .contracts
            .get(&contract.address)
            .ok_or_else(|| ChainError::query(&contract.address, "contract not found"))?;
        if !deployed.code_hash.eq_ignore_ascii_case(&contract.code_hash) {
            return Err(ChainError::query(&contract.address, "code hash mismatch"));
        }
        Self::answer(&deployed.contract, query)
            .map_err(|reason| ChainError::query(&contract.address, reason))
    }
}
