use adamant_addresses::{ContractLink, TokenDescriptor};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    chain::{ChainConnection, ChainError},
    messages::{AssetInfo, FactoryQueryMsg},
};

/// Runs a typed query against a contract. Anything that goes wrong, including
/// a response that doesn't parse, is reported as a query failure.
pub async fn query<C, Q, R>(
    connection: &C,
    contract: &ContractLink,
    msg: &Q,
) -> Result<R, ChainError>
where
    C: ChainConnection + ?Sized,
    Q: Serialize,
    R: DeserializeOwned,
{
    let msg = serde_json::to_value(msg)
        .map_err(|e| ChainError::query(&contract.address, format!("invalid query: {}", e)))?;
    debug!(contract = %contract.address, query = %msg, "querying contract");
    let response = connection.query(contract, &msg).await?;
    serde_json::from_value(response).map_err(|e| {
        ChainError::query(&contract.address, format!("unexpected response: {}", e))
    })
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ConfigResponse {
    pub owner: String,
    pub pair_code_id: u64,
    pub token_code_id: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PairInfo {
    pub asset_infos: [AssetInfo; 2],
    pub contract_addr: String,
    pub liquidity_token: String,
    #[serde(default)]
    pub token_code_hash: String,
}

impl PairInfo {
    pub fn matches(&self, assets: &[AssetInfo; 2]) -> bool {
        self.asset_infos[0].same_asset(&assets[0]) && self.asset_infos[1].same_asset(&assets[1])
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PairsResponse {
    pub pairs: Vec<PairInfo>,
}

/// The outcome of looking up every requested pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PairsCheck {
    /// The pairs the factory knows, in the order they were requested.
    pub found: Vec<PairInfo>,
    pub mismatches: Vec<String>,
}

/// Read-only access to a deployed factory.
pub struct FactoryQuerier<'a, C: ChainConnection + ?Sized> {
    connection: &'a C,
    factory: &'a ContractLink,
}

impl<'a, C: ChainConnection + ?Sized> FactoryQuerier<'a, C> {
    pub fn new(connection: &'a C, factory: &'a ContractLink) -> Self {
        Self {
            connection,
            factory,
        }
    }

    pub async fn config(&self) -> Result<ConfigResponse, ChainError> {
        query(self.connection, self.factory, &FactoryQueryMsg::Config {}).await
    }

    pub async fn pairs(&self, limit: u32) -> Result<PairsResponse, ChainError> {
        query(
            self.connection,
            self.factory,
            &FactoryQueryMsg::Pairs {
                start_after: None,
                limit: Some(limit),
            },
        )
        .await
    }

    pub async fn pair(&self, asset_infos: [AssetInfo; 2]) -> Result<PairInfo, ChainError> {
        query(
            self.connection,
            self.factory,
            &FactoryQueryMsg::Pair { asset_infos },
        )
        .await
    }

    /// Looks up the `base`/`quote` pair for every quote. The factory lists
    /// pairs by storage key, so a bounded listing can't tell whether a given
    /// pair exists.
    pub async fn verify_pairs(
        &self,
        base: &TokenDescriptor,
        quotes: &[TokenDescriptor],
        viewing_key: &str,
    ) -> PairsCheck {
        let base_info = AssetInfo::token(base, viewing_key);
        let mut check = PairsCheck::default();
        for quote in quotes {
            let assets = [base_info.clone(), AssetInfo::token(quote, viewing_key)];
            match self.pair(assets.clone()).await {
                Ok(pair) if pair.matches(&assets) => check.found.push(pair),
                Ok(pair) => check.mismatches.push(format!(
                    "pair {}/{} is registered for {}/{}",
                    base.name, quote.name, pair.asset_infos[0], pair.asset_infos[1]
                )),
                Err(e) => {
                    warn!(base = %base.name, quote = %quote.name, error = %e, "pair lookup failed");
                    check
                        .mismatches
                        .push(format!("pair {}/{} is missing: {}", base.name, quote.name, e));
                }
            }
        }
        check
    }
}

/// Compares the factory's configuration with what it was instantiated with.
pub fn verify_config(
    config: &ConfigResponse,
    owner: &str,
    pair_code_id: u64,
    token_code_id: u64,
) -> Vec<String> {
    let mut mismatches = vec![];
    if config.owner != owner {
        mismatches.push(format!(
            "factory owner is {}, expected {}",
            config.owner, owner
        ));
    }
    if config.pair_code_id != pair_code_id {
        mismatches.push(format!(
            "factory pair code id is {}, expected {}",
            config.pair_code_id, pair_code_id
        ));
    }
    if config.token_code_id != token_code_id {
        mismatches.push(format!(
            "factory token code id is {}, expected {}",
            config.token_code_id, token_code_id
        ));
    }
    mismatches
}
