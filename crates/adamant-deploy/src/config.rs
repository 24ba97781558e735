use std::{fmt, fs, path::PathBuf, time::Duration};

use adamant_addresses::{validate_address, ContractLink, ContractReference, TokenDescriptor};
use cosmwasm_std::Binary;
use eyre::{eyre, Result, WrapErr};
use rand::Rng;
use serde::Deserialize;

use crate::{
    chain::TxOptions,
    constants::{
        BROADCAST_TIMEOUT, FACTORY_CODE_HASH, FACTORY_CODE_ID, FACTORY_GAS_LIMIT, FEE_DENOM,
        GAS_PRICE, PAIRS_GAS_LIMIT, PAIR_CODE_HASH, PAIR_CODE_ID, SECRET_CHAIN_ID, SECRET_RPC_URL,
        TOKENS, TOKEN_CODE_HASH, TOKEN_CODE_ID, VIEWING_KEY,
    },
};

/// The prefix of every environment variable the deployment reads.
pub const ENV_PREFIX: &str = "ADAMANT_";

/// A keyring mnemonic. It never shows up in logs or debug output.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Mnemonic(String);

impl Mnemonic {
    pub fn new(phrase: &str) -> Self {
        Self(phrase.to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mnemonic(<redacted>)")
    }
}

/// Everything a deployment run needs to know. It is read once at startup and
/// handed to the deployer, which never changes it.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    // connection
    pub rpc_url: String,
    pub chain_id: String,
    pub secretcli: String,
    pub key_name: String,
    pub keyring_backend: String,
    pub mnemonic: Option<Mnemonic>,
    // contract templates
    pub factory_code_id: u64,
    pub factory_code_hash: String,
    pub pair_code_id: u64,
    pub pair_code_hash: String,
    pub token_code_id: u64,
    pub token_code_hash: String,
    // factory
    pub prng_seed: String,
    pub factory_label: String,
    pub factory_address: Option<String>,
    // pairs
    pub viewing_key: String,
    pub tokens_path: Option<PathBuf>,
    // transactions
    pub factory_gas_limit: u64,
    pub pairs_gas_limit: u64,
    pub gas_price: f64,
    pub fee_denom: String,
    pub broadcast_timeout_ms: u64,
    // verification
    pub pairs_query_limit: u32,
    pub strict_verification: bool,
    // artifacts
    pub artifacts_path: PathBuf,
    pub artifacts_url: Option<String>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            // connection
            rpc_url: SECRET_RPC_URL.to_string(),
            chain_id: SECRET_CHAIN_ID.to_string(),
            secretcli: "secretcli".to_string(),
            key_name: "deployer".to_string(),
            keyring_backend: "test".to_string(),
            mnemonic: None,
            // contract templates
            factory_code_id: FACTORY_CODE_ID,
            factory_code_hash: FACTORY_CODE_HASH.to_string(),
            pair_code_id: PAIR_CODE_ID,
            pair_code_hash: PAIR_CODE_HASH.to_string(),
            token_code_id: TOKEN_CODE_ID,
            token_code_hash: TOKEN_CODE_HASH.to_string(),
            // factory
            prng_seed: "adamantfi rocks".to_string(),
            factory_label: "adamantfi-factory-alpha0".to_string(),
            factory_address: None,
            // pairs
            viewing_key: VIEWING_KEY.to_string(),
            tokens_path: None,
            // transactions
            factory_gas_limit: FACTORY_GAS_LIMIT,
            pairs_gas_limit: PAIRS_GAS_LIMIT,
            gas_price: GAS_PRICE,
            fee_denom: FEE_DENOM.to_string(),
            broadcast_timeout_ms: BROADCAST_TIMEOUT.as_millis() as u64,
            // verification
            pairs_query_limit: 5,
            strict_verification: false,
            // artifacts
            artifacts_path: PathBuf::from("./artifacts/addresses.json"),
            artifacts_url: None,
        }
    }
}

impl DeployConfig {
    /// Reads the configuration from `ADAMANT_*` environment variables. A
    /// `.env` file in the working directory is loaded first if there is one.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed(ENV_PREFIX)
            .from_env()
            .wrap_err("failed to read the deployment configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(eyre!("rpc url can't be empty"));
        }
        if self.chain_id.is_empty() {
            return Err(eyre!("chain id can't be empty"));
        }
        if self.factory_label.is_empty() {
            return Err(eyre!("factory label can't be empty"));
        }
        if self.factory_gas_limit == 0 || self.pairs_gas_limit == 0 {
            return Err(eyre!("gas limits must be positive"));
        }
        if !self.gas_price.is_finite() || self.gas_price < 0.0 {
            return Err(eyre!("invalid gas price {}", self.gas_price));
        }
        if self.broadcast_timeout_ms == 0 {
            return Err(eyre!("broadcast timeout must be positive"));
        }
        if self.pairs_query_limit == 0 {
            return Err(eyre!("pairs query limit must be positive"));
        }
        self.factory().wrap_err("invalid factory template")?;
        self.pair().wrap_err("invalid pair template")?;
        self.token().wrap_err("invalid token template")?;
        self.factory_link()?;
        Ok(())
    }

    pub fn factory(&self) -> Result<ContractReference> {
        ContractReference::new(self.factory_code_id, &self.factory_code_hash)
    }

    pub fn pair(&self) -> Result<ContractReference> {
        ContractReference::new(self.pair_code_id, &self.pair_code_hash)
    }

    pub fn token(&self) -> Result<ContractReference> {
        ContractReference::new(self.token_code_id, &self.token_code_hash)
    }

    /// The existing factory to resume against, if one is configured.
    pub fn factory_link(&self) -> Result<Option<ContractLink>> {
        match self.factory_address.as_deref().map(str::trim) {
            Some(address) if !address.is_empty() => {
                validate_address(address, adamant_addresses::ADDRESS_PREFIX)
                    .wrap_err("invalid factory address")?;
                Ok(Some(ContractLink::new(address, &self.factory_code_hash)?))
            }
            _ => Ok(None),
        }
    }

    /// The factory's PRNG seed. An empty configured seed gets replaced with
    /// 32 random bytes.
    pub fn prng_seed(&self) -> Binary {
        if self.prng_seed.is_empty() {
            let seed: [u8; 32] = rand::thread_rng().gen();
            Binary::from(seed.to_vec())
        } else {
            Binary::from(self.prng_seed.as_bytes())
        }
    }

    pub fn broadcast_timeout(&self) -> Duration {
        Duration::from_millis(self.broadcast_timeout_ms)
    }

    pub fn factory_tx_options(&self) -> TxOptions {
        self.tx_options(self.factory_gas_limit)
    }

    /// The pair batch shares a single gas limit, so it has to cover every
    /// `create_pair` in the transaction.
    pub fn pairs_tx_options(&self) -> TxOptions {
        self.tx_options(self.pairs_gas_limit)
    }

    fn tx_options(&self, gas_limit: u64) -> TxOptions {
        TxOptions {
            gas_limit,
            gas_price: self.gas_price,
            fee_denom: self.fee_denom.clone(),
            wait_for_commit: true,
            timeout: self.broadcast_timeout(),
        }
    }

    /// The tokens to pair. The first one is the base asset.
    pub fn tokens(&self) -> Result<Vec<TokenDescriptor>> {
        let tokens = match &self.tokens_path {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .wrap_err_with(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str::<Vec<TokenDescriptor>>(&contents)
                    .wrap_err_with(|| format!("failed to parse {}", path.display()))?
            }
            None => TOKENS.clone(),
        };
        if tokens.len() < 2 {
            return Err(eyre!(
                "at least two tokens are needed to create a pair, got {}",
                tokens.len()
            ));
        }
        for token in &tokens {
            token
                .validate()
                .wrap_err_with(|| format!("invalid token {}", token.name))?;
        }
        Ok(tokens)
    }
}
