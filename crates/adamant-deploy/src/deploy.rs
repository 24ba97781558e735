use std::{fmt, sync::Arc};

use adamant_addresses::{Addresses, ContractLink, PairAddresses, TokenDescriptor};
use eyre::{eyre, Result, WrapErr};
use tracing::{error, info, instrument, warn};

use crate::{
    chain::{Broadcaster, ChainConnection, TransactionResult, TxMessage},
    config::DeployConfig,
    decode::decode_instantiated_address,
    messages::{create_pairs, instantiate_factory, FactoryInitMsg},
    query::{verify_config, ConfigResponse, FactoryQuerier, PairInfo, PairsResponse},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeployStep {
    InstantiateFactory,
    VerifyFactory,
    BuildPairMessages,
    BroadcastPairCreation,
    VerifyPairs,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStep::InstantiateFactory => "instantiate factory",
            DeployStep::VerifyFactory => "verify factory",
            DeployStep::BuildPairMessages => "build pair messages",
            DeployStep::BroadcastPairCreation => "broadcast pair creation",
            DeployStep::VerifyPairs => "verify pairs",
        };
        write!(f, "{}", name)
    }
}

/// A failed query or a mismatch found by one of the verification steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvisoryIssue {
    pub step: DeployStep,
    pub message: String,
}

impl fmt::Display for AdvisoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

#[derive(Clone, Debug)]
pub struct DeployReport {
    pub factory: ContractLink,
    /// Whether this run instantiated the factory or resumed against it.
    pub factory_created: bool,
    pub factory_tx: Option<TransactionResult>,
    pub pairs_tx: TransactionResult,
    pub config: Option<ConfigResponse>,
    /// The first page of the factory's pairs.
    pub listing: Option<PairsResponse>,
    /// The requested pairs the factory knows, in token order.
    pub pairs: Vec<PairInfo>,
    pub issues: Vec<AdvisoryIssue>,
}

impl DeployReport {
    pub fn addresses(&self) -> Addresses {
        Addresses {
            factory: self.factory.clone(),
            factory_created: self.factory_created,
            pairs: self
                .pairs
                .iter()
                .map(|pair| PairAddresses {
                    assets: [
                        pair.asset_infos[0].to_string(),
                        pair.asset_infos[1].to_string(),
                    ],
                    contract_addr: pair.contract_addr.clone(),
                    liquidity_token: pair.liquidity_token.clone(),
                })
                .collect(),
        }
    }
}

/// Deploys the factory and creates a pair between the base token and every
/// other token.
///
/// The steps run in order and each one waits for the one before it. Only the
/// factory instantiation and the pair batch can fail a run. The queries in
/// between are advisory and end up in the report.
pub struct Deployer<C: ChainConnection> {
    config: DeployConfig,
    broadcaster: Broadcaster<C>,
    base: TokenDescriptor,
    quotes: Vec<TokenDescriptor>,
}

impl<C: ChainConnection> Deployer<C> {
    pub fn new(config: DeployConfig, connection: Arc<C>) -> Result<Self> {
        config.validate()?;
        let mut tokens = config.tokens()?;
        let base = tokens.remove(0);
        Ok(Self {
            config,
            broadcaster: Broadcaster::new(connection),
            base,
            quotes: tokens,
        })
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    fn connection(&self) -> &C {
        self.broadcaster.connection()
    }

    fn sender(&self) -> &str {
        &self.connection().identity().address
    }

    /// Names the pairs that the batch creates, e.g. `sSCRT/[sATOM, SILK]`.
    pub fn token_set(&self) -> String {
        format!(
            "{}/[{}]",
            self.base.name,
            self.quotes
                .iter()
                .map(|quote| quote.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    pub async fn run(&self) -> Result<DeployReport> {
        let mut issues = vec![];

        // Instantiate the factory unless we're resuming against one.
        let (factory, factory_tx) = match self.config.factory_link()? {
            Some(factory) => {
                info!(factory = %factory.address, "resuming against an existing factory");
                (factory, None)
            }
            None => {
                let (factory, result) =
                    self.instantiate_factory().await.wrap_err_with(|| {
                        format!("step failed: {}", DeployStep::InstantiateFactory)
                    })?;
                (factory, Some(result))
            }
        };

        // Check the factory's configuration.
        let config = self.verify_factory(&factory, &mut issues).await;

        // Create every pair in a single transaction.
        let pairs_tx = self.create_pairs(&factory).await;

        // Look up the pairs. This runs even if the batch failed so that the
        // operator can see what the factory holds.
        let (listing, pairs) = self.verify_pairs(&factory, &mut issues).await;

        let pairs_tx = pairs_tx?;
        if self.config.strict_verification && !issues.is_empty() {
            for issue in &issues {
                error!(%issue, "verification failed");
            }
            return Err(eyre!(
                "verification of factory {} found {} issue(s), first: {}",
                factory.address,
                issues.len(),
                issues[0]
            ));
        }

        info!(
            factory = %factory.address,
            pairs = self.quotes.len(),
            issues = issues.len(),
            "deployment finished"
        );
        Ok(DeployReport {
            factory_created: factory_tx.is_some(),
            factory,
            factory_tx,
            pairs_tx,
            config,
            listing,
            pairs,
            issues,
        })
    }

    #[instrument(skip(self), fields(label = %self.config.factory_label))]
    pub async fn instantiate_factory(&self) -> Result<(ContractLink, TransactionResult)> {
        let init_msg = FactoryInitMsg {
            pair_code_id: self.config.pair_code_id,
            token_code_id: self.config.token_code_id,
            token_code_hash: self.config.token_code_hash.clone(),
            pair_code_hash: self.config.pair_code_hash.clone(),
            prng_seed: self.config.prng_seed(),
        };
        let request = instantiate_factory(
            self.sender(),
            &self.config.factory()?,
            &self.config.factory_label,
            &init_msg,
        )?;
        let result = self
            .broadcaster
            .broadcast(vec![request.into()], self.config.factory_tx_options())
            .await?;
        let address = decode_instantiated_address(&result, 0)?;
        info!(
            factory = %address,
            txhash = %result.txhash,
            gas_used = result.gas_used,
            "instantiated factory"
        );
        Ok((
            ContractLink::new(address, &self.config.factory_code_hash)?,
            result,
        ))
    }

    async fn verify_factory(
        &self,
        factory: &ContractLink,
        issues: &mut Vec<AdvisoryIssue>,
    ) -> Option<ConfigResponse> {
        let step = DeployStep::VerifyFactory;
        match FactoryQuerier::new(self.connection(), factory).config().await {
            Ok(config) => {
                info!(?config, "factory config");
                for message in verify_config(
                    &config,
                    self.sender(),
                    self.config.pair_code_id,
                    self.config.token_code_id,
                ) {
                    warn!(%message, "factory config mismatch");
                    issues.push(AdvisoryIssue { step, message });
                }
                Some(config)
            }
            Err(e) => {
                warn!(error = %e, "factory config query failed");
                issues.push(AdvisoryIssue {
                    step,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    pub fn build_pair_messages(&self, factory: &ContractLink) -> Result<Vec<TxMessage>> {
        Ok(create_pairs(
            self.sender(),
            factory,
            &self.base,
            &self.quotes,
            &self.config.viewing_key,
        )
        .wrap_err_with(|| format!("step failed: {}", DeployStep::BuildPairMessages))?
        .into_iter()
        .map(TxMessage::from)
        .collect())
    }

    async fn create_pairs(&self, factory: &ContractLink) -> Result<TransactionResult> {
        let messages = self.build_pair_messages(factory)?;
        info!(pairs = %self.token_set(), "creating pairs");
        match self
            .broadcaster
            .broadcast(messages, self.config.pairs_tx_options())
            .await
        {
            Ok(result) => {
                info!(
                    txhash = %result.txhash,
                    height = result.height,
                    gas_used = result.gas_used,
                    "created pairs"
                );
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, pairs = %self.token_set(), "pair creation failed");
                Err(e).wrap_err_with(|| {
                    format!(
                        "step failed: {} for {}",
                        DeployStep::BroadcastPairCreation,
                        self.token_set()
                    )
                })
            }
        }
    }

    async fn verify_pairs(
        &self,
        factory: &ContractLink,
        issues: &mut Vec<AdvisoryIssue>,
    ) -> (Option<PairsResponse>, Vec<PairInfo>) {
        let step = DeployStep::VerifyPairs;
        let querier = FactoryQuerier::new(self.connection(), factory);
        let listing = match querier.pairs(self.config.pairs_query_limit).await {
            Ok(listing) => {
                for pair in &listing.pairs {
                    info!(
                        assets = %format!("{}/{}", pair.asset_infos[0], pair.asset_infos[1]),
                        pair = %pair.contract_addr,
                        liquidity_token = %pair.liquidity_token,
                        "factory pair"
                    );
                }
                Some(listing)
            }
            Err(e) => {
                warn!(error = %e, "pairs query failed");
                issues.push(AdvisoryIssue {
                    step,
                    message: e.to_string(),
                });
                None
            }
        };

        let check = querier
            .verify_pairs(&self.base, &self.quotes, &self.config.viewing_key)
            .await;
        for message in check.mismatches {
            warn!(%message, "pair mismatch");
            issues.push(AdvisoryIssue { step, message });
        }
        (listing, check.found)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        chain::{ChainError, MockChain},
        constants::TOKENS,
        messages::{AssetInfo, FactoryExecuteMsg, FactoryQueryMsg},
    };

    use super::*;

    fn config(quotes: usize) -> DeployConfig {
        let path = std::env::temp_dir().join(format!(
            "adamant-deploy-tokens-{}-{}.json",
            quotes,
            rand::random::<u64>()
        ));
        std::fs::write(
            &path,
            serde_json::to_string(&TOKENS[..=quotes]).unwrap(),
        )
        .unwrap();
        DeployConfig {
            tokens_path: Some(path),
            ..Default::default()
        }
    }

    fn query_kinds(chain: &MockChain) -> Vec<String> {
        chain
            .queries()
            .into_iter()
            .map(|(_, query)| {
                let query: FactoryQueryMsg = serde_json::from_value(query).unwrap();
                match query {
                    FactoryQueryMsg::Config {} => "config",
                    FactoryQueryMsg::Pairs { .. } => "pairs",
                    FactoryQueryMsg::Pair { .. } => "pair",
                    FactoryQueryMsg::PairSettings {} => "pair_settings",
                }
                .to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_deploy() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        let deployer = Deployer::new(config(4), chain.clone())?;
        assert_eq!(deployer.token_set(), "sSCRT/[sATOM, SILK, ETH.axl, USDC.nbl]");

        let report = deployer.run().await?;
        assert!(report.factory_created);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.config.as_ref().unwrap().pair_code_id, 31);
        assert_eq!(report.listing.as_ref().unwrap().pairs.len(), 4);
        assert_eq!(report.pairs.len(), 4);

        // One transaction for the factory and one for all the pairs.
        let broadcasts = chain.broadcasts();
        assert_eq!(broadcasts.len(), 2);
        assert_eq!(broadcasts[0].messages.len(), 1);
        assert_eq!(broadcasts[0].options.gas_limit, 50_000);
        assert_eq!(broadcasts[1].messages.len(), 4);
        assert_eq!(broadcasts[1].options.gas_limit, 2_000_000);
        for (message, quote) in broadcasts[1].messages.iter().zip(&TOKENS[1..5]) {
            let TxMessage::Execute(request) = message else {
                panic!("expected an execute message");
            };
            assert_eq!(request.contract_address, report.factory.address);
            let FactoryExecuteMsg::CreatePair { asset_infos } =
                serde_json::from_value(request.msg.clone())?;
            assert_eq!(asset_infos[0], AssetInfo::token(&TOKENS[0], "SecretSwap"));
            assert_eq!(asset_infos[1], AssetInfo::token(quote, "SecretSwap"));
        }
        assert_eq!(
            query_kinds(&chain),
            vec!["config", "pairs", "pair", "pair", "pair", "pair"]
        );

        let addresses = report.addresses();
        assert_eq!(addresses.factory, report.factory);
        assert_eq!(addresses.pairs.len(), 4);
        assert_eq!(
            addresses.pairs[0].assets,
            [TOKENS[0].address.clone(), TOKENS[1].address.clone()]
        );
        assert_eq!(chain.pairs(&report.factory.address).len(), 4);

        Ok(())
    }

    #[tokio::test]
    async fn test_factory_failure_stops_the_run() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        chain.reject_next_broadcast(11, "out of gas in location: WriteFlat");
        let deployer = Deployer::new(config(4), chain.clone())?;

        let error = deployer.run().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ChainError>(),
            Some(ChainError::BroadcastRejected(_))
        ));
        assert_eq!(chain.broadcasts().len(), 1);
        assert!(chain.queries().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_undecodable_factory_address_stops_the_run() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        chain.drop_responses();
        let deployer = Deployer::new(config(2), chain.clone())?;

        let error = deployer.run().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ChainError>(),
            Some(ChainError::Decode { .. })
        ));
        assert_eq!(chain.broadcasts().len(), 1);
        assert!(chain.queries().is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_pair_failure_still_verifies() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        chain.reject_broadcast(1, 5, "insufficient fees");
        let deployer = Deployer::new(config(3), chain.clone())?;

        let error = deployer.run().await.unwrap_err();
        assert!(error.to_string().contains("sSCRT/[sATOM, SILK, ETH.axl]"));
        match error.downcast_ref::<ChainError>() {
            Some(ChainError::BroadcastRejected(rejection)) => {
                assert_eq!(rejection.code, Some(5));
                assert_eq!(rejection.raw_log, "insufficient fees");
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
        assert_eq!(chain.broadcasts().len(), 2);
        assert_eq!(
            query_kinds(&chain),
            vec!["config", "pairs", "pair", "pair", "pair"]
        );

        // The batch reverted as a whole.
        let factory = chain.queries()[0].0.clone();
        assert!(chain.pairs(&factory).is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_query_failures_are_advisory() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        chain.fail_queries();
        let report = Deployer::new(config(2), chain.clone())?.run().await?;

        assert!(report.config.is_none());
        assert!(report.listing.is_none());
        assert!(report.pairs.is_empty());
        assert_eq!(
            report
                .issues
                .iter()
                .map(|issue| issue.step)
                .collect::<Vec<_>>(),
            vec![
                DeployStep::VerifyFactory,
                DeployStep::VerifyPairs,
                DeployStep::VerifyPairs,
                DeployStep::VerifyPairs
            ]
        );
        assert_eq!(chain.pairs(&report.factory.address).len(), 2);
        assert!(report.addresses().pairs.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_strict_verification() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        chain.fail_queries();
        let config = DeployConfig {
            strict_verification: true,
            ..config(2)
        };
        let error = Deployer::new(config, chain.clone())?.run().await.unwrap_err();
        assert!(error.to_string().contains("4 issue(s)"));

        // The pairs were still created.
        assert_eq!(chain.broadcasts().len(), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_resume() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        let first = Deployer::new(config(2), chain.clone())?.run().await?;

        // Resuming skips the instantiation and adds the remaining pairs.
        let config = DeployConfig {
            factory_address: Some(first.factory.address.clone()),
            ..config(5)
        };
        let mut deployer = Deployer::new(config, chain.clone())?;
        deployer.quotes.drain(..2);
        let report = deployer.run().await?;

        assert!(!report.factory_created);
        assert!(report.factory_tx.is_none());
        assert_eq!(report.factory, first.factory);
        assert_eq!(chain.broadcasts().len(), 3);
        assert_eq!(chain.broadcasts()[2].messages.len(), 3);
        assert_eq!(chain.pairs(&report.factory.address).len(), 5);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.pairs.len(), 3);

        // Re-creating existing pairs reverts the whole batch.
        let config = DeployConfig {
            factory_address: Some(first.factory.address.clone()),
            ..Default::default()
        };
        let error = Deployer::new(config, chain.clone())?.run().await.unwrap_err();
        match error.downcast_ref::<ChainError>() {
            Some(ChainError::BroadcastRejected(rejection)) => {
                assert!(rejection.raw_log.contains("Pair already exists"))
            }
            other => panic!("expected a rejection, got {:?}", other),
        }
        assert_eq!(chain.pairs(&report.factory.address).len(), 5);

        Ok(())
    }

    #[tokio::test]
    async fn test_resume_beyond_the_listing_limit() -> Result<()> {
        let chain = Arc::new(MockChain::new());
        let first = Deployer::new(config(2), chain.clone())?.run().await?;

        // Five pairs on chain, but only three fit in the listing.
        let config = DeployConfig {
            factory_address: Some(first.factory.address.clone()),
            pairs_query_limit: 3,
            ..config(5)
        };
        let mut deployer = Deployer::new(config, chain.clone())?;
        deployer.quotes.drain(..2);
        let report = deployer.run().await?;

        assert_eq!(chain.pairs(&report.factory.address).len(), 5);
        let listing = report.listing.as_ref().unwrap();
        assert_eq!(listing.pairs.len(), 3);
        assert!(report
            .pairs
            .iter()
            .any(|pair| !listing.pairs.contains(pair)));
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.pairs.len(), 3);
        for (pair, quote) in report.pairs.iter().zip(&TOKENS[3..=5]) {
            assert_eq!(pair.asset_infos[1].to_string(), quote.address);
        }

        Ok(())
    }
}
