use std::sync::Arc;

use adamant_deploy::{
    chain::{ChainConnection, SecretCli},
    config::DeployConfig,
    deploy::Deployer,
    logging,
    query::FactoryQuerier,
};
use eyre::Result;

// These need a running node and a funded key, e.g. a localsecret container
// with `ADAMANT_RPC_URL`, `ADAMANT_CHAIN_ID` and `ADAMANT_MNEMONIC` set.
#[ignore]
#[tokio::test]
async fn test_live_deploy() -> Result<()> {
    logging::initialize_reentrant("info");

    // Connect to the node and deploy.
    let config = DeployConfig::from_env()?;
    let connection = Arc::new(SecretCli::connect(&config).await?);
    let report = Deployer::new(config.clone(), connection.clone())?
        .run()
        .await?;

    // The factory is owned by the deployer and knows every new pair.
    let querier = FactoryQuerier::new(&*connection, &report.factory);
    let factory_config = querier.config().await?;
    assert_eq!(factory_config.owner, connection.identity().address);
    let tokens = config.tokens()?;
    let check = querier
        .verify_pairs(&tokens[0], &tokens[1..], &config.viewing_key)
        .await;
    assert!(check.mismatches.is_empty(), "{:?}", check.mismatches);
    assert_eq!(check.found.len(), tokens.len() - 1);

    Ok(())
}
