use adamant_addresses::Addresses;
use adamant_deploy::{
    chain::{ChainConnection, SecretCli},
    config::DeployConfig,
    infra::{query_addresses, read_addresses},
    logging,
    messages::FactoryQueryMsg,
    query::{query, verify_config, FactoryQuerier},
};
use eyre::Result;
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<()> {
    logging::initialize("warn");
    let config = DeployConfig::from_env()?;

    // Find the factory, either from the environment or from the artifacts of
    // a previous deployment.
    let factory = match config.factory_link()? {
        Some(factory) => factory,
        None => {
            let addresses: Addresses = match &config.artifacts_url {
                Some(url) => query_addresses(url).await?,
                None => read_addresses(&config.artifacts_path)?,
            };
            addresses.factory
        }
    };
    let connection = SecretCli::connect(&config).await?;
    let querier = FactoryQuerier::new(&connection, &factory);
    println!("factory {}", factory.address);

    let factory_config = querier.config().await?;
    println!(
        "owner {} pair code id {} token code id {}",
        factory_config.owner, factory_config.pair_code_id, factory_config.token_code_id
    );
    for mismatch in verify_config(
        &factory_config,
        &connection.identity().address,
        config.pair_code_id,
        config.token_code_id,
    ) {
        println!("mismatch: {}", mismatch);
    }

    let settings: Value = query(&connection, &factory, &FactoryQueryMsg::PairSettings {}).await?;
    println!("pair settings {}", settings);

    let pairs = querier.pairs(config.pairs_query_limit).await?;
    for pair in &pairs.pairs {
        println!(
            "pair {}/{} at {} with liquidity token {}",
            pair.asset_infos[0], pair.asset_infos[1], pair.contract_addr, pair.liquidity_token
        );
    }
    let tokens = config.tokens()?;
    let check = querier
        .verify_pairs(&tokens[0], &tokens[1..], &config.viewing_key)
        .await;
    println!("found {} of {} pairs", check.found.len(), tokens.len() - 1);
    for mismatch in check.mismatches {
        println!("mismatch: {}", mismatch);
    }

    Ok(())
}
