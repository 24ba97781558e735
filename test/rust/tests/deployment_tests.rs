use std::{path::PathBuf, sync::Arc, time::Duration};

use adamant_addresses::TokenDescriptor;
use adamant_deploy::{
    chain::{ChainError, MockChain, TxMessage},
    config::DeployConfig,
    constants::TOKENS,
    deploy::{DeployStep, Deployer},
    infra::{read_addresses, write_addresses},
    logging,
};
use eyre::Result;

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("adamant-tests-{}", rand::random::<u64>()))
        .join(name)
}

fn tokens_file(tokens: &[TokenDescriptor]) -> Result<PathBuf> {
    let path = scratch_path("tokens.json");
    std::fs::create_dir_all(path.parent().unwrap())?;
    std::fs::write(&path, serde_json::to_string(tokens)?)?;
    Ok(path)
}

#[tokio::test]
async fn test_deploy_and_write_artifacts() -> Result<()> {
    logging::initialize_reentrant("info");

    // Deploy against the default token list.
    let chain = Arc::new(MockChain::new());
    let config = DeployConfig {
        artifacts_path: scratch_path("addresses.json"),
        ..Default::default()
    };
    let report = Deployer::new(config.clone(), chain.clone())?.run().await?;
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(report.pairs_tx.responses.len(), TOKENS.len() - 1);

    // The artifacts hold the factory and every pair it reported.
    write_addresses(&config.artifacts_path, &report.addresses())?;
    let addresses = read_addresses(&config.artifacts_path)?;
    assert_eq!(addresses.factory, report.factory);
    assert!(addresses.factory_created);
    assert_eq!(addresses.pairs.len(), 5);
    for (pair, quote) in addresses.pairs.iter().zip(&TOKENS[1..]) {
        assert_eq!(pair.assets[0], TOKENS[0].address);
        assert_eq!(pair.assets[1], quote.address);
        assert_ne!(pair.contract_addr, pair.liquidity_token);
    }

    Ok(())
}

#[tokio::test]
async fn test_four_pair_scenario() -> Result<()> {
    logging::initialize_reentrant("info");

    let chain = Arc::new(MockChain::new());
    let config = DeployConfig {
        tokens_path: Some(tokens_file(&TOKENS[..5])?),
        ..Default::default()
    };
    let report = Deployer::new(config, chain.clone())?.run().await?;

    let batch = &chain.broadcasts()[1];
    assert_eq!(batch.messages.len(), 4);
    for (message, quote) in batch.messages.iter().zip(&TOKENS[1..5]) {
        let TxMessage::Execute(request) = message else {
            panic!("expected an execute message, got {}", message.kind());
        };
        assert_eq!(
            request.msg["create_pair"]["asset_infos"][0]["token"]["contract_addr"],
            TOKENS[0].address.as_str()
        );
        assert_eq!(
            request.msg["create_pair"]["asset_infos"][1]["token"]["contract_addr"],
            quote.address.as_str()
        );
        for slot in 0..2 {
            assert_eq!(
                request.msg["create_pair"]["asset_infos"][slot]["token"]["viewing_key"],
                "SecretSwap"
            );
        }
    }
    assert_eq!(chain.pairs(&report.factory.address).len(), 4);

    Ok(())
}

#[tokio::test]
async fn test_factory_timeout_stops_the_run() -> Result<()> {
    logging::initialize_reentrant("info");

    let chain = Arc::new(MockChain::new());
    chain.delay_broadcasts(Duration::from_secs(30));
    let config = DeployConfig {
        broadcast_timeout_ms: 50,
        ..Default::default()
    };
    let error = Deployer::new(config, chain.clone())?
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<ChainError>(),
        Some(ChainError::BroadcastTimeout { .. })
    ));
    assert!(chain.queries().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unreachable_node_stops_the_run() -> Result<()> {
    logging::initialize_reentrant("info");

    let chain = Arc::new(MockChain::new());
    chain.disconnect();
    let error = Deployer::new(DeployConfig::default(), chain.clone())?
        .run()
        .await
        .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<ChainError>(),
        Some(ChainError::Connection(_))
    ));
    assert!(chain.broadcasts().is_empty());
    assert!(chain.queries().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_rejected_batch_is_verified_and_reported() -> Result<()> {
    logging::initialize_reentrant("info");

    let chain = Arc::new(MockChain::new());
    chain.reject_broadcast(1, 11, "out of gas in location: WriteFlat");
    let error = Deployer::new(DeployConfig::default(), chain.clone())?
        .run()
        .await
        .unwrap_err();

    // The error names the tokens the batch tried to pair.
    assert!(error
        .to_string()
        .contains("sSCRT/[sATOM, SILK, ETH.axl, USDC.nbl, JKL]"));
    match error.downcast_ref::<ChainError>() {
        Some(ChainError::BroadcastRejected(rejection)) => {
            assert_eq!(rejection.code, Some(11));
            assert!(rejection.raw_log.contains("out of gas"));
        }
        other => panic!("expected a rejection, got {:?}", other),
    }

    // The pairs were still listed and looked up after the failure.
    let queries = chain.queries();
    assert_eq!(queries.len(), 2 + TOKENS.len() - 1);
    assert_eq!(queries[1].1, serde_json::json!({ "pairs": { "limit": 5 } }));
    for ((_, query), quote) in queries[2..].iter().zip(&TOKENS[1..]) {
        assert_eq!(
            query["pair"]["asset_infos"][1]["token"]["contract_addr"],
            quote.address.as_str()
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_resume_from_artifacts() -> Result<()> {
    logging::initialize_reentrant("info");

    // The first run only creates a single pair.
    let chain = Arc::new(MockChain::new());
    let artifacts_path = scratch_path("addresses.json");
    let config = DeployConfig {
        tokens_path: Some(tokens_file(&TOKENS[..2])?),
        artifacts_path: artifacts_path.clone(),
        ..Default::default()
    };
    let report = Deployer::new(config, chain.clone())?.run().await?;
    write_addresses(&artifacts_path, &report.addresses())?;

    // The second run picks up the factory and pairs the rest.
    let addresses = read_addresses(&artifacts_path)?;
    let mut rest = vec![TOKENS[0].clone()];
    rest.extend_from_slice(&TOKENS[2..]);
    let config = DeployConfig {
        factory_address: Some(addresses.factory.address.clone()),
        tokens_path: Some(tokens_file(&rest)?),
        ..Default::default()
    };
    let report = Deployer::new(config, chain.clone())?.run().await?;

    assert!(!report.factory_created);
    assert_eq!(report.factory, addresses.factory);
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(chain.broadcasts().len(), 3);
    assert_eq!(chain.pairs(&report.factory.address).len(), 5);
    assert_eq!(
        report
            .issues
            .iter()
            .filter(|issue| issue.step == DeployStep::VerifyPairs)
            .count(),
        0
    );

    Ok(())
}
