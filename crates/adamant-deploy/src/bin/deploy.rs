use std::sync::Arc;

use adamant_deploy::{
    chain::SecretCli, config::DeployConfig, deploy::Deployer, infra::write_addresses, logging,
};
use eyre::Result;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    logging::initialize("info");

    // Read the configuration from the environment and connect to the node
    // with the deployer's key.
    let config = DeployConfig::from_env()?;
    let connection = Arc::new(SecretCli::connect(&config).await?);

    // Deploy the factory and its pairs.
    let deployer = Deployer::new(config.clone(), connection)?;
    let report = deployer.run().await?;
    for issue in &report.issues {
        warn!(%issue, "verification issue");
    }

    // Write the deployment's addresses to a file.
    write_addresses(&config.artifacts_path, &report.addresses())?;

    Ok(())
}
