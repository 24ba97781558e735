use std::sync::Arc;

use adamant_deploy::{chain::MockChain, config::DeployConfig, deploy::Deployer, logging};
use eyre::Result;

#[tokio::main]
async fn main() -> Result<()> {
    logging::initialize("info");

    // Run a full deployment against an in-memory chain.
    let chain = Arc::new(MockChain::new());
    let report = Deployer::new(DeployConfig::default(), chain.clone())?
        .run()
        .await?;

    println!("{}", serde_json::to_string_pretty(&report.addresses())?);
    println!(
        "{} broadcasts, {} queries, {} issues",
        chain.broadcasts().len(),
        chain.queries().len(),
        report.issues.len()
    );

    Ok(())
}
