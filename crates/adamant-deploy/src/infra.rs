//! This module contains utilities for reading and writing the deployment's
//! address artifacts, either on disk or from an artifacts server.
use std::{
    fs::{create_dir_all, File},
    path::Path,
    time::Duration,
};

use adamant_addresses::Addresses;
use eyre::{eyre, Result, WrapErr};
use tokio::time::sleep;
use tracing::{info, warn};

const ARTIFACTS_ATTEMPTS: usize = 5;
const ARTIFACTS_RETRY_TIME: Duration = Duration::from_millis(500);

pub fn write_addresses(path: &Path, addresses: &Addresses) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let f = File::create(path).wrap_err_with(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(f, addresses)?;
    info!(path = %path.display(), "wrote addresses");
    Ok(())
}

pub fn read_addresses(path: &Path) -> Result<Addresses> {
    let f = File::open(path).wrap_err_with(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(f).wrap_err_with(|| format!("failed to parse {}", path.display()))
}

/// Fetches the addresses of a previous deployment from an artifacts server.
/// The server may not have them yet, so unavailable or unparseable answers
/// are retried a few times before giving up.
pub async fn query_addresses(artifacts_url: &str) -> Result<Addresses> {
    let mut last_error = eyre!("no attempt was made");
    for attempt in 1..=ARTIFACTS_ATTEMPTS {
        match fetch_addresses(artifacts_url).await {
            Ok(addresses) => {
                info!(url = artifacts_url, attempt, "fetched addresses");
                return Ok(addresses);
            }
            Err(e) => {
                warn!(url = artifacts_url, attempt, error = %e, "addresses not available");
                last_error = e;
            }
        }
        if attempt < ARTIFACTS_ATTEMPTS {
            sleep(ARTIFACTS_RETRY_TIME).await;
        }
    }
    Err(last_error.wrap_err(format!(
        "couldn't get addresses from {} after {} attempts",
        artifacts_url, ARTIFACTS_ATTEMPTS
    )))
}

async fn fetch_addresses(artifacts_url: &str) -> Result<Addresses> {
    let response = reqwest::get(artifacts_url).await?.error_for_status()?;
    Ok(response.json::<Addresses>().await?)
}
