use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use adamant_addresses::ContractLink;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, info, warn};

use super::{
    ChainConnection, ChainError, SigningIdentity, TransactionEnvelope, TxMessage, TxOptions,
    TxResponse,
};
use crate::{config::DeployConfig, decode::decode_tx_msg_data};

/// Fragments of `secretcli` errors that mean the node couldn't be reached.
const UNREACHABLE: [&str; 5] = [
    "connection refused",
    "no such host",
    "dial tcp",
    "i/o timeout",
    "failed to connect",
];

enum CliFailure {
    Unreachable(String),
    Failed(String),
}

impl CliFailure {
    fn into_rejection(self) -> ChainError {
        match self {
            CliFailure::Unreachable(reason) => ChainError::Connection(reason),
            CliFailure::Failed(reason) => ChainError::rejected(reason),
        }
    }
}

#[derive(Deserialize)]
struct NodeStatus {
    result: NodeStatusResult,
}

#[derive(Deserialize)]
struct NodeStatusResult {
    node_info: NodeInfo,
}

#[derive(Deserialize)]
struct NodeInfo {
    network: String,
}

/// The output of `secretcli query tx`.
#[derive(Deserialize)]
struct CommittedTx {
    #[serde(flatten)]
    response: TxResponse,
    #[serde(default)]
    data: String,
}

/// A chain connection backed by the `secretcli` binary. Keys live in the
/// binary's keyring, and it takes care of encrypting contract messages and
/// signing transactions.
#[derive(Debug)]
pub struct SecretCli {
    binary: String,
    node: String,
    chain_id: String,
    keyring_backend: String,
    identity: SigningIdentity,
}

impl SecretCli {
    /// Checks that the node is reachable and on the expected chain, imports
    /// the configured mnemonic if there is one and resolves the signing
    /// identity from the keyring.
    pub async fn connect(config: &DeployConfig) -> Result<Self, ChainError> {
        let status_url = format!("{}/status", config.rpc_url.trim_end_matches('/'));
        let status = reqwest::get(&status_url)
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ChainError::Connection(format!("{}: {}", status_url, e)))?
            .json::<NodeStatus>()
            .await
            .map_err(|e| ChainError::Connection(format!("{}: {}", status_url, e)))?;
        if status.result.node_info.network != config.chain_id {
            return Err(ChainError::Connection(format!(
                "node at {} is on chain {}, expected {}",
                config.rpc_url, status.result.node_info.network, config.chain_id
            )));
        }
        info!(rpc_url = %config.rpc_url, chain_id = %config.chain_id, "connected to node");

        let mut cli = Self {
            binary: config.secretcli.clone(),
            node: config.rpc_url.clone(),
            chain_id: config.chain_id.clone(),
            keyring_backend: config.keyring_backend.clone(),
            identity: SigningIdentity {
                key_name: config.key_name.clone(),
                address: String::new(),
            },
        };
        if let Some(mnemonic) = &config.mnemonic {
            cli.import_key(mnemonic.expose()).await?;
        }
        cli.identity.address = cli.key_address().await?.ok_or_else(|| {
            ChainError::Connection(format!(
                "key {:?} is not in the {} keyring",
                config.key_name, config.keyring_backend
            ))
        })?;
        info!(address = %cli.identity.address, "loaded signing identity");

        Ok(cli)
    }

    async fn exec(&self, args: &[String], stdin: Option<&str>) -> Result<String, CliFailure> {
        debug!(binary = %self.binary, args = ?args.first().zip(args.get(1)), "running");
        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CliFailure::Unreachable(format!("failed to run {}: {}", self.binary, e)))?;
        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| CliFailure::Failed(e.to_string()))?;
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CliFailure::Failed(e.to_string()))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let lowercase = stderr.to_lowercase();
        if UNREACHABLE.iter().any(|fragment| lowercase.contains(fragment)) {
            Err(CliFailure::Unreachable(stderr))
        } else {
            Err(CliFailure::Failed(stderr))
        }
    }

    fn keyring_args(&self) -> Vec<String> {
        vec!["--keyring-backend".into(), self.keyring_backend.clone()]
    }

    fn node_args(&self) -> Vec<String> {
        vec![
            "--chain-id".into(),
            self.chain_id.clone(),
            "--node".into(),
            self.node.clone(),
        ]
    }

    async fn key_address(&self) -> Result<Option<String>, ChainError> {
        let mut args: Vec<String> = vec![
            "keys".into(),
            "show".into(),
            self.identity.key_name.clone(),
            "--address".into(),
        ];
        args.extend(self.keyring_args());
        match self.exec(&args, None).await {
            Ok(address) => Ok(Some(address.trim().to_string())),
            Err(CliFailure::Failed(_)) => Ok(None),
            Err(CliFailure::Unreachable(reason)) => Err(ChainError::Connection(reason)),
        }
    }

    async fn import_key(&self, mnemonic: &str) -> Result<(), ChainError> {
        // Recovering over an existing key prompts for confirmation.
        if self.key_address().await?.is_some() {
            warn!(key = %self.identity.key_name, "key already exists, not importing the mnemonic");
            return Ok(());
        }
        let mut args: Vec<String> = vec![
            "keys".into(),
            "add".into(),
            self.identity.key_name.clone(),
            "--recover".into(),
        ];
        args.extend(self.keyring_args());
        self.exec(&args, Some(&format!("{}\n", mnemonic)))
            .await
            .map_err(|failure| match failure {
                CliFailure::Unreachable(reason) | CliFailure::Failed(reason) => {
                    ChainError::Connection(format!("failed to import the mnemonic: {}", reason))
                }
            })?;
        info!(key = %self.identity.key_name, "imported mnemonic");
        Ok(())
    }

    fn message_args(&self, message: &TxMessage) -> Vec<String> {
        let mut args: Vec<String> = match message {
            TxMessage::Instantiate(request) => {
                let mut args: Vec<String> = vec![
                    "tx".into(),
                    "compute".into(),
                    "instantiate".into(),
                    request.contract.code_id.to_string(),
                    request.init_msg.to_string(),
                    "--label".into(),
                    request.label.clone(),
                    "--code-hash".into(),
                    request.contract.code_hash.clone(),
                ];
                if let Some(admin) = &request.admin {
                    args.extend(["--admin".into(), admin.clone()]);
                }
                args
            }
            TxMessage::Execute(request) => vec![
                "tx".into(),
                "compute".into(),
                "execute".into(),
                request.contract_address.clone(),
                request.msg.to_string(),
                "--code-hash".into(),
                request.code_hash.clone(),
            ],
        };
        args.extend([
            "--from".into(),
            self.identity.key_name.clone(),
            "--generate-only".into(),
            "--output".into(),
            "json".into(),
        ]);
        args.extend(self.node_args());
        args.extend(self.keyring_args());
        args
    }

    async fn sign_and_broadcast(
        &self,
        unsigned: &Path,
        signed: &Path,
    ) -> Result<TxResponse, ChainError> {
        let mut args: Vec<String> = vec![
            "tx".into(),
            "sign".into(),
            unsigned.display().to_string(),
            "--from".into(),
            self.identity.key_name.clone(),
            "--output-document".into(),
            signed.display().to_string(),
        ];
        args.extend(self.node_args());
        args.extend(self.keyring_args());
        self.exec(&args, None)
            .await
            .map_err(CliFailure::into_rejection)?;

        let mut args: Vec<String> = vec![
            "tx".into(),
            "broadcast".into(),
            signed.display().to_string(),
            "--broadcast-mode".into(),
            "sync".into(),
            "--output".into(),
            "json".into(),
        ];
        args.extend(self.node_args());
        let output = self
            .exec(&args, None)
            .await
            .map_err(CliFailure::into_rejection)?;
        serde_json::from_str(&output).map_err(|e| ChainError::decode("TxResponse", e))
    }
}

/// Combines the unsigned single-message transactions `secretcli` generated
/// into one transaction and sets its fee.
fn merge_unsigned(txs: Vec<Value>, options: &TxOptions) -> Result<Value, ChainError> {
    let mut messages = vec![];
    for tx in &txs {
        match tx.pointer("/body/messages").and_then(Value::as_array) {
            Some(body) if !body.is_empty() => messages.extend(body.iter().cloned()),
            _ => {
                return Err(ChainError::rejected(
                    "secretcli generated a transaction without messages",
                ))
            }
        }
    }
    let mut tx = txs
        .into_iter()
        .next()
        .ok_or_else(|| ChainError::rejected("refusing to broadcast an empty transaction"))?;
    if let Some(body) = tx.get_mut("body").and_then(Value::as_object_mut) {
        body.insert("messages".to_string(), Value::Array(messages));
    }
    let fee = tx
        .pointer_mut("/auth_info/fee")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| ChainError::rejected("secretcli generated a transaction without a fee"))?;
    fee.insert("gas_limit".to_string(), json!(options.gas_limit.to_string()));
    fee.insert(
        "amount".to_string(),
        json!([{
            "denom": options.fee_denom,
            "amount": options.fee_amount().to_string(),
        }]),
    );
    Ok(tx)
}

fn parse_committed(output: &str) -> Result<TxResponse, ChainError> {
    let committed: CommittedTx =
        serde_json::from_str(output).map_err(|e| ChainError::decode("TxResponse", e))?;
    let mut response = committed.response;
    if response.code == 0 && !committed.data.is_empty() {
        let data = hex::decode(&committed.data).map_err(|e| ChainError::decode("TxMsgData", e))?;
        response.responses = decode_tx_msg_data(&data)?;
    }
    Ok(response)
}

fn scratch_file(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "adamant-{}-{:08x}-{}.json",
        std::process::id(),
        rand::random::<u32>(),
        label
    ))
}

#[async_trait]
impl ChainConnection for SecretCli {
    fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    fn chain_id(&self) -> &str {
        &self.chain_id
    }

    async fn submit(&self, envelope: &TransactionEnvelope) -> Result<TxResponse, ChainError> {
        // Generate every message on its own so that secretcli encrypts it,
        // then sign them as one transaction.
        let mut unsigned = vec![];
        for message in &envelope.messages {
            let output = self
                .exec(&self.message_args(message), None)
                .await
                .map_err(CliFailure::into_rejection)?;
            unsigned.push(
                serde_json::from_str::<Value>(&output)
                    .map_err(|e| ChainError::decode("Tx", e))?,
            );
        }
        let tx = merge_unsigned(unsigned, &envelope.options)?;

        let (unsigned_path, signed_path) = (scratch_file("unsigned"), scratch_file("signed"));
        tokio::fs::write(&unsigned_path, tx.to_string())
            .await
            .map_err(|e| ChainError::rejected(format!("failed to write the transaction: {}", e)))?;
        let response = self.sign_and_broadcast(&unsigned_path, &signed_path).await;
        let _ = tokio::fs::remove_file(&unsigned_path).await;
        let _ = tokio::fs::remove_file(&signed_path).await;
        response
    }

    async fn committed(&self, txhash: &str) -> Result<Option<TxResponse>, ChainError> {
        let mut args: Vec<String> = vec![
            "query".into(),
            "tx".into(),
            txhash.to_string(),
            "--output".into(),
            "json".into(),
        ];
        args.extend(self.node_args());
        match self.exec(&args, None).await {
            Ok(output) => parse_committed(&output).map(Some),
            Err(CliFailure::Failed(reason)) if reason.contains("not found") => Ok(None),
            Err(CliFailure::Failed(reason)) | Err(CliFailure::Unreachable(reason)) => {
                Err(ChainError::Connection(format!(
                    "failed to look up transaction {}: {}",
                    txhash, reason
                )))
            }
        }
    }

    async fn query(&self, contract: &ContractLink, query: &Value) -> Result<Value, ChainError> {
        let args: Vec<String> = vec![
            "query".into(),
            "compute".into(),
            "query".into(),
            contract.address.clone(),
            query.to_string(),
            "--code-hash".into(),
            contract.code_hash.clone(),
            "--node".into(),
            self.node.clone(),
            "--output".into(),
            "json".into(),
        ];
        let output = self
            .exec(&args, None)
            .await
            .map_err(|failure| match failure {
                CliFailure::Unreachable(reason) | CliFailure::Failed(reason) => {
                    ChainError::query(&contract.address, reason)
                }
            })?;
        serde_json::from_str(&output).map_err(|e| ChainError::query(&contract.address, e))
    }
}
