use std::{sync::Arc, time::Duration};

use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use super::{
    ChainConnection, ChainError, Rejection, TransactionEnvelope, TransactionResult, TxMessage,
    TxOptions, TxResponse,
};
use crate::constants::COMMIT_POLL_INTERVAL;

/// Submits envelopes through a connection and turns the chain's answer into
/// a `TransactionResult` or a typed failure.
///
/// Nothing is resubmitted. A state-changing transaction that timed out may
/// still land, so retrying is left to whoever can check the chain first.
pub struct Broadcaster<C: ChainConnection> {
    connection: Arc<C>,
    poll_interval: Duration,
}

impl<C: ChainConnection> Clone for Broadcaster<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<C: ChainConnection> Broadcaster<C> {
    pub fn new(connection: Arc<C>) -> Self {
        Self {
            connection,
            poll_interval: COMMIT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.connection
    }

    pub async fn broadcast(
        &self,
        messages: Vec<TxMessage>,
        options: TxOptions,
    ) -> Result<TransactionResult, ChainError> {
        self.broadcast_envelope(&TransactionEnvelope { messages, options })
            .await
    }

    pub async fn broadcast_envelope(
        &self,
        envelope: &TransactionEnvelope,
    ) -> Result<TransactionResult, ChainError> {
        if envelope.messages.is_empty() {
            return Err(ChainError::rejected("refusing to broadcast an empty transaction"));
        }
        let options = &envelope.options;
        info!(
            messages = envelope.messages.len(),
            gas_limit = options.gas_limit,
            fee = %options.fee(),
            chain_id = self.connection.chain_id(),
            "broadcasting transaction"
        );

        if !options.wait_for_commit {
            let submitted = accepted(self.connection.submit(envelope).await?)?;
            debug!(txhash = %submitted.txhash, "transaction submitted");
            return Ok(TransactionResult {
                txhash: submitted.txhash,
                height: submitted.height,
                gas_used: submitted.gas_used,
                raw_log: submitted.raw_log,
                responses: vec![],
            });
        }

        // Submission and commit share one deadline.
        let deadline = Instant::now() + options.timeout;
        let submitted = timeout_at(deadline, self.connection.submit(envelope))
            .await
            .map_err(|_| ChainError::BroadcastTimeout {
                txhash: None,
                timeout: options.timeout,
            })??;
        let submitted = accepted(submitted)?;
        info!(txhash = %submitted.txhash, "waiting for the transaction to be committed");
        let response = accepted(
            self.wait_for_commit(&submitted.txhash, deadline, options.timeout)
                .await?,
        )?;

        if response.responses.len() != envelope.messages.len() {
            return Err(ChainError::decode(
                "TxMsgData",
                format!(
                    "transaction {} returned {} responses for {} messages",
                    response.txhash,
                    response.responses.len(),
                    envelope.messages.len()
                ),
            ));
        }
        debug!(
            txhash = %response.txhash,
            height = response.height,
            gas_used = response.gas_used,
            "transaction committed"
        );

        Ok(TransactionResult {
            txhash: response.txhash,
            height: response.height,
            gas_used: response.gas_used,
            raw_log: response.raw_log,
            responses: response.responses,
        })
    }

    /// Polls for the commit of a submitted transaction. Failed lookups are
    /// retried until the deadline, and a timeout always names the hash.
    async fn wait_for_commit(
        &self,
        txhash: &str,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<TxResponse, ChainError> {
        let timed_out = || ChainError::BroadcastTimeout {
            txhash: Some(txhash.to_string()),
            timeout,
        };
        loop {
            match timeout_at(deadline, self.connection.committed(txhash)).await {
                Err(_) => return Err(timed_out()),
                Ok(Ok(Some(response))) => return Ok(response),
                Ok(Ok(None)) => debug!(%txhash, "transaction not committed yet"),
                Ok(Err(ChainError::Connection(reason))) => {
                    warn!(%txhash, %reason, "failed to look up transaction")
                }
                Ok(Err(e)) => return Err(e),
            }
            if timeout_at(deadline, sleep(self.poll_interval)).await.is_err() {
                return Err(timed_out());
            }
        }
    }
}

fn accepted(response: TxResponse) -> Result<TxResponse, ChainError> {
    if response.code == 0 {
        return Ok(response);
    }
    Err(ChainError::BroadcastRejected(Rejection {
        txhash: Some(response.txhash),
        code: Some(response.code),
        codespace: response.codespace,
        raw_log: response.raw_log,
    }))
}
