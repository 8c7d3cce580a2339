//! Settlement boundary: deposit submission and relay requests
//!
//! The chain and the relayer sit behind [`RelaySettlement`]. The CLI ships a
//! file-backed outbox implementation; anything that can carry the JSON
//! payloads (an RPC client, a relayer HTTP client) can implement the trait.
//!
//! Calls are retried with exponential backoff. Once a deposit has landed, a
//! relay failure never loses funds: the note is on disk, so the error tells
//! the user to retry settlement rather than to start over.
//!
//! A relay submission carries the ephemeral public key next to the request.
//! The relayer publishes it with the withdrawal as the announcement the
//! recipient scans for.

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stealth_core::{DepositCalldata, Felt, PublicPoint, RelayRequest};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::write_private;

/// Upper bound for a single backoff delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SettlementError {
    /// Transient failure after the deposit is already safe on-chain
    #[error("deposit {commitment} is safe; retry settlement ({reason})")]
    Unavailable { commitment: String, reason: String },

    /// The counterparty refused the request; retrying will not help
    #[error("settlement rejected: {reason}")]
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(250),
        }
    }
}

/// Run `op` until it succeeds, doubling the delay between attempts.
///
/// [`SettlementError::Rejected`] is returned immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut delay = policy.base_delay;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= policy.attempts || is_permanent(&err) => return Err(err),
            Err(err) => {
                warn!(label, attempt, error = %err, ?delay, "call failed; retrying");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_RETRY_DELAY);
                attempt += 1;
            }
        }
    }
}

fn is_permanent(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SettlementError>(),
        Some(SettlementError::Rejected { .. })
    )
}

/// What the relayer receives: the request plus the announcement key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySubmission {
    #[serde(flatten)]
    pub request: RelayRequest,
    pub ephemeral_pub_key: PublicPoint,
}

/// Chain and relayer collaborator
#[allow(async_fn_in_trait)]
pub trait RelaySettlement {
    /// Submit the deposit; returns the transaction hash
    async fn submit_deposit(&self, calldata: &DepositCalldata) -> anyhow::Result<String>;

    /// Hand a relay request to the relayer; returns a receipt reference
    async fn submit_relay(&self, submission: &RelaySubmission) -> anyhow::Result<String>;
}

/// Submit a deposit with retries
pub async fn submit_deposit<S: RelaySettlement>(
    settlement: &S,
    policy: &RetryPolicy,
    calldata: &DepositCalldata,
) -> anyhow::Result<String> {
    with_retry(policy, "deposit", move || settlement.submit_deposit(calldata)).await
}

/// Submit a relay request with retries.
///
/// Any failure other than an explicit rejection comes back as
/// [`SettlementError::Unavailable`] naming the commitment.
pub async fn settle<S: RelaySettlement>(
    settlement: &S,
    policy: &RetryPolicy,
    submission: &RelaySubmission,
) -> Result<String, SettlementError> {
    let commitment = submission.request.commitment;
    with_retry(policy, "relay", move || settlement.submit_relay(submission))
        .await
        .map_err(|err| match err.downcast::<SettlementError>() {
            Ok(SettlementError::Rejected { reason }) => SettlementError::Rejected { reason },
            Ok(SettlementError::Unavailable { reason, .. }) => SettlementError::Unavailable {
                commitment: commitment.to_hex(),
                reason,
            },
            Err(other) => SettlementError::Unavailable {
                commitment: commitment.to_hex(),
                reason: format!("{:#}", other),
            },
        })
}

/// Writes deposits and relay requests as JSON files into a directory that a
/// separate submitter picks up.
pub struct FileOutbox {
    dir: PathBuf,
}

impl FileOutbox {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn deposit_path(&self, commitment: &Felt) -> PathBuf {
        self.dir.join(format!("deposit-{}.json", commitment.to_hex()))
    }

    fn relay_path(&self, nullifier_hash: &Felt) -> PathBuf {
        self.dir.join(format!("relay-{}.json", nullifier_hash.to_hex()))
    }
}

impl RelaySettlement for FileOutbox {
    async fn submit_deposit(&self, calldata: &DepositCalldata) -> anyhow::Result<String> {
        let path = self.deposit_path(&calldata.commitment);
        let json = serde_json::to_string_pretty(calldata)?;
        write_private(&path, json.as_bytes()).context("Failed to write deposit to outbox")?;

        info!(commitment = %calldata.commitment, "deposit queued in outbox");
        Ok(format!("outbox:{}", path.display()))
    }

    async fn submit_relay(&self, submission: &RelaySubmission) -> anyhow::Result<String> {
        let nullifier_hash = submission.request.nullifier_hash;
        let path = self.relay_path(&nullifier_hash);

        // One request per nullifier: resubmitting the same request is a no-op,
        // a different request for a used nullifier is refused.
        if path.exists() {
            let json = fs::read_to_string(&path).context("Failed to read queued relay request")?;
            let queued: RelaySubmission =
                serde_json::from_str(&json).context("Failed to parse queued relay request")?;
            if queued != *submission {
                return Err(SettlementError::Rejected {
                    reason: format!("nullifier {} already used", nullifier_hash),
                }
                .into());
            }
            return Ok(format!("outbox:{}", path.display()));
        }

        let json = serde_json::to_string_pretty(submission)?;
        write_private(&path, json.as_bytes()).context("Failed to write relay request to outbox")?;

        info!(nullifier_hash = %nullifier_hash, "relay request queued in outbox");
        Ok(format!("outbox:{}", path.display()))
    }
}
