//! Threshold decryption client.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use segvault_core::{now_millis, Kek};

use crate::encrypt::{KeyServerId, ReencryptedShare, SealedObject};
use crate::error::{Result, SealError};
use crate::policy::ApprovalProof;
use crate::server::{KeyServer, ShareRequest};
use crate::session_key::SealSessionKey;
use crate::shamir::Share;

/// Retry and timeout policy for key server calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    /// Per-attempt timeout.
    pub request_timeout_ms: u64,
    /// Attempts after the first, for retryable failures only.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for SealConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            max_retries: 2,
            backoff_base_ms: 100,
            backoff_max_ms: 2_000,
        }
    }
}

impl SealConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(
            self.backoff_base_ms
                .saturating_mul(factor)
                .min(self.backoff_max_ms),
        )
    }
}

/// Gathers shares from key servers until the threshold is met.
pub struct SealClient {
    servers: HashMap<KeyServerId, Arc<dyn KeyServer>>,
    config: SealConfig,
}

impl SealClient {
    pub fn new(config: SealConfig) -> Self {
        Self {
            servers: HashMap::new(),
            config,
        }
    }

    pub fn with_server(mut self, server: Arc<dyn KeyServer>) -> Self {
        self.servers.insert(server.id().clone(), server);
        self
    }

    pub fn config(&self) -> &SealConfig {
        &self.config
    }

    /// Recover the content key of `sealed`.
    pub async fn fetch_content_key(
        &self,
        sealed: &SealedObject,
        session_key: &SealSessionKey,
        proof: &ApprovalProof,
    ) -> Result<Kek> {
        if session_key.is_expired(now_millis()) {
            return Err(SealError::SessionKeyExpired);
        }
        let need = sealed.threshold as usize;

        let mut tasks = JoinSet::new();
        for share in &sealed.shares {
            let Some(server) = self.servers.get(&share.server_id) else {
                debug!(server = %share.server_id, "no client for key server, skipping");
                continue;
            };
            let request = ShareRequest {
                package_id: sealed.package_id,
                identity: sealed.identity.clone(),
                share: share.clone(),
                certificate: session_key.certificate().clone(),
                proof: proof.clone(),
            };
            tasks.spawn(fetch_with_retry(
                server.clone(),
                request,
                self.config.clone(),
            ));
        }

        let mut shares: Vec<Share> = Vec::with_capacity(need);
        let mut denial: Option<SealError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| SealError::ServerUnavailable(format!("share task failed: {e}")))
                .and_then(|r| r);
            match outcome {
                Ok(reencrypted) => {
                    match reencrypted.open(
                        session_key.ephemeral(),
                        &sealed.package_id,
                        &sealed.identity,
                    ) {
                        Ok(share) => shares.push(share),
                        Err(e) => {
                            warn!(
                                server = %reencrypted.server_id,
                                error = %e,
                                "discarding undecryptable share"
                            );
                        }
                    }
                    if shares.len() >= need {
                        tasks.abort_all();
                        break;
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "key server gave up");
                }
                Err(e) => {
                    info!(error = %e, "key server refused share");
                    denial.get_or_insert(e);
                }
            }
        }

        if shares.len() < need {
            return Err(denial.unwrap_or(SealError::ThresholdUnavailable {
                got: shares.len(),
                need,
            }));
        }
        sealed.combine(&shares)
    }

    /// Recover the content key and decrypt.
    pub async fn decrypt(
        &self,
        sealed: &SealedObject,
        session_key: &SealSessionKey,
        proof: &ApprovalProof,
    ) -> Result<Vec<u8>> {
        let key = self.fetch_content_key(sealed, session_key, proof).await?;
        sealed.open(&key)
    }
}

async fn fetch_with_retry(
    server: Arc<dyn KeyServer>,
    request: ShareRequest,
    config: SealConfig,
) -> Result<ReencryptedShare> {
    let timeout = Duration::from_millis(config.request_timeout_ms);
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(timeout, server.fetch_share(&request)).await {
            Ok(result) => result,
            Err(_) => Err(SealError::Timeout),
        };
        match result {
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = config.backoff(attempt);
                warn!(
                    server = %server.id(),
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying key server"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
