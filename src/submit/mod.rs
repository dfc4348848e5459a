//! Transaction submission pipeline.
//!
//! # Pipeline
//! ```text
//! reserve nonce → quote fees → dry-run build → simulate (revert check)
//!     → estimate gas → rebuild with full authorization → sign
//!     → broadcast → on sequence conflict: resync, back off, retry
//! ```
//!
//! # Design Decisions
//! - The caller's build closure runs twice: once without a gas limit to
//!   materialize the call for simulation and estimation, once with the
//!   estimate filled in for the version that actually gets signed
//! - A failed simulation is surfaced as the decoded revert reason and is
//!   never retried; retrying a deterministic revert only burns nonces
//! - Sequence conflicts are retried a bounded number of times, each after
//!   a counter resync and an exponential backoff, then reported as
//!   `RetriesExhausted`

pub mod conflict;

use std::sync::Arc;
use std::time::Instant;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash};
use alloy::rpc::types::TransactionRequest;
use thiserror::Error;

use crate::config::SubmitConfig;
use crate::ledger::{fees, FeeQuote, Ledger, LedgerError, TxSigner};
use crate::nonce::{NonceError, NonceSequencer};
use crate::observability::metrics;
use crate::resilience::calculate_backoff;

/// Boxed error returned by transaction build closures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors from the submission pipeline.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Nonce(#[from] NonceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The caller's build closure failed.
    #[error("transaction build failed: {0}")]
    Build(String),

    /// Simulation predicts the transaction would revert on chain.
    #[error("simulation reverted: {0}")]
    Reverted(String),

    /// The node rejected the broadcast for a non-sequence reason.
    #[error("broadcast failed: {0}")]
    Broadcast(String),

    /// The node rejected the broadcast because the nonce has drifted.
    #[error("sequence conflict: {0}")]
    SequenceConflict(String),

    /// Every allowed attempt ended in a sequence conflict.
    #[error("gave up after {attempts} attempts; last sequence conflict: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl SubmitError {
    /// Whether the nonce reserved for the failed attempt can safely be
    /// returned to the sequencer.
    ///
    /// False when the transaction may already sit in the mempool or the
    /// counter was resynced during conflict handling; stepping back in
    /// either case would hand the same nonce out twice.
    pub fn nonce_returnable(&self) -> bool {
        match self {
            // Reservation never happened or counter state is unknown
            SubmitError::Nonce(_) => false,
            // Conflict handling already resynced the counter from chain
            SubmitError::SequenceConflict(_) | SubmitError::RetriesExhausted { .. } => false,
            SubmitError::Broadcast(message) => !conflict::entered_mempool(message),
            SubmitError::Build(_) | SubmitError::Ledger(_) | SubmitError::Reverted(_) => true,
        }
    }
}

/// Everything the pipeline has decided about the transaction so far.
///
/// Passed to the build closure so callers can shape the request around
/// the reserved nonce and quoted fees. `gas_limit` is `None` on the
/// dry-run invocation and set on the final one.
#[derive(Debug, Clone)]
pub struct TxAuth {
    pub from: Address,
    pub nonce: u64,
    pub chain_id: u64,
    pub fees: FeeQuote,
    pub gas_limit: Option<u64>,
}

/// Simulate-estimate-sign-broadcast submitter with conflict retry.
pub struct Submitter {
    ledger: Arc<dyn Ledger>,
    nonces: Arc<NonceSequencer>,
    signer: TxSigner,
    config: SubmitConfig,
}

impl Submitter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        nonces: Arc<NonceSequencer>,
        signer: TxSigner,
        config: SubmitConfig,
    ) -> Self {
        Self {
            ledger,
            nonces,
            signer,
            config,
        }
    }

    /// Address transactions are sent from.
    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    /// The nonce sequencer this submitter reserves from.
    pub fn nonces(&self) -> &NonceSequencer {
        &self.nonces
    }

    /// Run the full pipeline for one transaction.
    ///
    /// `build` materializes the call (to, input, value) around the supplied
    /// authorization. Sequence conflicts resync the nonce counter and retry
    /// with backoff, up to the configured attempt limit; every other error
    /// propagates unmodified.
    pub async fn send_tx<F>(&self, mut build: F) -> Result<TxHash, SubmitError>
    where
        F: FnMut(&TxAuth) -> Result<TransactionRequest, BoxError> + Send,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.submit_once(&mut build).await {
                Ok(tx_hash) => {
                    if attempt > 1 {
                        tracing::info!(attempt, tx_hash = %tx_hash, "Broadcast succeeded after conflict retry");
                    }
                    metrics::record_submission(true, started);
                    return Ok(tx_hash);
                }
                Err(SubmitError::SequenceConflict(message)) => {
                    metrics::record_sequence_conflict();
                    tracing::warn!(
                        attempt,
                        error = %message,
                        "Sequence conflict on broadcast; resyncing nonce counter"
                    );
                    self.nonces.force_sync(self.signer.address()).await?;

                    if attempt >= max_attempts {
                        metrics::record_submission(false, started);
                        return Err(SubmitError::RetriesExhausted {
                            attempts: attempt,
                            last: message,
                        });
                    }

                    let delay = calculate_backoff(
                        attempt,
                        self.config.base_delay_ms,
                        self.config.max_delay_ms,
                    );
                    tracing::debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Backing off before resubmitting"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    metrics::record_submission(false, started);
                    return Err(error);
                }
            }
        }
    }

    async fn submit_once<F>(&self, build: &mut F) -> Result<TxHash, SubmitError>
    where
        F: FnMut(&TxAuth) -> Result<TransactionRequest, BoxError> + Send,
    {
        let from = self.signer.address();
        let nonce = self.nonces.next(from).await?;

        let tip = self.ledger.suggested_priority_fee().await?;
        let base_fee = self.ledger.latest_base_fee().await?;
        let quoted = fees::recommend(base_fee, tip);

        let mut auth = TxAuth {
            from,
            nonce,
            chain_id: self.signer.chain_id(),
            fees: quoted,
            gas_limit: None,
        };

        // Dry-run build: materialize the call without a gas limit
        let draft = build(&auth).map_err(|e| SubmitError::Build(e.to_string()))?;

        // Pre-validate against current state. A failure is a revert and is
        // never retried
        let simulation = draft.clone().with_from(from);
        if let Err(error) = self.ledger.call(simulation).await {
            let reason = decode_revert_reason(&error.to_string());
            tracing::warn!(nonce, reason = %reason, "Simulation failed; transaction dropped");
            return Err(SubmitError::Reverted(reason));
        }

        let estimate_request = draft
            .with_from(from)
            .with_max_priority_fee_per_gas(auth.fees.max_priority_fee_per_gas)
            .with_max_fee_per_gas(auth.fees.max_fee_per_gas);
        let gas = self.ledger.estimate_gas(estimate_request).await?;
        auth.gas_limit = Some(gas);

        // Final build with the complete authorization, then sign
        let request = build(&auth).map_err(|e| SubmitError::Build(e.to_string()))?;
        let request = apply_auth(request, &auth);
        let envelope = request
            .build(&self.signer.wallet())
            .await
            .map_err(|e| SubmitError::Build(e.to_string()))?;
        let encoded = envelope.encoded_2718();

        match self.ledger.send_raw_transaction(&encoded).await {
            Ok(tx_hash) => {
                tracing::info!(tx_hash = %tx_hash, nonce, gas, "Transaction broadcast");
                Ok(tx_hash)
            }
            Err(error) => {
                let message = error.to_string();
                if conflict::is_sequence_conflict(&message) {
                    Err(SubmitError::SequenceConflict(message))
                } else {
                    Err(SubmitError::Broadcast(message))
                }
            }
        }
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("sender", &self.signer.address())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Stamp the pipeline's authorization onto a built request.
fn apply_auth(request: TransactionRequest, auth: &TxAuth) -> TransactionRequest {
    let mut request = request
        .with_from(auth.from)
        .with_nonce(auth.nonce)
        .with_chain_id(auth.chain_id)
        .with_max_priority_fee_per_gas(auth.fees.max_priority_fee_per_gas)
        .with_max_fee_per_gas(auth.fees.max_fee_per_gas);
    if let Some(gas) = auth.gas_limit {
        request = request.with_gas_limit(gas);
    }
    request
}

/// Pull a human-readable reason out of a node's revert error text.
fn decode_revert_reason(message: &str) -> String {
    match message.split_once("execution reverted:") {
        Some((_, reason)) if !reason.trim().is_empty() => reason.trim().to_string(),
        _ => "execution reverted".to_string(),
    }
}
