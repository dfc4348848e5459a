//! API handlers.
//!
//! # Endpoints
//! - `POST /v1/transfer`: native-value transfer through the submission
//!   pipeline (idempotency-guarded)
//! - `GET /healthz`: ledger/store reachability probe

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::error::ApiError;
use crate::http::server::AppState;

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Recipient address, 0x-prefixed hex.
    pub to: String,
    /// Amount in ether as a decimal string, e.g. "0.25".
    pub amount: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub tx_hash: TxHash,
}

/// Submit a native-value transfer.
pub async fn transfer(
    State(state): State<AppState>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, ApiError> {
    let to: Address = request
        .to
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid recipient address: {}", request.to)))?;
    let wei = parse_eth_to_wei(&request.amount)
        .map_err(|reason| ApiError::bad_request(format!("invalid amount: {reason}")))?;

    tracing::info!(to = %to, amount_eth = %request.amount, wei = %wei, "Transfer requested");

    let result = state
        .submitter
        .send_tx(move |_auth| {
            Ok(TransactionRequest::default()
                .with_to(to)
                .with_value(wei))
        })
        .await;

    match result {
        Ok(tx_hash) => Ok(Json(TransferResponse { tx_hash })),
        Err(error) => {
            tracing::error!(to = %to, error = %error, "Transfer failed");
            // Hand the reserved nonce back unless the transaction may
            // already occupy it in the mempool
            if error.nonce_returnable() {
                let sender = state.submitter.sender();
                if let Err(revert_error) = state.submitter.nonces().revert(sender).await {
                    tracing::warn!(
                        sender = %sender,
                        error = %revert_error,
                        "Failed to return nonce reservation"
                    );
                }
            }
            Err(ApiError::from_submit(&error))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ledger: bool,
    pub store: bool,
    pub chain_id: u64,
    pub version: &'static str,
}

/// Health probe reporting ledger and store reachability.
pub async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let ledger = state.ledger.block_number().await.is_ok();
    let store = state.store.get("healthz").await.is_ok();

    Json(HealthResponse {
        status: if ledger && store { "ok" } else { "degraded" },
        ledger,
        store,
        chain_id: state.chain_id,
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Parse a decimal ether amount into wei.
///
/// Pure integer arithmetic: the string is split on the decimal point and
/// the fraction is right-padded (or truncated) to 18 digits, so no value
/// ever passes through a float.
fn parse_eth_to_wei(input: &str) -> Result<U256, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty amount".to_string());
    }

    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    // Either side of the point may be empty ("1.", ".5"), but not both
    if whole.is_empty() && fraction.is_empty() {
        return Err(format!("malformed amount {input:?}"));
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("malformed amount {input:?}"));
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("malformed amount {input:?}"));
    }

    // Right-pad to 18 digits; anything beyond wei precision is dropped
    let mut fraction_wei = String::with_capacity(18);
    fraction_wei.push_str(&fraction[..fraction.len().min(18)]);
    while fraction_wei.len() < 18 {
        fraction_wei.push('0');
    }

    let whole: U256 = if whole.is_empty() {
        U256::ZERO
    } else {
        whole
            .parse()
            .map_err(|_| format!("malformed amount {input:?}"))?
    };
    let fraction: U256 = fraction_wei
        .parse()
        .map_err(|_| format!("malformed amount {input:?}"))?;

    whole
        .checked_mul(U256::from(10u64).pow(U256::from(18u64)))
        .and_then(|wei| wei.checked_add(fraction))
        .ok_or_else(|| format!("amount out of range: {input:?}"))
}
