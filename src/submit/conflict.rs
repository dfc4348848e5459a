//! Broadcast error classification.
//!
//! Node implementations disagree on error codes but agree on message
//! text, so classification is substring matching over the lowercased
//! error string.

/// Broadcast failures that mean the local nonce counter has drifted from
/// chain state and a resync plus retry can succeed.
const SEQUENCE_CONFLICT_MARKERS: [&str; 5] = [
    "nonce too low",
    "nonce too high",
    "replacement transaction underpriced",
    "already known",
    "transaction underpriced",
];

/// Broadcast failures that mean the transaction (or a competitor with the
/// same nonce) is already in the mempool, so the reserved nonce is spent.
const ENTERED_MEMPOOL_MARKERS: [&str; 4] = [
    "already known",
    "nonce too low",
    "replacement transaction underpriced",
    "known transaction",
];

/// Whether a broadcast error is a recoverable sequence conflict.
pub fn is_sequence_conflict(message: &str) -> bool {
    let message = message.to_lowercase();
    SEQUENCE_CONFLICT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Whether a broadcast error implies the nonce was consumed anyway.
///
/// Callers use this to decide against returning a reservation: reverting
/// a nonce that is live in the mempool would hand the same nonce out
/// twice.
pub fn entered_mempool(message: &str) -> bool {
    let message = message.to_lowercase();
    ENTERED_MEMPOOL_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
