//! EIP-1559 fee recommendation.

/// Fee parameters for a dynamic-fee transaction, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Priority fee (tip) per gas.
    pub max_priority_fee_per_gas: u128,
    /// Fee cap per gas.
    pub max_fee_per_gas: u128,
}

/// Recommend fee caps from the suggested tip and the latest base fee.
///
/// The cap is `base_fee + 2 * tip`, leaving headroom for base-fee growth
/// between quoting and inclusion.
pub fn recommend(base_fee: u128, tip: u128) -> FeeQuote {
    FeeQuote {
        max_priority_fee_per_gas: tip,
        max_fee_per_gas: base_fee.saturating_add(tip.saturating_mul(2)),
    }
}
