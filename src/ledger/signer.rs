//! Signing key management.
//!
//! # Security
//! - Private keys are loaded ONLY from environment variables
//! - Keys are never logged or serialized

use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;

/// Environment variable name for the private key.
pub const SIGNER_KEY_ENV_VAR: &str = "RELAY_SIGNER_PRIVATE_KEY";

/// Errors raised while loading the signing key.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The key environment variable is not set.
    #[error("environment variable {0} not set")]
    MissingKey(&'static str),

    /// The key is not a valid 32-byte hex string.
    #[error("invalid private key format: {0}")]
    InvalidKey(String),
}

/// Local transaction signer for one address.
#[derive(Clone)]
pub struct TxSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl TxSigner {
    /// Create a signer from a hex-encoded private key (with or without the
    /// 0x prefix). The key is never logged.
    pub fn from_private_key(private_key_hex: &str, chain_id: u64) -> Result<Self, SignerError> {
        let trimmed = private_key_hex.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| SignerError::InvalidKey(format!("{}", e)))?;

        tracing::info!(
            address = %signer.address(),
            chain_id = chain_id,
            "Signer initialized"
        );

        Ok(Self { signer, chain_id })
    }

    /// Load the signer from `RELAY_SIGNER_PRIVATE_KEY`.
    pub fn from_env(chain_id: u64) -> Result<Self, SignerError> {
        let private_key = std::env::var(SIGNER_KEY_ENV_VAR)
            .map_err(|_| SignerError::MissingKey(SIGNER_KEY_ENV_VAR))?;
        Self::from_private_key(&private_key, chain_id)
    }

    /// The signing address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Chain ID transactions are signed for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Wallet handle for `TransactionBuilder::build`.
    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSigner")
            .field("address", &self.signer.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}
