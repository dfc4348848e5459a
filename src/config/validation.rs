//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (scanner tracks registered contracts)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use alloy::primitives::Address;

use crate::config::schema::RelayConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.store.backend.as_str() {
        "memory" | "redis" => {}
        other => errors.push(ValidationError::new(
            "store.backend",
            format!("unknown backend {other:?}, expected \"memory\" or \"redis\""),
        )),
    }
    if config.store.backend == "redis" && config.store.redis_url.is_empty() {
        errors.push(ValidationError::new(
            "store.redis_url",
            "required for the redis backend",
        ));
    }

    if config.ledger.rpc_url.is_empty() {
        errors.push(ValidationError::new("ledger.rpc_url", "must not be empty"));
    }
    if config.ledger.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "ledger.rpc_timeout_secs",
            "must be greater than zero",
        ));
    }

    if config.router.workers == 0 {
        errors.push(ValidationError::new(
            "router.workers",
            "must be greater than zero",
        ));
    }
    if config.router.queue_depth == 0 {
        errors.push(ValidationError::new(
            "router.queue_depth",
            "must be greater than zero",
        ));
    }

    if config.scanner.interval_ms == 0 {
        errors.push(ValidationError::new(
            "scanner.interval_ms",
            "must be greater than zero",
        ));
    }
    if config.scanner.batch_blocks == 0 {
        errors.push(ValidationError::new(
            "scanner.batch_blocks",
            "must be greater than zero",
        ));
    }

    if config.nonce.lock_ttl_ms == 0 {
        errors.push(ValidationError::new(
            "nonce.lock_ttl_ms",
            "must be greater than zero",
        ));
    }
    if config.nonce.acquire_timeout_ms == 0 {
        errors.push(ValidationError::new(
            "nonce.acquire_timeout_ms",
            "must be greater than zero",
        ));
    }

    if config.submit.max_attempts == 0 {
        errors.push(ValidationError::new(
            "submit.max_attempts",
            "must be greater than zero",
        ));
    }

    if config.idempotency.ttl_secs == 0 {
        errors.push(ValidationError::new(
            "idempotency.ttl_secs",
            "must be greater than zero",
        ));
    }

    if config.http.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "http.bind_address",
            format!("{:?} is not a socket address", config.http.bind_address),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "{:?} is not a socket address",
                config.observability.metrics_address
            ),
        ));
    }

    let mut names: HashSet<&str> = HashSet::new();
    for (index, contract) in config.contracts.iter().enumerate() {
        let field = format!("contracts[{index}]");
        if contract.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(contract.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate contract name {:?}", contract.name),
            ));
        }
        if contract.address.parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                &format!("{field}.address"),
                format!("{:?} is not an address", contract.address),
            ));
        }
        if contract.abi_path.is_empty() {
            errors.push(ValidationError::new(
                &format!("{field}.abi_path"),
                "must not be empty",
            ));
        }
    }

    for tracked in &config.scanner.contracts {
        if !names.contains(tracked.as_str()) {
            errors.push(ValidationError::new(
                "scanner.contracts",
                format!("{tracked:?} is not a configured contract"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
