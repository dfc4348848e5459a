//! Contract metadata registry.
//!
//! # Responsibilities
//! - Map logical contract names to their interface and deployed address
//! - Serve concurrent lookups from the event router and the block scanner
//!
//! # Design Decisions
//! - Explicit object injected by `Arc`, never a process-wide static
//! - Registration happens at startup and overwrites by name; lookups are
//!   frequent, so a `RwLock` over a plain map fits the write-once pattern

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use alloy::primitives::Address;
use alloy_json_abi::JsonAbi;
use thiserror::Error;

/// Errors raised by registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No contract registered under that name.
    #[error("contract not registered: {0}")]
    NotRegistered(String),
}

/// Full description of one registered contract.
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    /// Logical name used in routes and cursor keys.
    pub name: String,
    /// Parsed interface description.
    pub abi: JsonAbi,
    /// Deployed address.
    pub address: Address,
}

/// Name-keyed registry of contract descriptors.
#[derive(Default)]
pub struct ContractRegistry {
    contracts: RwLock<HashMap<String, Arc<ContractDescriptor>>>,
}

impl ContractRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract, replacing any existing entry with the same name.
    pub fn register(&self, name: &str, abi: JsonAbi, address: Address) {
        let descriptor = Arc::new(ContractDescriptor {
            name: name.to_string(),
            abi,
            address,
        });
        let mut contracts = self
            .contracts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if contracts.insert(name.to_string(), descriptor).is_some() {
            tracing::warn!(contract = %name, "Replacing registered contract");
        }
    }

    /// Look up a contract by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<ContractDescriptor>, RegistryError> {
        let contracts = self
            .contracts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        contracts
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    /// Addresses of all registered contracts, for range log queries.
    pub fn watched_addresses(&self) -> Vec<Address> {
        let contracts = self
            .contracts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        contracts.values().map(|c| c.address).collect()
    }

    /// Names of all registered contracts.
    pub fn contract_names(&self) -> Vec<String> {
        let contracts = self
            .contracts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        contracts.keys().cloned().collect()
    }
}

impl std::fmt::Debug for ContractRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractRegistry")
            .field("contracts", &self.contract_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    fn test_abi() -> JsonAbi {
        serde_json::from_str(
            r#"[{"type":"event","name":"Ping","inputs":[],"anonymous":false}]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ContractRegistry::new();
        let addr = address!("00000000000000000000000000000000000000aa");
        registry.register("Token", test_abi(), addr);

        let descriptor = registry.lookup("Token").unwrap();
        assert_eq!(descriptor.name, "Token");
        assert_eq!(descriptor.address, addr);
    }

    #[test]
    fn test_lookup_missing() {
        let registry = ContractRegistry::new();
        let err = registry.lookup("Nope").unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[test]
    fn test_register_overwrites() {
        let registry = ContractRegistry::new();
        let first = address!("00000000000000000000000000000000000000aa");
        let second = address!("00000000000000000000000000000000000000bb");

        registry.register("Token", test_abi(), first);
        registry.register("Token", test_abi(), second);

        assert_eq!(registry.lookup("Token").unwrap().address, second);
        assert_eq!(registry.watched_addresses(), vec![second]);
    }
}
