//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::RelayConfig;
pub use schema::ContractConfig;
pub use schema::HttpConfig;
pub use schema::IdempotencyConfig;
pub use schema::LedgerConfig;
pub use schema::NonceConfig;
pub use schema::ObservabilityConfig;
pub use schema::RouterConfig;
pub use schema::ScannerConfig;
pub use schema::StoreConfig;
pub use schema::SubmitConfig;
pub use validation::{validate_config, ValidationError};
