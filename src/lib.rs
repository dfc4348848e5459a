//! EVM Transaction Relay and Event Delivery Library

pub mod config;
pub mod events;
pub mod http;
pub mod ledger;
pub mod nonce;
pub mod observability;
pub mod registry;
pub mod resilience;
pub mod store;
pub mod submit;

pub use config::schema::RelayConfig;
pub use http::HttpServer;
pub use submit::Submitter;
