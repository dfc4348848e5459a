//! HTTP API subsystem.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (Axum setup, timeout/limit/request-id/trace layers)
//!     → idempotency.rs (key check, replay or capture)
//!     → handlers.rs (parse, submit through the pipeline)
//!     → error.rs (failures as {"error": ...} with a status)
//! ```

pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod server;

pub use error::ApiError;
pub use idempotency::IDEMPOTENCY_HEADER;
pub use server::{AppState, HttpServer};
