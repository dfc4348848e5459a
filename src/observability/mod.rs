//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters and histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON in production)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging via tracing; JSON format for machine parsing
//! - Request ID flows through all subsystems
//! - Metric updates are cheap (atomic increments), safe on hot paths

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::init_metrics;
