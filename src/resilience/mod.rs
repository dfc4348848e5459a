//! Resilience primitives.
//!
//! # Design Decisions
//! - Retry pacing is exponential with jitter, so submitters that collided
//!   once spread out instead of colliding again on the next attempt

pub mod backoff;

pub use backoff::calculate_backoff;
