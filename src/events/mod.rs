//! Event ingestion subsystem.
//!
//! # Data Flow
//! ```text
//! Contract ABIs (registry)
//!     → decode.rs (per-event decoders, built at registration)
//!     → route.rs (handler chains + shared (address, topic0) table)
//!     → router.rs (live subscriptions → bounded dispatch pool)
//!     → scanner.rs (confirmed catch-up over the same routes)
//!     → store.rs (scan cursors + handled-event markers)
//! ```
//!
//! # Delivery Guarantees
//! - Both paths share one handled-marker namespace, so a log delivered
//!   live and re-fetched by the scanner runs its handlers once
//! - The scanner trails the head by the confirmation depth and re-scans
//!   a reorg window behind its cursor
//! - Handler errors are contained per event; they never stop a
//!   subscription or abort a scan cycle

pub mod context;
pub mod decode;
pub mod middleware;
pub mod route;
pub mod router;
pub mod scanner;
pub mod store;

pub use context::{handler_fn, EventContext, EventHandler, HandlerError, HandlerResult, Middleware};
pub use decode::{DecodeError, DecodedEvent, EventDecoder};
pub use route::{BoundRoute, Route, RouteError, RouteTable};
pub use router::{EventRouter, RouterDriver};
pub use scanner::{BlockScanner, ScanError};
pub use store::{CursorStore, DedupStore};
