//! Event context handed to handlers by both delivery paths.
//!
//! # Responsibilities
//! - Bundle the raw log, its contract binding, and the decoded payload
//! - Define the handler and middleware contracts shared by the live
//!   subscription router and the catch-up block scanner

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, TxHash, B256};
use alloy::rpc::types::Log;
use futures_util::future::BoxFuture;

use crate::events::decode::DecodedEvent;
use crate::registry::ContractDescriptor;

/// Everything a handler needs to process one matched event.
///
/// The same context shape is produced by live subscriptions and by the
/// block scanner, so handlers never need to know which path delivered
/// the event.
#[derive(Debug)]
pub struct EventContext {
    /// Raw log as returned by the node.
    pub log: Log,
    /// Contract the log was matched against.
    pub contract: Arc<ContractDescriptor>,
    /// Name of the matched event.
    pub event: String,
    /// Decoded arguments, keyed by name in declared order.
    pub decoded: DecodedEvent,
    /// Deadline for handler execution, when the dispatch path enforces one.
    pub deadline: Option<Instant>,
}

impl EventContext {
    /// Contract name the route was registered under.
    pub fn contract_name(&self) -> &str {
        &self.contract.name
    }

    /// Emitting contract address.
    pub fn address(&self) -> Address {
        self.log.address()
    }

    /// Block number the log was included in, if known.
    pub fn block_number(&self) -> Option<u64> {
        self.log.block_number
    }

    /// Hash of the including block, if known.
    pub fn block_hash(&self) -> Option<B256> {
        self.log.block_hash
    }

    /// Hash of the emitting transaction, if known.
    pub fn transaction_hash(&self) -> Option<TxHash> {
        self.log.transaction_hash
    }
}

/// Error type handlers report failures with.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one handler invocation.
pub type HandlerResult = Result<(), HandlerError>;

/// An async event handler.
///
/// Handlers receive the context behind an `Arc` so middleware and multi-step
/// chains can share it without cloning the decoded payload.
pub type EventHandler = Arc<dyn Fn(Arc<EventContext>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wraps a handler to observe or alter its behavior.
///
/// Middleware composes outside-in: the first middleware attached runs
/// outermost around the final handler chain.
pub type Middleware = Arc<dyn Fn(EventHandler) -> EventHandler + Send + Sync>;

/// Lift an async closure into an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Arc<EventContext>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_handler_fn_wraps_async_closure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let handler = handler_fn(move |_ctx| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let ctx = Arc::new(test_context());
        handler(ctx.clone()).await.unwrap();
        handler(ctx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn test_context() -> EventContext {
        use alloy::primitives::{address, LogData};

        let event: alloy_json_abi::Event = serde_json::from_str(
            r#"{"type":"event","name":"Ping","inputs":[],"anonymous":false}"#,
        )
        .unwrap();
        let decoder = crate::events::decode::EventDecoder::from_abi(&event).unwrap();

        let log = Log {
            inner: alloy::primitives::Log {
                address: address!("00000000000000000000000000000000000000aa"),
                data: LogData::new_unchecked(vec![decoder.topic0()], Default::default()),
            },
            ..Default::default()
        };
        let decoded = decoder.decode(&log).unwrap();

        EventContext {
            log,
            contract: Arc::new(ContractDescriptor {
                name: "ping".to_string(),
                abi: alloy_json_abi::JsonAbi::default(),
                address: address!("00000000000000000000000000000000000000aa"),
            }),
            event: "Ping".to_string(),
            decoded,
            deadline: None,
        }
    }
}
