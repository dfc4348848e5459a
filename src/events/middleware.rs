//! Stock middleware for event handler chains.
//!
//! # Responsibilities
//! - `recovery`: absorb handler errors so one failing event cannot take
//!   down a dispatch worker or abort a scan batch
//! - `logging`: structured before/after logging with handler timing
//!
//! # Design Decisions
//! - Handlers report failure through their return value; middleware observes
//!   those errors rather than catching panics

use std::sync::Arc;
use std::time::Instant;

use crate::events::context::{EventHandler, Middleware};
use crate::observability::metrics;

/// Absorb handler chain errors.
///
/// Errors are logged and counted, then swallowed, so anything wrapped
/// outside this middleware always sees `Ok`.
pub fn recovery() -> Middleware {
    Arc::new(|next: EventHandler| -> EventHandler {
        Arc::new(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                if let Err(error) = next(ctx.clone()).await {
                    tracing::error!(
                        contract = %ctx.contract_name(),
                        event = %ctx.event,
                        block = ctx.block_number(),
                        error = %error,
                        "Event handler failed"
                    );
                    metrics::record_handler_error(ctx.contract_name(), &ctx.event);
                }
                Ok(())
            })
        })
    })
}

/// Log each dispatch with its outcome and elapsed time.
pub fn logging() -> Middleware {
    Arc::new(|next: EventHandler| -> EventHandler {
        Arc::new(move |ctx| {
            let next = next.clone();
            Box::pin(async move {
                let started = Instant::now();
                tracing::debug!(
                    contract = %ctx.contract_name(),
                    event = %ctx.event,
                    block = ctx.block_number(),
                    tx_hash = ?ctx.transaction_hash(),
                    "Handling event"
                );

                let result = next(ctx.clone()).await;
                let elapsed_ms = started.elapsed().as_millis();
                match &result {
                    Ok(()) => {
                        tracing::debug!(
                            contract = %ctx.contract_name(),
                            event = %ctx.event,
                            elapsed_ms,
                            "Event handled"
                        );
                    }
                    Err(error) => {
                        tracing::warn!(
                            contract = %ctx.contract_name(),
                            event = %ctx.event,
                            elapsed_ms,
                            error = %error,
                            "Event handler returned error"
                        );
                    }
                }
                result
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::context::{handler_fn, EventContext};
    use crate::events::decode::EventDecoder;
    use crate::registry::ContractDescriptor;
    use alloy::primitives::{address, LogData};
    use alloy::rpc::types::Log;

    fn empty_context() -> Arc<EventContext> {
        let event: alloy_json_abi::Event = serde_json::from_str(
            r#"{"type":"event","name":"Ping","inputs":[],"anonymous":false}"#,
        )
        .unwrap();
        let decoder = EventDecoder::from_abi(&event).unwrap();
        let log = Log {
            inner: alloy::primitives::Log {
                address: address!("00000000000000000000000000000000000000aa"),
                data: LogData::new_unchecked(vec![decoder.topic0()], Default::default()),
            },
            ..Default::default()
        };
        let decoded = decoder.decode(&log).unwrap();
        Arc::new(EventContext {
            log,
            contract: Arc::new(ContractDescriptor {
                name: "ping".to_string(),
                abi: alloy_json_abi::JsonAbi::default(),
                address: address!("00000000000000000000000000000000000000aa"),
            }),
            event: "Ping".to_string(),
            decoded,
            deadline: None,
        })
    }

    #[tokio::test]
    async fn test_recovery_absorbs_handler_errors() {
        let failing = handler_fn(|_| async { Err("boom".into()) });
        let wrapped = recovery()(failing);
        assert!(wrapped(empty_context()).await.is_ok());
    }

    #[tokio::test]
    async fn test_logging_preserves_the_result() {
        let ok = handler_fn(|_| async { Ok(()) });
        assert!(logging()(ok)(empty_context()).await.is_ok());

        let failing = handler_fn(|_| async { Err("boom".into()) });
        assert!(logging()(failing)(empty_context()).await.is_err());
    }
}
