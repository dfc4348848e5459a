//! Route definitions and the shared (address, topic0) lookup table.
//!
//! # Responsibilities
//! - Bind a contract event to its handler chain and per-route middleware
//! - Compose handler chains once, at build time, into immutable bound routes
//! - Expose a lock-guarded lookup table shared by the live router and the
//!   block scanner
//!
//! # Design Decisions
//! - Misconfiguration (unknown contract or event, duplicate route key) is
//!   surfaced when routes are registered, not when the first log arrives
//! - A bound route carries two composed chains: handlers plus route-local
//!   middleware, and that same chain wrapped in the router-global middleware,
//!   so each delivery path picks its variant without re-composing

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use alloy::primitives::{Address, B256};
use alloy::rpc::types::Log;
use thiserror::Error;

use crate::events::context::{EventContext, EventHandler, Middleware};
use crate::events::decode::{DecodeError, EventDecoder};
use crate::registry::{ContractDescriptor, RegistryError};

/// Errors raised while registering or binding routes.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The named contract is not in the registry.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The contract ABI does not declare this event.
    #[error("contract '{contract}' has no event named '{event}'")]
    UnknownEvent { contract: String, event: String },

    /// The decoder could not be built from the ABI definition.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Two routes share the same (address, topic0) key.
    #[error("duplicate route for contract '{contract}' event '{event}'")]
    DuplicateRoute { contract: String, event: String },
}

/// A route under construction: one contract event plus its handlers.
///
/// Overloaded event names resolve to the first declared signature.
pub struct Route {
    contract: Arc<ContractDescriptor>,
    event: String,
    decoder: EventDecoder,
    handlers: Vec<EventHandler>,
    middlewares: Vec<Middleware>,
}

impl Route {
    pub(crate) fn new(contract: Arc<ContractDescriptor>, event: &str) -> Result<Self, RouteError> {
        let definition = contract
            .abi
            .events
            .get(event)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| RouteError::UnknownEvent {
                contract: contract.name.clone(),
                event: event.to_string(),
            })?;
        let decoder = EventDecoder::from_abi(definition)?;

        Ok(Self {
            contract,
            event: event.to_string(),
            decoder,
            handlers: Vec::new(),
            middlewares: Vec::new(),
        })
    }

    /// Append a handler. Handlers run in registration order and the first
    /// error short-circuits the rest of the chain.
    pub fn handler(&mut self, handler: EventHandler) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    /// Attach route-local middleware. The first middleware attached runs
    /// outermost around this route's handlers.
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub(crate) fn address(&self) -> Address {
        self.contract.address
    }

    pub(crate) fn topic0(&self) -> B256 {
        self.decoder.topic0()
    }

    /// Freeze this route into its bound form, composing the handler chain
    /// and wrapping it in route-local and router-global middleware.
    pub(crate) fn bind(&self, globals: &[Middleware]) -> BoundRoute {
        if self.handlers.is_empty() {
            tracing::warn!(
                contract = %self.contract.name,
                event = %self.event,
                "Route registered without handlers"
            );
        }

        let handlers = self.handlers.clone();
        let mut chain: EventHandler = Arc::new(move |ctx: Arc<EventContext>| {
            let handlers = handlers.clone();
            Box::pin(async move {
                for handler in &handlers {
                    handler(ctx.clone()).await?;
                }
                Ok(())
            })
        });

        for middleware in self.middlewares.iter().rev() {
            chain = middleware(chain);
        }
        let local_chain = chain.clone();

        let mut full_chain = chain;
        for middleware in globals.iter().rev() {
            full_chain = middleware(full_chain);
        }

        BoundRoute {
            contract: self.contract.clone(),
            event: self.event.clone(),
            decoder: self.decoder.clone(),
            local_chain,
            full_chain,
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("contract", &self.contract.name)
            .field("event", &self.event)
            .field("topic0", &self.topic0())
            .finish_non_exhaustive()
    }
}

/// An immutable, fully composed route.
pub struct BoundRoute {
    /// Contract this route is bound to.
    pub contract: Arc<ContractDescriptor>,
    /// Event name this route matches.
    pub event: String,
    decoder: EventDecoder,
    local_chain: EventHandler,
    full_chain: EventHandler,
}

impl BoundRoute {
    /// Topic0 this route matches.
    pub fn topic0(&self) -> B256 {
        self.decoder.topic0()
    }

    /// Decode a log and package it into a handler context.
    pub fn context(
        &self,
        log: Log,
        deadline: Option<Instant>,
    ) -> Result<Arc<EventContext>, DecodeError> {
        let decoded = self.decoder.decode(&log)?;
        Ok(Arc::new(EventContext {
            log,
            contract: self.contract.clone(),
            event: self.event.clone(),
            decoded,
            deadline,
        }))
    }

    /// The composed handler chain, with or without router-global middleware.
    pub fn chain(&self, with_global_middleware: bool) -> &EventHandler {
        if with_global_middleware {
            &self.full_chain
        } else {
            &self.local_chain
        }
    }
}

impl std::fmt::Debug for BoundRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundRoute")
            .field("contract", &self.contract.name)
            .field("event", &self.event)
            .field("topic0", &self.topic0())
            .finish_non_exhaustive()
    }
}

/// Lookup table keyed by (emitting address, topic0).
///
/// Built once at startup and shared between the live router and the block
/// scanner; reads vastly outnumber the registration-time writes.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<(Address, B256), Arc<BoundRoute>>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, route: Arc<BoundRoute>) -> Result<(), RouteError> {
        let key = (route.contract.address, route.topic0());
        let mut routes = self
            .routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if routes.contains_key(&key) {
            return Err(RouteError::DuplicateRoute {
                contract: route.contract.name.clone(),
                event: route.event.clone(),
            });
        }
        routes.insert(key, route);
        Ok(())
    }

    /// Find the route for a log's (address, topic0) pair.
    pub fn find(&self, address: Address, topic0: B256) -> Option<Arc<BoundRoute>> {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(address, topic0))
            .cloned()
    }

    /// All bound routes, in arbitrary order.
    pub fn routes(&self) -> Vec<Arc<BoundRoute>> {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::context::handler_fn;
    use alloy::primitives::{address, LogData};
    use std::sync::Mutex;

    fn transfer_contract() -> Arc<ContractDescriptor> {
        let abi: alloy_json_abi::JsonAbi = serde_json::from_str(
            r#"[{
                "type": "event",
                "name": "Transfer",
                "inputs": [
                    {"name": "from", "type": "address", "indexed": true},
                    {"name": "to", "type": "address", "indexed": true},
                    {"name": "value", "type": "uint256", "indexed": false}
                ],
                "anonymous": false
            }]"#,
        )
        .unwrap();
        Arc::new(ContractDescriptor {
            name: "token".to_string(),
            abi,
            address: address!("00000000000000000000000000000000000000aa"),
        })
    }

    fn transfer_log(route: &Route) -> Log {
        use alloy::primitives::{b256, bytes};
        Log {
            inner: alloy::primitives::Log {
                address: address!("00000000000000000000000000000000000000aa"),
                data: LogData::new_unchecked(
                    vec![
                        route.topic0(),
                        b256!("0000000000000000000000000000000000000000000000000000000000000011"),
                        b256!("0000000000000000000000000000000000000000000000000000000000000022"),
                    ],
                    bytes!("00000000000000000000000000000000000000000000000000000000000003e8"),
                ),
            },
            ..Default::default()
        }
    }

    fn recording_middleware(label: &'static str, trace: Arc<Mutex<Vec<String>>>) -> Middleware {
        Arc::new(move |next: EventHandler| {
            let trace = trace.clone();
            Arc::new(move |ctx| {
                let next = next.clone();
                let trace = trace.clone();
                Box::pin(async move {
                    trace.lock().unwrap().push(format!("{label}:before"));
                    let result = next(ctx).await;
                    trace.lock().unwrap().push(format!("{label}:after"));
                    result
                })
            })
        })
    }

    #[test]
    fn test_unknown_event_is_a_build_error() {
        let err = Route::new(transfer_contract(), "Burn").unwrap_err();
        assert!(matches!(err, RouteError::UnknownEvent { .. }));
    }

    #[tokio::test]
    async fn test_handlers_run_in_order_and_short_circuit() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new(transfer_contract(), "Transfer").unwrap();

        let t1 = trace.clone();
        route.handler(handler_fn(move |_| {
            let t1 = t1.clone();
            async move {
                t1.lock().unwrap().push("first".to_string());
                Ok(())
            }
        }));
        let t2 = trace.clone();
        route.handler(handler_fn(move |_| {
            let t2 = t2.clone();
            async move {
                t2.lock().unwrap().push("second".to_string());
                Err("boom".into())
            }
        }));
        let t3 = trace.clone();
        route.handler(handler_fn(move |_| {
            let t3 = t3.clone();
            async move {
                t3.lock().unwrap().push("third".to_string());
                Ok(())
            }
        }));

        let log = transfer_log(&route);
        let bound = route.bind(&[]);
        let ctx = bound.context(log, None).unwrap();
        let result = bound.chain(false)(ctx).await;

        assert!(result.is_err());
        assert_eq!(*trace.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_global_middleware_wraps_route_middleware() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut route = Route::new(transfer_contract(), "Transfer").unwrap();

        let t = trace.clone();
        route
            .middleware(recording_middleware("local", trace.clone()))
            .handler(handler_fn(move |_| {
                let t = t.clone();
                async move {
                    t.lock().unwrap().push("handler".to_string());
                    Ok(())
                }
            }));

        let log = transfer_log(&route);
        let bound = route.bind(&[recording_middleware("global", trace.clone())]);
        let ctx = bound.context(log, None).unwrap();
        bound.chain(true)(ctx).await.unwrap();

        assert_eq!(
            *trace.lock().unwrap(),
            vec![
                "global:before",
                "local:before",
                "handler",
                "local:after",
                "global:after"
            ],
        );
    }

    #[test]
    fn test_duplicate_route_key_rejected() {
        let table = RouteTable::new();
        let first = Route::new(transfer_contract(), "Transfer").unwrap();
        let second = Route::new(transfer_contract(), "Transfer").unwrap();

        table.insert(Arc::new(first.bind(&[]))).unwrap();
        let err = table.insert(Arc::new(second.bind(&[]))).unwrap_err();
        assert!(matches!(err, RouteError::DuplicateRoute { .. }));
    }

    #[test]
    fn test_find_misses_unknown_key() {
        let table = RouteTable::new();
        let route = Route::new(transfer_contract(), "Transfer").unwrap();
        let topic0 = route.topic0();
        table.insert(Arc::new(route.bind(&[]))).unwrap();

        assert!(table
            .find(address!("00000000000000000000000000000000000000aa"), topic0)
            .is_some());
        assert!(table
            .find(address!("00000000000000000000000000000000000000bb"), topic0)
            .is_none());
        assert_eq!(table.len(), 1);
    }
}
