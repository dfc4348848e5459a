//! Live event delivery: per-route subscriptions feeding a bounded
//! dispatch worker pool.
//!
//! # Responsibilities
//! - Register routes against the contract registry and compose them into
//!   the shared route table
//! - Hold one log subscription per route and supervise it: a dropped or
//!   failed subscription is re-established after a fixed delay
//! - Funnel matched logs through a bounded queue into a fixed worker pool;
//!   a full queue applies backpressure to the subscription tasks
//!
//! # Design Decisions
//! - Routes are registered on a builder and frozen at `build`, so the
//!   running router and scanner share an effectively immutable table
//! - Handled-event markers are claimed before enqueueing, which lets the
//!   scanner and the live path race on the same log safely
//! - When the marker store is unreachable the log is dispatched anyway:
//!   duplicate handling is preferred over dropped events

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::rpc::types::{Filter, Log};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::RouterConfig;
use crate::events::context::Middleware;
use crate::events::route::{BoundRoute, Route, RouteError, RouteTable};
use crate::events::store::DedupStore;
use crate::ledger::{Ledger, LedgerError};
use crate::observability::metrics;
use crate::registry::ContractRegistry;

/// One matched log waiting for a dispatch worker.
struct DispatchJob {
    route: Arc<BoundRoute>,
    log: Log,
}

/// Builder for the live delivery path.
pub struct EventRouter {
    ledger: Arc<dyn Ledger>,
    registry: Arc<ContractRegistry>,
    dedup: Option<DedupStore>,
    config: RouterConfig,
    middlewares: Vec<Middleware>,
    routes: Vec<Route>,
}

impl EventRouter {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        registry: Arc<ContractRegistry>,
        config: RouterConfig,
    ) -> Self {
        Self {
            ledger,
            registry,
            dedup: None,
            config,
            middlewares: Vec::new(),
            routes: Vec::new(),
        }
    }

    /// Wire the handled-event marker store used to suppress duplicate
    /// deliveries on the live path.
    pub fn with_dedup(mut self, dedup: DedupStore) -> Self {
        self.dedup = Some(dedup);
        self
    }

    /// Attach router-global middleware. Applied to every route, outermost
    /// first in attachment order.
    pub fn middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Register a route for `event` on the named contract.
    ///
    /// Fails if the contract is not registered, the ABI lacks the event,
    /// or another route already claims the same (address, topic0) key.
    pub fn route(&mut self, contract: &str, event: &str) -> Result<&mut Route, RouteError> {
        let descriptor = self.registry.lookup(contract)?;
        let route = Route::new(descriptor, event)?;

        let key = (route.address(), route.topic0());
        if self
            .routes
            .iter()
            .any(|existing| (existing.address(), existing.topic0()) == key)
        {
            return Err(RouteError::DuplicateRoute {
                contract: contract.to_string(),
                event: event.to_string(),
            });
        }

        self.routes.push(route);
        let end = self.routes.len() - 1;
        Ok(&mut self.routes[end])
    }

    /// Freeze the registered routes and produce the runnable driver plus
    /// the route table shared with the block scanner.
    pub fn build(self) -> Result<(RouterDriver, Arc<RouteTable>), RouteError> {
        let table = Arc::new(RouteTable::new());
        for route in &self.routes {
            table.insert(Arc::new(route.bind(&self.middlewares)))?;
        }

        let dedup = if self.config.dedupe_dispatch {
            if self.dedup.is_none() {
                tracing::warn!(
                    "Dispatch dedup is enabled but no marker store is wired; duplicates will not be suppressed"
                );
            }
            self.dedup
        } else {
            None
        };

        tracing::info!(routes = table.len(), "Event routes bound");

        let driver = RouterDriver {
            ledger: self.ledger,
            dedup,
            config: self.config,
            table: table.clone(),
        };
        Ok((driver, table))
    }
}

/// The running half of the router: subscription tasks plus the worker pool.
pub struct RouterDriver {
    ledger: Arc<dyn Ledger>,
    dedup: Option<DedupStore>,
    config: RouterConfig,
    table: Arc<RouteTable>,
}

impl RouterDriver {
    /// Run subscriptions and dispatch workers until shutdown.
    ///
    /// Returns only when every subscription task has stopped, which in
    /// practice means the process is shutting down or no subscription
    /// transport is configured.
    pub async fn listen(self) {
        let routes = self.table.routes();
        if routes.is_empty() {
            tracing::warn!("No event routes registered; live delivery is idle");
            return;
        }

        let handler_timeout = match self.config.handler_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let restart_delay = Duration::from_millis(self.config.restart_delay_ms);

        let (queue_tx, queue_rx) = mpsc::channel::<DispatchJob>(self.config.queue_depth.max(1));
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        let workers = self.config.workers.max(1);
        let mut worker_tasks: Vec<JoinHandle<()>> = Vec::with_capacity(workers);
        for worker in 0..workers {
            worker_tasks.push(tokio::spawn(dispatch_worker(
                worker,
                queue_rx.clone(),
                handler_timeout,
            )));
        }
        tracing::info!(workers, queue_depth = self.config.queue_depth, "Dispatch pool started");

        let mut subscription_tasks: Vec<JoinHandle<()>> = Vec::with_capacity(routes.len());
        for route in routes {
            subscription_tasks.push(tokio::spawn(subscribe_route(
                route,
                self.ledger.clone(),
                self.dedup.clone(),
                queue_tx.clone(),
                restart_delay,
            )));
        }
        drop(queue_tx);

        for task in subscription_tasks {
            join_task("subscription", task).await;
        }
        // Sender side is gone; workers drain the queue and stop
        for task in worker_tasks {
            join_task("dispatch-worker", task).await;
        }
    }
}

/// Await a spawned task, logging a panic instead of dropping it.
async fn join_task(task_kind: &'static str, task: JoinHandle<()>) {
    if let Err(error) = task.await {
        if error.is_panic() {
            tracing::error!(task = task_kind, error = %error, "Task panicked");
        } else {
            tracing::error!(task = task_kind, error = %error, "Task aborted");
        }
    }
}

/// Hold one subscription for a route, forwarding matched logs into the
/// dispatch queue and re-subscribing after failures.
async fn subscribe_route(
    route: Arc<BoundRoute>,
    ledger: Arc<dyn Ledger>,
    dedup: Option<DedupStore>,
    queue: mpsc::Sender<DispatchJob>,
    restart_delay: Duration,
) {
    let filter = Filter::new()
        .address(route.contract.address)
        .event_signature(route.topic0());

    loop {
        match ledger.subscribe_logs(&filter).await {
            Ok(mut stream) => {
                tracing::info!(
                    contract = %route.contract.name,
                    event = %route.event,
                    "Event subscription established"
                );

                while let Some(log) = stream.next().await {
                    if let Some(dedup) = &dedup {
                        match dedup.mark_handled(&log).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tracing::debug!(
                                    contract = %route.contract.name,
                                    event = %route.event,
                                    block = log.block_number,
                                    "Skipping already-handled log"
                                );
                                continue;
                            }
                            Err(error) => {
                                tracing::warn!(
                                    error = %error,
                                    "Marker store unavailable; dispatching without dedup"
                                );
                            }
                        }
                    }

                    let job = DispatchJob {
                        route: route.clone(),
                        log,
                    };
                    if queue.send(job).await.is_err() {
                        tracing::error!(
                            contract = %route.contract.name,
                            event = %route.event,
                            "Dispatch queue closed; stopping subscription"
                        );
                        return;
                    }
                }

                tracing::warn!(
                    contract = %route.contract.name,
                    event = %route.event,
                    "Event subscription stream ended"
                );
            }
            Err(LedgerError::NoSubscriptionTransport) => {
                tracing::warn!(
                    contract = %route.contract.name,
                    event = %route.event,
                    "No subscription transport configured; live delivery disabled for this route"
                );
                return;
            }
            Err(error) => {
                tracing::warn!(
                    contract = %route.contract.name,
                    event = %route.event,
                    error = %error,
                    "Event subscription failed"
                );
            }
        }

        metrics::record_subscription_restart(&route.contract.name);
        tokio::time::sleep(restart_delay).await;
    }
}

/// Pull jobs off the shared queue and run their handler chains.
async fn dispatch_worker(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    handler_timeout: Option<Duration>,
) {
    loop {
        let job = {
            let mut receiver = queue.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            tracing::debug!(worker, "Dispatch queue drained; worker stopping");
            return;
        };
        dispatch(job, handler_timeout).await;
    }
}

async fn dispatch(job: DispatchJob, handler_timeout: Option<Duration>) {
    let DispatchJob { route, log } = job;

    let deadline = handler_timeout.map(|limit| Instant::now() + limit);
    let ctx = match route.context(log, deadline) {
        Ok(ctx) => ctx,
        Err(error) => {
            tracing::warn!(
                contract = %route.contract.name,
                event = %route.event,
                error = %error,
                "Dropping undecodable log"
            );
            metrics::record_decode_failure(&route.contract.name, &route.event);
            return;
        }
    };

    let chain = route.chain(true).clone();
    let result = match handler_timeout {
        Some(limit) => match tokio::time::timeout(limit, chain(ctx.clone())).await {
            Ok(result) => result,
            Err(_) => Err(format!("handler chain exceeded {}ms deadline", limit.as_millis()).into()),
        },
        None => chain(ctx.clone()).await,
    };

    if let Err(error) = result {
        // The recovery middleware normally absorbs handler errors; anything
        // reaching here escaped the chain (e.g. a deadline overrun)
        tracing::error!(
            contract = %ctx.contract_name(),
            event = %ctx.event,
            block = ctx.block_number(),
            error = %error,
            "Event dispatch failed"
        );
        metrics::record_handler_error(ctx.contract_name(), &ctx.event);
    }
    metrics::record_event_dispatched(ctx.contract_name(), &ctx.event, "live");
}
