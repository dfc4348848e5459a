//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, timeout, body limit, request ID,
//!   idempotent replay on mutating routes)
//! - Bind the server to a listener and serve until shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::http::{handlers, idempotency};
use crate::ledger::Ledger;
use crate::store::KvStore;
use crate::submit::Submitter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub submitter: Arc<Submitter>,
    pub ledger: Arc<dyn Ledger>,
    pub store: Arc<dyn KvStore>,
    pub chain_id: u64,
    pub idempotency_ttl_secs: u64,
}

/// HTTP server for the relay API.
pub struct HttpServer {
    router: Router,
    config: HttpConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given state and configuration.
    pub fn new(state: AppState, config: HttpConfig) -> Self {
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &HttpConfig, state: AppState) -> Router {
        let guarded = Router::new()
            .route("/v1/transfer", post(handlers::transfer))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                idempotency::idempotency_guard,
            ));

        // Last layer added is outermost: the request id is stamped before
        // tracing and propagation see the request
        Router::new()
            .route("/healthz", get(handlers::healthz))
            .merge(guarded)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
