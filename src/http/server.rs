//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all relay handlers
//! - Mount the routes under the configured prefix
//! - Wire up middleware (request ID, tracing)
//! - Serve until the shutdown signal fires

use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::http::handlers;
use crate::http::request::UuidRequestId;
use crate::lifecycle::shutdown;
use crate::queue::QueueClient;
use crate::relay::{Forwarder, Propagator};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub forwarder: Forwarder,
    pub propagator: Propagator,
    pub queue: Arc<dyn QueueClient>,
}

impl AppState {
    pub fn new(config: Arc<RelayConfig>, queue: Arc<dyn QueueClient>) -> Self {
        Self {
            propagator: Propagator::new(config.trace.mode),
            forwarder: Forwarder::default(),
            config,
            queue,
        }
    }
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    /// The fully layered router, for driving without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let prefix = state
        .config
        .server
        .route_prefix
        .trim_end_matches('/')
        .to_string();

    let routes = Router::new()
        .route("/start", get(handlers::start).post(handlers::start))
        .route("/headers", get(handlers::headers).post(handlers::headers))
        .route("/caller", get(handlers::caller).post(handlers::caller))
        .route("/enqueue", get(handlers::enqueue).post(handlers::enqueue))
        .route("/end", get(handlers::end).post(handlers::end))
        .with_state(state);

    let app = if prefix.is_empty() {
        routes
    } else {
        Router::new().nest(&prefix, routes)
    };

    app.layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
}
