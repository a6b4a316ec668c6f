//! HTTP gateway in front of the router.
//!
//! Exposes synchronous routing, CloudEvent ingestion, agent listing, health
//! and Prometheus metrics. Request bodies are size-capped and every request
//! is bounded by the configured timeout.

pub mod api;
pub mod events;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router as HttpRouter,
};
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::GatewayConfig;
use crate::routing::Router;

pub use events::{DocumentEvent, EventError, ReplyEnvelope, DOCUMENT_CREATED};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<dyn Router>,
    /// Fired on shutdown; in-flight turns observing it are dropped without
    /// being recorded.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(router: Arc<dyn Router>) -> Self {
        Self {
            router,
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_router(state: AppState, config: &GatewayConfig) -> HttpRouter {
    HttpRouter::new()
        .route("/health", get(api::handle_health))
        .route("/metrics", get(api::handle_metrics))
        .route("/v1/agents", get(api::handle_agents))
        .route("/v1/route", post(api::handle_route))
        .route("/v1/events", post(api::handle_event))
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs.max(1)),
        ))
        .with_state(state)
}

/// Bind and serve until ctrl-c, then cancel in-flight turns.
pub async fn run_gateway(router: Arc<dyn Router>, config: &GatewayConfig) -> Result<()> {
    let address = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind gateway to {address}"))?;
    let local = listener.local_addr()?;

    let state = AppState::new(router);
    let shutdown = state.shutdown.clone();
    let app = build_router(state, config);

    tracing::info!(address = %local, "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::warn!(%error, "failed to install ctrl-c handler");
            }
            tracing::info!("shutdown requested, cancelling in-flight turns");
            shutdown.cancel();
        })
        .await
        .context("gateway server terminated unexpectedly")?;

    tracing::info!("gateway stopped");
    Ok(())
}
