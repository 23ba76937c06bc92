//! Listener REST Handlers
//!
//! Demultiplexes inbound calls to the client's update entry point and
//! answers over the same connection.

use crate::cache::metrics::CacheMetrics;
use crate::domain::messages::{ApiErrorResponse, UpdateRequest, UpdateResponse, UPDATE_PATH};
use crate::domain::ports::{UpdateEntryPointRef, UpdateSource};
use crate::error::Error;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

// =============================================================================
// Listener Router
// =============================================================================

/// Router builder for the endpoint listener
pub struct ListenerRouter {
    entry_point: UpdateEntryPointRef,
    metrics: Option<Arc<CacheMetrics>>,
    max_body_size: usize,
}

impl ListenerRouter {
    /// Create a router dispatching into `entry_point`
    pub fn new(entry_point: UpdateEntryPointRef) -> Self {
        Self {
            entry_point,
            metrics: None,
            max_body_size: 10 * 1024 * 1024,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = ListenerState {
            entry_point: self.entry_point,
            metrics: self.metrics,
        };

        Router::new()
            .route(UPDATE_PATH, post(dispatch_update))
            .route("/metrics", get(metrics))
            .route("/health", get(health_check))
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.max_body_size))
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http())
    }
}

/// Shared listener state
#[derive(Clone)]
struct ListenerState {
    entry_point: UpdateEntryPointRef,
    metrics: Option<Arc<CacheMetrics>>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Deliver a pushed view to the update entry point
async fn dispatch_update(State(state): State<ListenerState>, body: Bytes) -> impl IntoResponse {
    let request: UpdateRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = Error::Dispatch(e.to_string());
            warn!("Rejected inbound push: {}", err);
            if let Some(metrics) = &state.metrics {
                metrics.record_dispatch_failure();
            }
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiErrorResponse::new("malformed_view", err.to_string())),
            )
                .into_response();
        }
    };

    debug!(entries = request.view.len(), "Dispatching inbound push");
    let accepted = state
        .entry_point
        .update_view(request.view, UpdateSource::Authority);

    (StatusCode::OK, Json(UpdateResponse { accepted })).into_response()
}

/// Prometheus text exposition
async fn metrics(State(state): State<ListenerState>) -> impl IntoResponse {
    let Some(metrics) = &state.metrics else {
        return (StatusCode::NOT_FOUND, "metrics disabled".to_string()).into_response();
    };

    match metrics.encode_text() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
