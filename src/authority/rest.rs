//! Authority REST API
//!
//! HTTP surface of the reference authority: client registration, the
//! canonical view, and a registry listing for operators.

use crate::authority::service::ViewAuthority;
use crate::domain::messages::{
    ApiErrorResponse, ClientInfoResponse, PutRequest, PutResponse, RegisterRequest,
    RegisterResponse, CLIENTS_PATH, VIEW_PATH,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

// =============================================================================
// Authority Router
// =============================================================================

/// Router builder for the authority API
pub struct AuthorityRouter {
    authority: Arc<ViewAuthority>,
}

impl AuthorityRouter {
    pub fn new(authority: Arc<ViewAuthority>) -> Self {
        Self { authority }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            authority: self.authority,
        };

        Router::new()
            .route(CLIENTS_PATH, post(register_client).get(list_clients))
            .route(VIEW_PATH, get(fetch_view).put(put_view))
            .route("/health", get(health_check))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    authority: Arc<ViewAuthority>,
}

fn bad_request(rejection: JsonRejection) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiErrorResponse::new("invalid_request", rejection.body_text())),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a client's callable address
async fn register_client(
    State(state): State<AppState>,
    request: Result<Json<RegisterRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection),
    };

    let newly_registered = state.authority.register(request.address.clone());
    let status = if newly_registered {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    (
        status,
        Json(RegisterResponse {
            address: request.address,
            newly_registered,
        }),
    )
        .into_response()
}

/// List registered clients
async fn list_clients(State(state): State<AppState>) -> impl IntoResponse {
    let clients: Vec<ClientInfoResponse> = state
        .authority
        .clients()
        .into_iter()
        .map(|record| ClientInfoResponse {
            address: record.address,
            registered_at: record.registered_at,
            last_delivery_at: record.last_delivery_at,
            consecutive_failures: record.consecutive_failures,
        })
        .collect();

    Json(clients)
}

/// Canonical view
async fn fetch_view(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.authority.fetch())
}

/// Replace the canonical view and fan it out
async fn put_view(
    State(state): State<AppState>,
    request: Result<Json<PutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return bad_request(rejection),
    };

    debug!(entries = request.view.len(), origin = ?request.origin, "Put received");
    let report = state
        .authority
        .put(request.view, request.origin.as_ref())
        .await;

    (StatusCode::OK, Json(PutResponse::from(report))).into_response()
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::notifier::{HttpNotifier, NotifierConfig};
    use crate::authority::service::ViewAuthorityConfig;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let notifier = Arc::new(HttpNotifier::new(NotifierConfig::default()).unwrap());
        let authority = ViewAuthority::new(ViewAuthorityConfig::default(), notifier);
        AuthorityRouter::new(authority).build()
    }

    fn request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_register_created_then_ok() {
        let app = app();
        let body = json!({"address": "http://127.0.0.1:7701"});

        let response = app
            .clone()
            .oneshot(request("POST", CLIENTS_PATH, body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await["newlyRegistered"], json!(true));

        let response = app
            .clone()
            .oneshot(request("POST", CLIENTS_PATH, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["newlyRegistered"], json!(false));

        let response = app
            .oneshot(Request::builder().uri(CLIENTS_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let clients = body_json(response).await;
        assert_eq!(clients.as_array().unwrap().len(), 1);
        assert_eq!(clients[0]["address"], "http://127.0.0.1:7701");
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_address() {
        let response = app()
            .oneshot(request("POST", CLIENTS_PATH, json!({"address": "not a url"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_put_then_fetch() {
        let app = app();

        let response = app
            .clone()
            .oneshot(request("PUT", VIEW_PATH, json!({"view": {"5": 7}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"delivered": 0, "failed": 0, "removed": []})
        );

        let response = app
            .oneshot(Request::builder().uri(VIEW_PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await, json!({"5": 7}));
    }
}
