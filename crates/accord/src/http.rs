//! Axum HTTP surface for the consent flow.
//!
//! The handlers are thin: query parameters in, the synchronous state
//! machine does the work, status mapping out.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use accord_core::{ConsentError, ConsentResult};

use crate::handler::{ConsentParams, ConsentRequestHandler, ConsentResponse};

/// Shared application state for axum handlers.
pub struct AppState {
    pub handler: ConsentRequestHandler,
    pub policy_version: String,
}

/// Build the axum router with all endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/_matrix/client/consent",
            get(handle_consent_get).post(handle_consent_post),
        )
        .route("/health", get(handle_health))
        .with_state(state)
}

/// The `(u, v, h)` query parameters; any of them may be absent.
#[derive(Debug, Deserialize)]
struct ConsentQuery {
    #[serde(default)]
    u: String,
    #[serde(default)]
    v: String,
    #[serde(default)]
    h: String,
}

impl From<ConsentQuery> for ConsentParams {
    fn from(query: ConsentQuery) -> Self {
        Self {
            user: query.u,
            version: query.v,
            hmac: query.h,
        }
    }
}

/// GET /_matrix/client/consent -- render the policy, personalized when a
/// valid signed link was followed.
async fn handle_consent_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConsentQuery>,
) -> Response {
    page_response(state.handler.get(&query.into()))
}

/// POST /_matrix/client/consent -- record an acceptance after the
/// signature check passes.
async fn handle_consent_post(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConsentQuery>,
) -> Response {
    page_response(state.handler.post(&query.into()))
}

fn page_response(result: ConsentResult<ConsentResponse>) -> Response {
    match result {
        Ok(page) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            page.body,
        )
            .into_response(),
        Err(ConsentError::InvalidHmac) => {
            // the body text is part of the HTTP contract
            (StatusCode::FORBIDDEN, ConsentError::InvalidHmac.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "unable to serve consent request");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}

/// GET /health -- liveness and version info.
async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "policy_version": state.policy_version,
    }))
}
