//! HTTP handlers for the routing gateway.
//!
//! Error bodies are always `{"error": "..."}`.

use super::events::{DocumentEvent, ReplyEnvelope};
use super::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::routing::{InboundRequest, RouteResponse};

// ── Request / response bodies ───────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteBody {
    pub text: String,
    pub user_id: String,
    pub session_id: String,
    /// When present, the response also carries a reply envelope.
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RouteResult {
    #[serde(flatten)]
    pub response: RouteResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyEnvelope>,
}

// ── Helpers ─────────────────────────────────────────────────────

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn rejection_response(rejection: &JsonRejection) -> Response {
    error_response(rejection.status(), rejection.body_text())
}

fn validate(request: &InboundRequest) -> Result<(), String> {
    for (field, value) in [
        ("text", &request.text),
        ("userId", &request.user_id),
        ("sessionId", &request.session_id),
    ] {
        if value.trim().is_empty() {
            return Err(format!("'{field}' must not be empty"));
        }
    }
    Ok(())
}

async fn route(state: &AppState, request: &InboundRequest) -> Result<RouteResponse, Response> {
    state
        .router
        .route_request_with_cancel(request, state.shutdown.child_token())
        .await
        .ok_or_else(|| {
            tracing::info!(session = %request.session_id, "turn cancelled by shutdown");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "request cancelled")
        })
}

// ── Handlers ────────────────────────────────────────────────────

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "agents": state.router.agents().len(),
    }))
}

/// GET /metrics: Prometheus text exposition
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.router.render_metrics(),
    )
}

/// GET /v1/agents
pub async fn handle_agents(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "agents": state.router.agents() }))
}

/// POST /v1/route: route one request synchronously
pub async fn handle_route(
    State(state): State<AppState>,
    body: Result<Json<RouteBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(&rejection),
    };

    let request = InboundRequest {
        text: body.text,
        user_id: body.user_id,
        session_id: body.session_id,
    };
    if let Err(message) = validate(&request) {
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    match route(&state, &request).await {
        Ok(response) => {
            let reply = body
                .subject
                .as_deref()
                .map(|subject| ReplyEnvelope::reply_to(subject, &response));
            Json(RouteResult { response, reply }).into_response()
        }
        Err(cancelled) => cancelled,
    }
}

/// POST /v1/events: ingest a `document-created` CloudEvent and answer it
pub async fn handle_event(
    State(state): State<AppState>,
    body: Result<Json<DocumentEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match body {
        Ok(event) => event,
        Err(rejection) => return rejection_response(&rejection),
    };

    let request = match event.to_inbound() {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "rejected inbound event");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    tracing::debug!(
        event_id = %event.id,
        session = %request.session_id,
        "routing inbound document"
    );

    match route(&state, &request).await {
        Ok(response) => Json(ReplyEnvelope::reply_to(event.subject(), &response)).into_response(),
        Err(cancelled) => cancelled,
    }
}
