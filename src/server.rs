use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;

use crate::ingress::{Ingress, IngressReply};
use crate::types::LogEntry;

/// Number of log entries returned when the request names no count.
pub const DEFAULT_LOG_COUNT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    ingress: Ingress,
}

impl AppState {
    pub fn new(ingress: Ingress) -> Self {
        Self { ingress }
    }
}

#[derive(Serialize)]
struct LogsResponse {
    count: usize,
    logs: Vec<LogEntry>,
}

impl IntoResponse for IngressReply {
    fn into_response(self) -> Response {
        match self {
            IngressReply::Challenge(token) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                token,
            )
                .into_response(),
            IngressReply::Ack(text) => Json(json!({ "text": text })).into_response(),
        }
    }
}

/// Routes of the relay.
///
/// `GET /test` and `GET /logs[/<count>]` (also reachable as `/log`) are
/// served directly; a `POST` to any other path goes through the ingress.
///
/// Inbound bodies are unlimited in size unless the relay configuration sets
/// `max_body_bytes`.
pub fn app(state: AppState) -> Router {
    let body_limit = match state.ingress.config().max_body_bytes {
        Some(bytes) => DefaultBodyLimit::max(bytes),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/test", get(liveness))
        .route("/logs", get(recent_logs))
        .route("/logs/:count", get(recent_logs_count))
        .route("/log", get(recent_logs))
        .route("/log/:count", get(recent_logs_count))
        .fallback(inbound)
        .layer(body_limit)
        .with_state(state)
}

async fn inbound(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let (reply, status) = state.ingress.handle(uri.path(), &headers, &body).await;
    let mut response = reply.into_response();
    *response.status_mut() = status;
    response
}

async fn liveness() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "relay is working" }))
}

async fn recent_logs(State(state): State<AppState>) -> Json<LogsResponse> {
    logs_response(&state, DEFAULT_LOG_COUNT).await
}

async fn recent_logs_count(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    match parse_count(&raw) {
        Some(count) => logs_response(&state, count).await.into_response(),
        None => (StatusCode::BAD_REQUEST, format!("invalid log count {:?}", raw)).into_response(),
    }
}

/// Integer count saturated into `usize`: negatives give 0, overflow gives `usize::MAX`.
fn parse_count(raw: &str) -> Option<usize> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative {
        return Some(0);
    }
    Some(digits.parse::<usize>().unwrap_or(usize::MAX))
}

async fn logs_response(state: &AppState, requested: usize) -> Json<LogsResponse> {
    let logs = state.ingress.logs();
    let count = requested.min(logs.max_logs());
    Json(LogsResponse {
        count: logs.len().await,
        logs: logs.recent(count).await,
    })
}
