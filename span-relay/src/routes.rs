//! HTTP surface of the relay.
//!
//! Every handler is a thin adapter over [`RelayService`]: decode the
//! request, call the store, encode the result. Errors leave as
//! `{ "error": <kind>, "message": <detail> }` with a status derived from
//! the [`SpanError`] variant.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::debug;

use span_core::protocol::{
    FetchFrameResponse, PublishAck, PublishFrameRequest, RegisterResponse,
};
use span_core::{
    Command, ErrorBody, QueuedCommand, RegisterRequest, RelayService, SessionId, SessionSummary,
    SpanError,
};

pub type SharedService = Arc<RelayService>;

/// Build the relay router around `service`.
pub fn router(service: SharedService, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/register", post(register))
        .route("/api/sessions", get(list_sessions))
        .route("/api/commands/:id", get(drain_commands))
        .route("/api/command/:id", post(enqueue_command))
        .route("/api/screen", post(publish_frame))
        .route("/api/screen/:id", get(fetch_frame))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// ── Errors ───────────────────────────────────────────────────────

/// An error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

pub fn status_for(err: &SpanError) -> StatusCode {
    match err {
        SpanError::UnknownSession(_) => StatusCode::NOT_FOUND,
        SpanError::MalformedPayload(_) | SpanError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
        SpanError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        SpanError::TransientNetwork(_) => StatusCode::BAD_GATEWAY,
        SpanError::CaptureUnavailable(_)
        | SpanError::InjectionUnavailable(_)
        | SpanError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SpanError> for ApiError {
    fn from(err: SpanError) -> Self {
        Self {
            status: status_for(&err),
            body: ErrorBody::from_error(&err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let err = SpanError::MalformedPayload(rejection.body_text());
        Self {
            // Keep 413 for oversize bodies, everything else is a 400.
            status: if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            },
            body: ErrorBody::from_error(&err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// ── Handlers ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct Health {
    status: &'static str,
    sessions: usize,
}

async fn health(State(service): State<SharedService>) -> Json<Health> {
    Json(Health {
        status: "ok",
        sessions: service.session_count(),
    })
}

/// `POST /api/register`. An empty body registers with default host info.
async fn register(
    State(service): State<SharedService>,
    body: Bytes,
) -> ApiResult<RegisterResponse> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        RegisterRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(SpanError::from)?
    };
    let session_id = service.register(request)?;
    Ok(Json(RegisterResponse { session_id }))
}

async fn list_sessions(State(service): State<SharedService>) -> Json<Vec<SessionSummary>> {
    Json(service.list_sessions())
}

async fn drain_commands(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> ApiResult<Vec<QueuedCommand>> {
    let id = SessionId::new(id);
    let commands = service.drain_commands(&id)?;
    if !commands.is_empty() {
        debug!(session = %id, count = commands.len(), "commands drained");
    }
    Ok(Json(commands))
}

async fn enqueue_command(
    State(service): State<SharedService>,
    Path(id): Path<String>,
    payload: Result<Json<Command>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(command) = payload?;
    service.enqueue_command(&SessionId::new(id), command)?;
    Ok(Json(json!({ "success": true })))
}

async fn publish_frame(
    State(service): State<SharedService>,
    payload: Result<Json<PublishFrameRequest>, JsonRejection>,
) -> ApiResult<PublishAck> {
    let Json(request) = payload?;
    let (id, frame) = request.into_frame()?;
    let outcome = service.publish_frame(&id, frame)?;
    Ok(Json(PublishAck {
        success: true,
        accepted: outcome.accepted(),
    }))
}

async fn fetch_frame(
    State(service): State<SharedService>,
    Path(id): Path<String>,
) -> ApiResult<FetchFrameResponse> {
    let frame = service.fetch_frame(&SessionId::new(id))?;
    Ok(Json(FetchFrameResponse {
        frame: frame.map(|f| f.to_view()),
    }))
}
