//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS,
//! and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::error::{AccessError, ReviewError, SubmitError};
use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers) – adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/login", post(http::http_post_login))
        .route("/api/v1/logout", post(http::http_post_logout))
        .route("/api/v1/challenge", get(http::http_get_challenge))
        .route("/api/v1/practice", get(http::http_get_practice))
        .route("/api/v1/practice/complete", post(http::http_post_practice_complete))
        .route("/api/v1/team", post(http::http_post_team))
        .route("/api/v1/submit", post(http::http_post_submit))
        .route("/api/v1/submissions", get(http::http_get_submissions))
        .route("/api/v1/review", post(http::http_post_review))
        .route("/api/v1/complete", post(http::http_post_complete))
        .route("/api/v1/nominations", get(http::http_get_nominations))
        .route("/api/v1/progress", get(http::http_get_progress))
        .route("/api/v1/metrics", get(http::http_get_metrics))
        .route("/api/v1/export", post(http::http_post_export))
        .route("/api/v1/library", get(http::http_get_library).post(http::http_post_library))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

/// Error envelope returned by the HTTP API. Validation problems come back
/// as 4xx with the user-correctable message; upstream service failures as
/// 502 so the client can offer a retry.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        ApiError::new(StatusCode::FORBIDDEN, e.to_string())
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        let status = match &e {
            SubmitError::EmptyPayload | SubmitError::MalformedFile(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SubmitError::Analysis(_) => StatusCode::BAD_GATEWAY,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<ReviewError> for ApiError {
    fn from(e: ReviewError) -> Self {
        let status = match &e {
            ReviewError::EmptyFeedback => StatusCode::UNPROCESSABLE_ENTITY,
            ReviewError::UnknownSubmission(_) => StatusCode::NOT_FOUND,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<crate::domain::DraftError> for ApiError {
    fn from(e: crate::domain::DraftError) -> Self {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}
