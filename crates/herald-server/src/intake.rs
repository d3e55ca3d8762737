//! HTTP surface: task intake, health, and status.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use herald_core::app::Dispatcher;
use herald_core::config::{HeraldConfig, SecretString};
use herald_core::domain::{DispatchError, FulfillmentRequest, ValidationError};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct HealthInfo {
    pub status: &'static str,
    pub generator: &'static str,
    pub publisher: &'static str,
    pub version: &'static str,
}

impl HealthInfo {
    pub fn from_config(config: &HeraldConfig) -> Self {
        Self {
            status: "ok",
            generator: config.generator.provider.as_str(),
            publisher: config.publisher.provider.as_str(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub shared_secret: SecretString,
    pub health: HealthInfo,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tasks", post(submit_task))
        .route("/api/status", get(status))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthInfo> {
    Json(state.health)
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatcher.counts())
}

async fn submit_task(
    State(state): State<AppState>,
    payload: Result<Json<FulfillmentRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return validation_error_to_response(ValidationError::Malformed(rejection.body_text()));
        }
    };

    if let Err(e) = request.verify_secret(state.shared_secret.expose()) {
        warn!(email = %request.email, task = %request.task, "secret mismatch");
        return validation_error_to_response(e);
    }
    if let Err(e) = request.validate() {
        warn!(task = %request.task, error = %e, "request rejected");
        return validation_error_to_response(e);
    }

    match state.dispatcher.submit(request.into_assignment()) {
        Ok(handle) => {
            info!(job_id = %handle.job_id, job_key = %handle.key, "request accepted");
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "status": "ok",
                    "job_id": handle.job_id.to_string(),
                })),
            )
                .into_response()
        }
        Err(e) => dispatch_error_to_response(e),
    }
}

fn validation_error_to_response(err: ValidationError) -> Response {
    match err {
        ValidationError::SecretMismatch => {
            json_error(StatusCode::FORBIDDEN, "secret_mismatch", err.to_string())
        }
        ValidationError::MissingField(_) => {
            json_error(StatusCode::BAD_REQUEST, "missing_field", err.to_string())
        }
        ValidationError::InvalidField { .. } => {
            json_error(StatusCode::BAD_REQUEST, "invalid_field", err.to_string())
        }
        ValidationError::Malformed(_) => {
            json_error(StatusCode::BAD_REQUEST, "malformed", err.to_string())
        }
    }
}

fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::DuplicateJob(_) => {
            json_error(StatusCode::CONFLICT, "duplicate_job", err.to_string())
        }
        DispatchError::Shutdown => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "shutting_down", err.to_string())
        }
        DispatchError::Lost(_) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
        }
    }
}

fn json_error(status: StatusCode, code: &'static str, reason: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "error": code,
            "reason": reason.into(),
        })),
    )
        .into_response()
}
