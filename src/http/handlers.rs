use super::state::AppState;
use crate::audio::AudioSettings;
use crate::error::CallError;
use crate::session::CallStatus;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StartCallResponse {
    pub call_id: Uuid,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopCallResponse {
    pub status: String,
    pub message: String,
    pub call: CallStatus,
}

/// Partial settings update; omitted fields keep their value
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub input_gain: Option<f32>,
    pub amplification: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(err: &CallError) -> StatusCode {
    match err {
        CallError::AlreadyActive => StatusCode::CONFLICT,
        CallError::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /call/start
/// Start a call to the configured endpoint
pub async fn start_call(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start requested over HTTP");

    match state.session.start().await {
        Ok(call_id) => (
            StatusCode::OK,
            Json(StartCallResponse {
                call_id,
                status: "active".to_string(),
                message: format!("Call {} started", call_id),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start call: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /call/stop
/// Stop the current call (no-op when idle)
pub async fn stop_call(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop requested over HTTP");

    let was_running = state.session.status().state.is_live();
    let call = state.session.stop().await;

    let message = if was_running {
        "Call stopped"
    } else {
        "No call was running"
    };

    (
        StatusCode::OK,
        Json(StopCallResponse {
            status: "idle".to_string(),
            message: message.to_string(),
            call,
        }),
    )
}

/// GET /call/status
pub async fn get_call_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.session.status()))
}

/// GET /settings
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.settings.get()))
}

/// PUT /settings
/// Values are clamped to [0, MAX_AMPLIFICATION]; the applied settings are returned
pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    let current = state.settings.get();
    let applied = state.settings.set(AudioSettings {
        input_gain: req.input_gain.unwrap_or(current.input_gain),
        amplification: req.amplification.unwrap_or(current.amplification),
    });

    info!(
        "Settings updated: input gain {:.2}, amplification {:.2}",
        applied.input_gain, applied.amplification
    );

    (StatusCode::OK, Json(applied))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
