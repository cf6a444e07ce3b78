use super::state::AppState;
use crate::error::TranscribeError;
use crate::session::{SessionStats, TranscriptionResult};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct AudioAcceptedResponse {
    pub session_id: String,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub result: TranscriptionResult,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<String>,
    pub recently_stopped: Vec<SessionStats>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub(crate) fn status_for(err: &TranscribeError) -> StatusCode {
    match err {
        TranscribeError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        TranscribeError::SessionNotAcceptingInput(_) => StatusCode::CONFLICT,
        TranscribeError::Backpressure(_) => StatusCode::TOO_MANY_REQUESTS,
        TranscribeError::AlreadyBound { .. } => StatusCode::CONFLICT,
        TranscribeError::NotBound(_) => StatusCode::NOT_FOUND,
        TranscribeError::ResourceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        TranscribeError::WorkerFault { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: TranscribeError) -> Response {
    (
        status_for(&err),
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions
/// Create a session and start streaming
pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.create().await {
        Ok(session_id) => {
            info!("Session {} created over HTTP", session_id);
            (
                StatusCode::CREATED,
                Json(CreateSessionResponse {
                    session_id,
                    status: "streaming".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!("Failed to create session: {}", e);
            error_response(e)
        }
    }
}

/// POST /sessions/:session_id/audio
/// Queue one chunk of raw PCM audio (request body)
pub async fn push_audio(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let session = match state.registry.get(&session_id) {
        Ok(session) => session,
        Err(e) => return error_response(e),
    };

    let bytes = body.len();
    match session.enqueue(body).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(AudioAcceptedResponse { session_id, bytes }),
        )
            .into_response(),
        Err(e) => {
            debug!("Rejected audio for session {}: {}", session_id, e);
            error_response(e)
        }
    }
}

/// POST /sessions/:session_id/stop
/// Stop a session, wait for its final result and remove it
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping session {} over HTTP", session_id);

    match state.registry.shutdown_session(&session_id).await {
        Ok(result) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                session_id,
                status: "stopped".to_string(),
                result,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop session {}: {}", session_id, e);
            error_response(e)
        }
    }
}

/// GET /sessions/:session_id
/// Get statistics for a live session
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&session_id) {
        Ok(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /sessions
/// List live sessions and the most recently stopped ones
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let mut sessions = state.registry.ids();
    sessions.sort();

    Json(ListSessionsResponse {
        sessions,
        recently_stopped: state.registry.recently_stopped(),
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
