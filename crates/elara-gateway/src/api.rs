use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use elara_agents::ChatTurn;
use elara_common::Error;
use elara_media::{EXPORT_FILENAME, render_pdf};
use elara_security::InputValidator;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{Credentials, SharedState};

const NO_QUESTION: &str = "Error: No question provided.";

#[derive(Debug, Deserialize)]
pub struct AskQuery {
    pub text: Option<String>,
    #[serde(default)]
    pub search: bool,
    pub model: Option<String>,
}

/// GET /api/ask?text=...: stateless plain-text answer.
pub async fn ask(State(state): State<SharedState>, Query(query): Query<AskQuery>) -> Response {
    // Mobile clients read the body regardless of status, so this stays a 200.
    let Some(text) = query.text.as_deref().filter(|t| !t.trim().is_empty()) else {
        return (StatusCode::OK, NO_QUESTION).into_response();
    };
    let text = match InputValidator::validate_message(text) {
        Ok(text) => text,
        Err(e) => return plain_error(&e),
    };
    let runtime = match state.runtime_for(Credentials::default(), query.search) {
        Ok(runtime) => runtime,
        Err(e) => return plain_error(&e),
    };

    let reply = runtime
        .process_message(
            ChatTurn::new(text)
                .with_search(query.search)
                .with_model(query.model.as_deref()),
        )
        .await;
    (StatusCode::OK, reply.reply).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub session_id: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub search: bool,
    pub api_key: Option<String>,
    pub search_api_key: Option<String>,
}

/// POST /api/chat: conversational reply with session memory.
pub async fn chat(State(state): State<SharedState>, Json(body): Json<ChatRequest>) -> Response {
    let message = match InputValidator::validate_message(&body.message) {
        Ok(message) => message,
        Err(e) => return json_error(&e),
    };
    let session_id = match body
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        Some(id) => {
            if let Err(e) = InputValidator::validate_session_id(id) {
                return json_error(&e);
            }
            id.to_string()
        }
        None => uuid::Uuid::new_v4().to_string(),
    };

    let credentials = Credentials {
        api_key: body.api_key.as_deref(),
        search_api_key: body.search_api_key.as_deref(),
    };
    let runtime = match state.runtime_for(credentials, body.search) {
        Ok(runtime) => runtime,
        Err(e) => return json_error(&e),
    };

    let reply = runtime
        .process_message(
            ChatTurn::new(message)
                .with_session(&session_id)
                .with_search(body.search)
                .with_model(body.model.as_deref()),
        )
        .await;
    if !reply.completed {
        warn!("session {}: answered with busy message", session_id);
    }
    (StatusCode::OK, Json(reply)).into_response()
}

/// POST /api/sessions/{id}/clear and DELETE /api/sessions/{id}
pub async fn clear_session(State(state): State<SharedState>, Path(id): Path<String>) -> Response {
    if let Err(e) = InputValidator::validate_session_id(&id) {
        return json_error(&e);
    }
    state.sessions.clear(&id).await;
    info!("session {} cleared", id);
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "cleared", "session_id": id })),
    )
        .into_response()
}

/// GET /api/sessions/{id}/history
pub async fn session_history(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = InputValidator::validate_session_id(&id) {
        return json_error(&e);
    }
    let turns = state.sessions.recent(&id, usize::MAX).await;
    (
        StatusCode::OK,
        Json(serde_json::json!({ "session_id": id, "turns": turns })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub text: String,
}

/// POST /api/export/pdf: render text as a downloadable PDF.
pub async fn export_pdf(Json(body): Json<ExportRequest>) -> Response {
    let rendered = tokio::task::spawn_blocking(move || render_pdf(&body.text)).await;
    match rendered {
        Ok(Ok(bytes)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{EXPORT_FILENAME}\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(Err(e)) => json_error(&e),
        Err(e) => {
            warn!("pdf export task failed: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "pdf export failed")
        }
    }
}

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_error(error: &Error) -> Response {
    error_body(status_for(error), &error.to_string())
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "status": "error",
            "message": message,
        })),
    )
        .into_response()
}

fn plain_error(error: &Error) -> Response {
    (status_for(error), format!("Error: {error}")).into_response()
}
