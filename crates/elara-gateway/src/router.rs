use axum::Router;
use axum::extract::State;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::api;
use crate::state::SharedState;

const LANDING_FALLBACK: &str = "Elara API is running!";

/// Build the main application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(health))
        .route("/api/ask", get(api::ask))
        .route("/api/chat", post(api::chat))
        .route("/api/sessions/{id}", delete(api::clear_session))
        .route("/api/sessions/{id}/clear", post(api::clear_session))
        .route("/api/sessions/{id}/history", get(api::session_history))
        .route("/api/export/pdf", post(api::export_pdf))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

async fn landing(State(state): State<SharedState>) -> Response {
    if let Some(path) = &state.config.gateway.landing_page {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => return Html(content).into_response(),
            Err(e) => debug!("landing page {} unreadable: {}", path.display(), e),
        }
    }
    LANDING_FALLBACK.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use elara_config::AppConfig;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_router(Arc::new(AppState::new(AppConfig::default())));
        assert_eq!(get_text(app, "/health").await, (StatusCode::OK, "ok".into()));
    }

    #[tokio::test]
    async fn landing_falls_back_to_liveness_text() {
        let mut config = AppConfig::default();
        config.gateway.landing_page = Some("/nonexistent/elara/index.html".into());
        let app = build_router(Arc::new(AppState::new(config)));
        let (status, body) = get_text(app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, LANDING_FALLBACK);
    }

    #[tokio::test]
    async fn ask_without_text_answers_with_error_text() {
        let app = build_router(Arc::new(AppState::new(AppConfig::default())));
        let (status, body) = get_text(app, "/api/ask?text=%20").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Error: No question provided.");
    }

    #[tokio::test]
    async fn ask_without_key_is_client_error() {
        let app = build_router(Arc::new(AppState::new(AppConfig::default())));
        let (status, body) = get_text(app, "/api/ask?text=hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.starts_with("Error:"));
        assert!(body.contains("API key"));
    }
}
