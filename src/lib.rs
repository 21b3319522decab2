use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

pub mod auth;
pub mod config;
pub mod drive;
pub mod error;
pub mod files;
pub mod forms;
pub mod guard;
pub mod resolver;
pub mod session;
pub mod token_mirror;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod testing;

use crate::{config::Config, drive::DriveApi, session::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub session_store: Arc<SessionStore>,
    pub http_client: reqwest::Client,
    pub drive: Arc<dyn DriveApi>,
}

pub fn router(state: AppState) -> Router {
    let timeout = state.config.request_timeout;
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        // Auth routes
        .route("/", get(auth::index))
        .route("/authorize", get(auth::authorize))
        .route("/oauth2callback", get(auth::oauth2callback))
        // Forms
        .route("/upload_to_folder_form", get(forms::upload_to_folder_form))
        .route("/download_form", get(forms::download_form))
        // Guarded transfer routes
        .route("/upload_by_folder_name", post(files::upload_by_folder_name))
        .route("/download_by_folder_name", get(files::download_by_folder_name))
        .route("/upload", post(files::upload))
        .route("/download/:file_id", get(files::download_by_id))
        // Health check
        .route("/health", get(health_check))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_state, MemoryDrive};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check() {
        let app = router(test_state(
            Arc::new(MemoryDrive::new()),
            Config::for_tests("http://unused"),
        ));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forms_are_public() {
        let app = router(test_state(
            Arc::new(MemoryDrive::new()),
            Config::for_tests("http://unused"),
        ));

        for uri in ["/upload_to_folder_form", "/download_form"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let mut config = Config::for_tests("http://unused");
        config.max_upload_bytes = 16;
        let app = router(test_state(Arc::new(MemoryDrive::new()), config));

        let response = app
            .oneshot(
                Request::post("/upload")
                    .header("content-type", "multipart/form-data; boundary=B")
                    .header("content-length", "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
