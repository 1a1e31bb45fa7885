//! HTTP surface: axum router, handlers and error mapping.
//!
//! Routes:
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | GET  | `/` | `{"message": "LANDING PAGE"}` |
//! | GET  | `/health` | 200, empty body |
//! | POST | `/classifier/docu_predict/` | `[{"prediction": [...]}, ...]`, all-or-nothing |
//! | POST | `/classifier/docu_predict/detailed/` | per-document outcomes, partial success |
//!
//! Every error body is `{"detail": "<message>"}` with the status from
//! [`ClassifierError::status_code`].

mod handlers;
mod routes;

pub use routes::create_router;

use crate::classify::Services;
use crate::config::ServerConfig;
use crate::error::ClassifierError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info, warn};

/// Shared state for the web server.
#[derive(Clone, Debug)]
pub struct AppState {
    pub services: Services,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(services: Services, config: &ServerConfig) -> Self {
        Self {
            services,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

impl IntoResponse for ClassifierError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed ({status}): {self}");
        } else {
            warn!("Request rejected ({status}): {self}");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Start the web server and run until Ctrl-C.
pub async fn serve(services: Services, config: &ServerConfig) -> std::io::Result<()> {
    let app = create_router(AppState::new(services, config));

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Starting server at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
