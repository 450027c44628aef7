//! HTTP surface of the obfuscation service.
//!
//! Every route except `/health` sits behind HTTP Basic auth with a single
//! admin account. Bodies use the PascalCase field names of the service's
//! JSON format; errors are `{"Error": "..."}`.

use axum::{
    Json, Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use dbobfuscator_core::ObfuscationService;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod handlers;

pub use auth::{ADMIN_USER, AdminAuth, AdminCredentials};

// ---------- shared state ----------

#[derive(Clone)]
pub struct AppState {
    pub service: ObfuscationService,
    pub credentials: Arc<AdminCredentials>,
}

impl AppState {
    pub fn new(service: ObfuscationService, credentials: AdminCredentials) -> Self {
        Self {
            service,
            credentials: Arc::new(credentials),
        }
    }
}

impl FromRef<AppState> for Arc<AdminCredentials> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.credentials)
    }
}

// ---------- error type ----------

/// A JSON error response: `{"Error": "..."}` with an HTTP status.
#[derive(Debug)]
pub struct ApiErr(StatusCode, String);

impl ApiErr {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(status, msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.0
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "Error": self.1 });
        (self.0, Json(body)).into_response()
    }
}

// ---------- router ----------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/schema-info", post(handlers::schema_info))
        .route("/obfuscate", post(handlers::obfuscate))
        .route("/status/{process_id}", get(handlers::status))
        .route("/empty-progress-ctx", post(handlers::empty_progress_ctx))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
///
/// # Errors
/// Returns an I/O error if the server fails.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
