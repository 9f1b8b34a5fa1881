//! HTTP API
//!
//! JSON endpoints over the engine services. Routes:
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | [`health`] |
//! | GET, POST | `/api/files` | [`files::list`], [`files::upload`] |
//! | DELETE | `/api/files/:id` | [`files::delete`] |
//! | GET | `/api/files/:id/download` | [`files::download`] |
//! | POST | `/api/sync/reconcile` | [`sync::reconcile`] |
//! | GET | `/api/sync/replications` | [`sync::replications`] |
//! | POST | `/api/tokens/refresh` | [`sync::refresh_tokens`] |
//! | GET | `/api/accounts` | [`accounts::list`] |
//! | GET | `/api/accounts/authorize` | [`accounts::authorize`] |
//! | GET | `/api/accounts/callback` | [`accounts::callback`] |
//! | DELETE | `/api/accounts/:id` | [`accounts::remove`] |
//! | POST | `/api/accounts/:id/{activate,deactivate,default}` | [`accounts`] |
//!
//! There is no authentication layer; the API is meant to be bound to a
//! private interface.

pub mod accounts;
pub mod error;
pub mod files;
pub mod sync;

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use drivemirror_sync::Services;

pub use error::{ApiError, ApiResult};

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    /// Where multipart uploads are spooled before going to Drive
    pub staging_dir: PathBuf,
}

impl AppState {
    pub fn new(services: Services, staging_dir: PathBuf) -> Self {
        Self {
            services,
            staging_dir,
        }
    }
}

/// Builds the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/files", get(files::list).post(files::upload))
        .route("/api/files/:id", delete(files::delete))
        .route("/api/files/:id/download", get(files::download))
        .route("/api/sync/reconcile", post(sync::reconcile))
        .route("/api/sync/replications", get(sync::replications))
        .route("/api/tokens/refresh", post(sync::refresh_tokens))
        .route("/api/accounts", get(accounts::list))
        .route("/api/accounts/authorize", get(accounts::authorize))
        .route("/api/accounts/callback", get(accounts::callback))
        .route("/api/accounts/:id", delete(accounts::remove))
        .route("/api/accounts/:id/activate", post(accounts::activate))
        .route("/api/accounts/:id/deactivate", post(accounts::deactivate))
        .route("/api/accounts/:id/default", post(accounts::set_default))
        // Uploads are streamed to the staging directory, not buffered
        .layer(DefaultBodyLimit::disable())
        .with_state(state)
}

/// Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
