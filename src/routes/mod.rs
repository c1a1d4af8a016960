//! Route modules for Vanish Server

pub mod files;
pub mod health;

use axum::{extract::DefaultBodyLimit, http::HeaderName, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{FILE_ID_HEADER, TTL_HEADER};
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config().storage.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(FILE_ID_HEADER),
            HeaderName::from_static(TTL_HEADER),
        ]);

    Router::new()
        .merge(files::router())
        .merge(health::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
