//! Route modules for Ferry Server

pub mod auth;
pub mod health;
pub mod session;
pub mod transfer;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload_bytes = state.config().transfer.max_upload_bytes;

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(transfer::router(max_upload_bytes))
        .merge(session::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
