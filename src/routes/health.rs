//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub authorized: bool,
    pub needs_code: bool,
    pub needs_password: bool,
    pub active_transfers: usize,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.auth().snapshot();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        authorized: state.supervisor().is_authorized(),
        needs_code: snapshot.needs_code(),
        needs_password: snapshot.needs_password(),
        active_transfers: state.registry().active_count(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
