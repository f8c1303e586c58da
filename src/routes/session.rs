//! Session backup endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::error::{GatewayError, Result};
use crate::session::{self, SessionBackup};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/session/backup", get(backup_session))
}

/// GET /session/backup
///
/// Base64 copy of the session artifact, for hosts without persistent disks.
async fn backup_session(State(state): State<AppState>) -> Result<Json<SessionBackup>> {
    if !state.supervisor().is_authorized() {
        return Err(GatewayError::NotReady);
    }

    let path = &state.config().account.session_path;
    let backup = session::backup(path)
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to read session: {}", e)))?
        .ok_or_else(|| GatewayError::NotFound("session file".to_string()))?;

    tracing::info!(path = %path.display(), "Session exported");
    Ok(Json(backup))
}
