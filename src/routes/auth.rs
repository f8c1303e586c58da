//! Auth Routes
//!
//! Browser-facing handshake pages.
//!
//! Endpoints:
//! - GET /auth - page for the current phase
//! - POST /auth/start - dispatch (or re-dispatch) a login code
//! - POST /auth/code - submit the login code
//! - POST /auth/password - submit the second factor

use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;

use crate::auth::AuthPhase;
use crate::error::GatewayError;
use crate::html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth", get(auth_page))
        .route("/auth/start", post(start))
        .route("/auth/code", post(submit_code))
        .route("/auth/password", post(submit_password))
}

#[derive(Debug, Deserialize)]
pub struct CodeForm {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    pub password: String,
}

/// GET /auth
async fn auth_page(State(state): State<AppState>) -> Html<String> {
    let auth = state.auth();
    Html(html::auth_page(&auth.snapshot(), auth.identity()))
}

/// POST /auth/start
async fn start(State(state): State<AppState>) -> Response {
    render(state.auth().begin_handshake().await)
}

/// POST /auth/code
async fn submit_code(State(state): State<AppState>, Form(form): Form<CodeForm>) -> Response {
    render(state.auth().submit_code(&form.code).await)
}

/// POST /auth/password
async fn submit_password(
    State(state): State<AppState>,
    Form(form): Form<PasswordForm>,
) -> Response {
    render(state.auth().submit_second_factor(&form.password).await)
}

/// Handshake results are pages, rejections keep their error status
fn render(result: Result<AuthPhase, GatewayError>) -> Response {
    match result {
        Ok(phase) => Html(html::outcome_page(phase)).into_response(),
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                tracing::error!(error = %e, "Handshake step failed");
            } else {
                tracing::info!(error = %e, "Handshake step rejected");
            }
            let heading = match &e {
                GatewayError::Credential(_) => "Invalid Credentials",
                GatewayError::InvalidState(_) => "Unexpected Step",
                GatewayError::BadRequest(_) => "Invalid Input",
                _ => "Authorization Error",
            };
            (status, Html(html::error_page(heading, &e.to_string()))).into_response()
        }
    }
}
