//! Handshake state types

use serde::Serialize;

/// Handshake phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Uninitialized,
    CodeSent,
    PasswordRequired,
    Authorized,
    Failed,
}

/// Process-wide handshake record.
///
/// `correlation_token` is set iff `phase == CodeSent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub phase: AuthPhase,
    pub correlation_token: Option<String>,
    pub last_error: Option<String>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            phase: AuthPhase::Uninitialized,
            correlation_token: None,
            last_error: None,
        }
    }

    pub(crate) fn code_sent(&mut self, token: String) {
        self.phase = AuthPhase::CodeSent;
        self.correlation_token = Some(token);
        self.last_error = None;
    }

    pub(crate) fn password_required(&mut self) {
        self.phase = AuthPhase::PasswordRequired;
        self.correlation_token = None;
        self.last_error = None;
    }

    pub(crate) fn authorized(&mut self) {
        self.phase = AuthPhase::Authorized;
        self.correlation_token = None;
        self.last_error = None;
    }

    pub(crate) fn failed(&mut self, error: String) {
        self.phase = AuthPhase::Failed;
        self.correlation_token = None;
        self.last_error = Some(error);
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of the handshake for rendering and health checks
#[derive(Debug, Clone, Serialize)]
pub struct AuthSnapshot {
    pub phase: AuthPhase,
    pub last_error: Option<String>,
}

impl AuthSnapshot {
    pub fn needs_code(&self) -> bool {
        self.phase == AuthPhase::CodeSent
    }

    pub fn needs_password(&self) -> bool {
        self.phase == AuthPhase::PasswordRequired
    }
}

impl From<&AuthState> for AuthSnapshot {
    fn from(state: &AuthState) -> Self {
        Self {
            phase: state.phase,
            last_error: state.last_error.clone(),
        }
    }
}
