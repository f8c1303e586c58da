//! Interactive Login Handshake
//!
//! Drives the multi-request sign-in sequence:
//! 1. `begin_handshake` dispatches a one-time code and keeps the correlation token
//! 2. `submit_code` signs in with code + token
//! 3. `submit_second_factor` completes accounts protected by a password
//!
//! A rejected code is terminal (codes are single-use); a rejected password is
//! retryable. All transitions run under one mutex held across the round trip.
//! Each transition publishes a copy of the phase that readers take without
//! waiting on an in-flight sign-in.

pub mod types;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::platform::{ClientError, SignInOutcome};
use crate::supervisor::ConnectionSupervisor;

pub use types::{AuthPhase, AuthSnapshot, AuthState};

const SESSION_REVOKED: &str = "The platform session is no longer authorized. Request a new code to sign in again.";

/// Single-account handshake state machine
#[derive(Clone)]
pub struct AuthMachine {
    inner: Arc<AuthMachineInner>,
}

struct AuthMachineInner {
    supervisor: ConnectionSupervisor,
    /// Account the code is dispatched to
    identity: String,
    state: Mutex<AuthState>,
    /// Last committed view of `state`
    published: RwLock<AuthSnapshot>,
}

impl AuthMachine {
    pub fn new(supervisor: ConnectionSupervisor, identity: impl Into<String>) -> Self {
        let state = AuthState::new();
        Self {
            inner: Arc::new(AuthMachineInner {
                supervisor,
                identity: identity.into(),
                published: RwLock::new(AuthSnapshot::from(&state)),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn identity(&self) -> &str {
        &self.inner.identity
    }

    /// Current phase and last error. Never waits on a transition.
    ///
    /// An `Authorized` phase whose session the platform has since revoked
    /// reads as `Uninitialized`, so the handshake can be started again.
    pub fn snapshot(&self) -> AuthSnapshot {
        let snapshot = self.inner.published.read().clone();
        if snapshot.phase == AuthPhase::Authorized && !self.inner.supervisor.is_authorized() {
            return AuthSnapshot {
                phase: AuthPhase::Uninitialized,
                last_error: Some(SESSION_REVOKED.to_string()),
            };
        }
        snapshot
    }

    /// Full copy of the record, including the correlation token
    pub async fn state(&self) -> AuthState {
        self.inner.state.lock().await.clone()
    }

    fn publish(&self, state: &AuthState) {
        *self.inner.published.write() = AuthSnapshot::from(state);
    }

    /// Adopt a session the platform already considers authorized
    pub async fn sync_with_session(&self) -> AuthPhase {
        let mut state = self.inner.state.lock().await;
        if self.inner.supervisor.is_authorized() {
            state.authorized();
            self.publish(&state);
        }
        state.phase
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Dispatch a one-time code.
    ///
    /// Accepted from `Uninitialized`, `Failed` and `CodeSent` (re-dispatch).
    /// A revoked session also allows restarting from `Authorized`.
    pub async fn begin_handshake(&self) -> Result<AuthPhase, GatewayError> {
        let mut state = self.inner.state.lock().await;
        let result = self.dispatch_code(&mut state).await;
        self.publish(&state);
        result
    }

    /// Sign in with the dispatched code. Only valid in `CodeSent`.
    pub async fn submit_code(&self, code: &str) -> Result<AuthPhase, GatewayError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(GatewayError::BadRequest("code must not be empty".to_string()));
        }

        let mut state = self.inner.state.lock().await;
        let result = self.sign_in(&mut state, code).await;
        self.publish(&state);
        result
    }

    /// Complete sign-in with the second factor. Only valid in `PasswordRequired`;
    /// a rejected secret leaves the phase unchanged, any other failure ends
    /// the handshake.
    pub async fn submit_second_factor(&self, secret: &str) -> Result<AuthPhase, GatewayError> {
        if secret.is_empty() {
            return Err(GatewayError::BadRequest("password must not be empty".to_string()));
        }

        let mut state = self.inner.state.lock().await;
        let result = self.check_password(&mut state, secret).await;
        self.publish(&state);
        result
    }

    async fn dispatch_code(&self, state: &mut AuthState) -> Result<AuthPhase, GatewayError> {
        let supervisor = &self.inner.supervisor;

        match state.phase {
            AuthPhase::PasswordRequired => {
                return Err(GatewayError::InvalidState(
                    "a password is expected, submit it to /auth/password".to_string(),
                ));
            }
            AuthPhase::Authorized if supervisor.is_authorized() => {
                return Err(GatewayError::InvalidState("already authorized".to_string()));
            }
            _ => {}
        }

        if supervisor.is_authorized() {
            state.authorized();
            return Ok(state.phase);
        }

        match supervisor.send_login_code(&self.inner.identity).await {
            Ok(token) if !token.is_empty() => {
                state.code_sent(token);
                tracing::info!(identity = %self.inner.identity, "Verification code sent");
                Ok(state.phase)
            }
            Ok(_) => {
                let message = "platform returned an empty correlation token".to_string();
                state.failed(message.clone());
                Err(GatewayError::Internal(message))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to send verification code");
                state.failed(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn sign_in(&self, state: &mut AuthState, code: &str) -> Result<AuthPhase, GatewayError> {
        if state.phase != AuthPhase::CodeSent {
            return Err(GatewayError::InvalidState("no code expected".to_string()));
        }
        let token = state
            .correlation_token
            .clone()
            .ok_or_else(|| GatewayError::Internal("code sent without a correlation token".to_string()))?;

        match self
            .inner
            .supervisor
            .sign_in(&self.inner.identity, code, &token)
            .await
        {
            Ok(SignInOutcome::Authorized) => {
                state.authorized();
                tracing::info!("Authorized with verification code");
                Ok(state.phase)
            }
            Ok(SignInOutcome::SecondFactorRequired) => {
                state.password_required();
                tracing::info!("2FA password required");
                Ok(state.phase)
            }
            Err(e @ (ClientError::InvalidCode | ClientError::CodeExpired)) => {
                tracing::warn!(error = %e, "Verification code rejected");
                state.failed(format!("{}. Request a new code to try again.", e));
                Err(GatewayError::Credential(e.to_string()))
            }
            Err(e) => {
                tracing::error!(error = %e, "Sign-in failed");
                state.failed(e.to_string());
                Err(e.into())
            }
        }
    }

    async fn check_password(
        &self,
        state: &mut AuthState,
        secret: &str,
    ) -> Result<AuthPhase, GatewayError> {
        if state.phase != AuthPhase::PasswordRequired {
            return Err(GatewayError::InvalidState("no password expected".to_string()));
        }

        match self.inner.supervisor.check_password(secret).await {
            Ok(()) => {
                state.authorized();
                tracing::info!("Authorized with 2FA password");
                Ok(state.phase)
            }
            Err(e @ ClientError::InvalidPassword) => {
                tracing::warn!(error = %e, "2FA password rejected");
                state.last_error = Some(format!("Invalid password: {}", e));
                Err(GatewayError::Credential(e.to_string()))
            }
            Err(e) => {
                tracing::error!(error = %e, "2FA sign-in failed");
                state.failed(format!("{}. Request a new code to try again.", e));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{LocalPlatform, LocalPlatformOptions};
    use tempfile::TempDir;

    const CODE: &str = "24680";

    fn machine_with(dir: &TempDir, root: std::path::PathBuf, password: Option<&str>) -> AuthMachine {
        let platform = Arc::new(LocalPlatform::new(LocalPlatformOptions {
            root,
            session_path: dir.path().join("test.session"),
            password: password.map(str::to_string),
            login_code: Some(CODE.to_string()),
        }));
        AuthMachine::new(ConnectionSupervisor::new(platform), "+15550100")
    }

    fn machine(dir: &TempDir, password: Option<&str>) -> AuthMachine {
        machine_with(dir, dir.path().join("platform"), password)
    }

    async fn in_password_phase(dir: &TempDir) -> AuthMachine {
        let auth = machine(dir, Some("hunter2"));
        auth.begin_handshake().await.unwrap();
        auth.submit_code(CODE).await.unwrap();
        auth
    }

    #[tokio::test]
    async fn test_begin_handshake_stores_token() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);

        let phase = auth.begin_handshake().await.unwrap();

        let state = auth.state().await;
        assert_eq!(phase, AuthPhase::CodeSent);
        assert!(state.correlation_token.as_deref().is_some_and(|t| !t.is_empty()));
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_failure_moves_to_failed() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let auth = machine_with(&dir, blocker.join("platform"), None);

        let result = auth.begin_handshake().await;

        assert!(matches!(result, Err(GatewayError::Connection(_))));
        let state = auth.state().await;
        assert_eq!(state.phase, AuthPhase::Failed);
        assert!(state.correlation_token.is_none());
        assert!(state.last_error.is_some());
    }

    #[tokio::test]
    async fn test_submit_code_out_of_phase_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();

        // Uninitialized
        let fresh = machine(&dir, None);
        let before = fresh.state().await;
        for _ in 0..3 {
            let result = fresh.submit_code(CODE).await;
            assert!(matches!(result, Err(GatewayError::InvalidState(_))));
        }
        assert_eq!(fresh.state().await, before);

        // PasswordRequired
        let dir2 = TempDir::new().unwrap();
        let waiting = in_password_phase(&dir2).await;
        let before = waiting.state().await;
        let result = waiting.submit_code(CODE).await;
        assert!(matches!(result, Err(GatewayError::InvalidState(_))));
        assert_eq!(waiting.state().await, before);
    }

    #[tokio::test]
    async fn test_correct_code_authorizes() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();

        let phase = auth.submit_code(CODE).await.unwrap();

        assert_eq!(phase, AuthPhase::Authorized);
        let state = auth.state().await;
        assert!(state.correlation_token.is_none());

        // Terminal: further codes are out of phase
        let again = auth.submit_code(CODE).await;
        assert!(matches!(again, Err(GatewayError::InvalidState(_))));
        assert_eq!(auth.state().await.phase, AuthPhase::Authorized);
    }

    #[tokio::test]
    async fn test_correct_code_with_password_requires_second_factor() {
        let dir = TempDir::new().unwrap();
        let auth = in_password_phase(&dir).await;

        let state = auth.state().await;
        assert_eq!(state.phase, AuthPhase::PasswordRequired);
        assert!(state.correlation_token.is_none());
    }

    #[tokio::test]
    async fn test_wrong_code_is_terminal() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();

        let result = auth.submit_code("00000").await;
        assert!(matches!(result, Err(GatewayError::Credential(_))));

        let state = auth.state().await;
        assert_eq!(state.phase, AuthPhase::Failed);
        assert!(state.correlation_token.is_none());
        assert!(state.last_error.is_some());

        // Even the right code is refused until the handshake restarts
        let retry = auth.submit_code(CODE).await;
        assert!(matches!(retry, Err(GatewayError::InvalidState(_))));
        assert_eq!(auth.state().await, state);

        assert_eq!(auth.begin_handshake().await.unwrap(), AuthPhase::CodeSent);
        assert_eq!(auth.submit_code(CODE).await.unwrap(), AuthPhase::Authorized);
    }

    #[tokio::test]
    async fn test_wrong_password_is_retryable() {
        let dir = TempDir::new().unwrap();
        let auth = in_password_phase(&dir).await;

        let result = auth.submit_second_factor("wrong").await;
        assert!(matches!(result, Err(GatewayError::Credential(_))));

        let state = auth.state().await;
        assert_eq!(state.phase, AuthPhase::PasswordRequired);
        assert!(state.last_error.is_some());

        let phase = auth.submit_second_factor("hunter2").await.unwrap();
        assert_eq!(phase, AuthPhase::Authorized);
        assert!(auth.state().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_second_factor_out_of_phase() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();
        let before = auth.state().await;

        let result = auth.submit_second_factor("hunter2").await;

        assert!(matches!(result, Err(GatewayError::InvalidState(_))));
        assert_eq!(auth.state().await, before);
    }

    #[tokio::test]
    async fn test_begin_rejected_while_password_expected() {
        let dir = TempDir::new().unwrap();
        let auth = in_password_phase(&dir).await;

        let result = auth.begin_handshake().await;

        assert!(matches!(result, Err(GatewayError::InvalidState(_))));
        assert_eq!(auth.state().await.phase, AuthPhase::PasswordRequired);
    }

    #[tokio::test]
    async fn test_second_factor_io_failure_ends_handshake() {
        let dir = TempDir::new().unwrap();
        let auth = in_password_phase(&dir).await;

        // The session artifact cannot be written over a directory
        let session = dir.path().join("test.session");
        std::fs::create_dir(&session).unwrap();

        let result = auth.submit_second_factor("hunter2").await;
        assert!(matches!(result, Err(GatewayError::Internal(_))));

        let state = auth.state().await;
        assert_eq!(state.phase, AuthPhase::Failed);
        assert!(state.last_error.is_some());
        assert_eq!(auth.snapshot().phase, AuthPhase::Failed);

        std::fs::remove_dir(&session).unwrap();
        assert_eq!(auth.begin_handshake().await.unwrap(), AuthPhase::CodeSent);
        assert_eq!(auth.submit_code(CODE).await.unwrap(), AuthPhase::PasswordRequired);
        assert_eq!(
            auth.submit_second_factor("hunter2").await.unwrap(),
            AuthPhase::Authorized
        );
    }

    #[tokio::test]
    async fn test_revoked_session_reopens_handshake() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();
        auth.submit_code(CODE).await.unwrap();
        assert_eq!(auth.snapshot().phase, AuthPhase::Authorized);

        std::fs::remove_file(dir.path().join("test.session")).unwrap();
        let result = auth.inner.supervisor.resolve_container("1001").await;
        assert!(matches!(result, Err(GatewayError::NotReady)));

        let snapshot = auth.snapshot();
        assert_eq!(snapshot.phase, AuthPhase::Uninitialized);
        assert!(snapshot.last_error.is_some());

        assert_eq!(auth.begin_handshake().await.unwrap(), AuthPhase::CodeSent);
        assert!(auth.snapshot().needs_code());
        assert_eq!(auth.submit_code(CODE).await.unwrap(), AuthPhase::Authorized);
        assert_eq!(auth.snapshot().phase, AuthPhase::Authorized);
        assert!(auth.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_does_not_wait_for_transition() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();

        // A sign-in round trip holds the record lock
        let _held = auth.inner.state.lock().await;

        let snapshot = auth.snapshot();
        assert!(snapshot.needs_code());
        assert!(!snapshot.needs_password());
    }

    #[tokio::test]
    async fn test_resend_replaces_token() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();
        let first = auth.state().await.correlation_token;

        auth.begin_handshake().await.unwrap();
        let second = auth.state().await.correlation_token;

        assert_ne!(first, second);
        assert_eq!(auth.submit_code(CODE).await.unwrap(), AuthPhase::Authorized);
    }

    #[tokio::test]
    async fn test_blank_code_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();
        let before = auth.state().await;

        let result = auth.submit_code("   ").await;

        assert!(matches!(result, Err(GatewayError::BadRequest(_))));
        assert_eq!(auth.state().await, before);
    }

    #[tokio::test]
    async fn test_existing_session_skips_dispatch() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();
        auth.submit_code(CODE).await.unwrap();

        // A new process over the same session artifact
        let restarted = machine(&dir, None);
        restarted.inner.supervisor.connect().await.unwrap();

        assert_eq!(restarted.sync_with_session().await, AuthPhase::Authorized);
        assert!(matches!(
            restarted.begin_handshake().await,
            Err(GatewayError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_serialized() {
        let dir = TempDir::new().unwrap();
        let auth = machine(&dir, None);
        auth.begin_handshake().await.unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let auth = auth.clone();
                tokio::spawn(async move { auth.submit_code(CODE).await })
            })
            .collect();

        let mut authorized = 0;
        let mut out_of_phase = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(AuthPhase::Authorized) => authorized += 1,
                Err(GatewayError::InvalidState(_)) => out_of_phase += 1,
                other => panic!("unexpected result: {:?}", other),
            }
        }

        assert_eq!(authorized, 1);
        assert_eq!(out_of_phase, 4);
    }
}
