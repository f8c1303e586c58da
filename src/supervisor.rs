//! Connection Supervisor
//!
//! Owns the single connection to the platform:
//! - protocol-level calls are serialized behind one async mutex
//! - calls made while disconnected reconnect first
//! - authorization is cached in an atomic so `is_authorized()` never waits

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::sync::Mutex;

use crate::error::GatewayError;
use crate::platform::{
    ClientError, ContainerHandle, OutgoingDocument, PlatformClient, ProgressFn, RemoteDocument,
    RemoteMessage, SignInOutcome, UploadedFile,
};

/// Shared handle to the platform connection
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    client: Arc<dyn PlatformClient>,
    connected: AtomicBool,
    authorized: AtomicBool,
    /// Serializes protocol-level calls on the connection
    io: Mutex<()>,
}

impl ConnectionSupervisor {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                client,
                connected: AtomicBool::new(false),
                authorized: AtomicBool::new(false),
                io: Mutex::new(()),
            }),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect and refresh the cached authorization flag. Idempotent.
    pub async fn connect(&self) -> Result<(), GatewayError> {
        let _io = self.inner.io.lock().await;
        self.connect_locked().await
    }

    async fn connect_locked(&self) -> Result<(), GatewayError> {
        if !self.inner.connected.load(Ordering::Acquire) {
            self.inner
                .client
                .connect()
                .await
                .map_err(|e| GatewayError::Connection(e.to_string()))?;
            self.inner.connected.store(true, Ordering::Release);
            tracing::info!("Connected to platform");
        }

        let authorized = self
            .inner
            .client
            .is_authorized()
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;
        self.inner.authorized.store(authorized, Ordering::Release);
        Ok(())
    }

    /// Release the connection. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let _io = self.inner.io.lock().await;
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.inner.client.disconnect().await {
                tracing::warn!(error = %e, "Disconnect reported an error");
            }
            tracing::info!("Disconnected from platform");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Non-blocking view of session authorization
    pub fn is_authorized(&self) -> bool {
        self.inner.authorized.load(Ordering::Acquire)
    }

    /// Record a completed sign-in
    pub fn mark_authorized(&self) {
        self.inner.authorized.store(true, Ordering::Release);
    }

    /// Reconnect if needed, then hold the connection for one protocol call
    async fn acquire(&self) -> Result<tokio::sync::MutexGuard<'_, ()>, GatewayError> {
        let guard = self.inner.io.lock().await;
        if !self.inner.connected.load(Ordering::Acquire) {
            self.connect_locked().await?;
        }
        Ok(guard)
    }

    /// Clear the authorization flag when the platform revokes the session
    fn observe<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if matches!(result, Err(ClientError::Unauthorized)) {
            if self.inner.authorized.swap(false, Ordering::AcqRel) {
                tracing::warn!("Platform session is no longer authorized");
            }
        }
        result
    }

    // ========================================================================
    // Handshake calls
    // ========================================================================

    pub async fn send_login_code(&self, identity: &str) -> Result<String, ClientError> {
        let _io = self.acquire().await.map_err(into_transport)?;
        self.inner.client.send_login_code(identity).await
    }

    pub async fn sign_in(
        &self,
        identity: &str,
        code: &str,
        correlation_token: &str,
    ) -> Result<SignInOutcome, ClientError> {
        let _io = self.acquire().await.map_err(into_transport)?;
        let outcome = self
            .inner
            .client
            .sign_in(identity, code, correlation_token)
            .await?;
        if outcome == SignInOutcome::Authorized {
            self.mark_authorized();
        }
        Ok(outcome)
    }

    pub async fn check_password(&self, secret: &str) -> Result<(), ClientError> {
        let _io = self.acquire().await.map_err(into_transport)?;
        self.inner.client.check_password(secret).await?;
        self.mark_authorized();
        Ok(())
    }

    // ========================================================================
    // Object calls
    // ========================================================================

    /// Resolve a container id to a routable handle
    pub async fn resolve_container(&self, id: &str) -> Result<ContainerHandle, GatewayError> {
        let _io = self.acquire().await?;
        let resolved = self.observe(self.inner.client.resolve_container(id).await)?;
        resolved.ok_or_else(|| GatewayError::NotFound(format!("container {}", id)))
    }

    pub async fn get_message(
        &self,
        container: &ContainerHandle,
        id: i64,
    ) -> Result<Option<RemoteMessage>, ClientError> {
        let _io = self.acquire().await.map_err(into_transport)?;
        self.observe(self.inner.client.get_message(container, id).await)
    }

    pub async fn send_document(
        &self,
        container: &ContainerHandle,
        document: OutgoingDocument,
    ) -> Result<RemoteMessage, ClientError> {
        let _io = self.acquire().await.map_err(into_transport)?;
        self.observe(self.inner.client.send_document(container, document).await)
    }

    /// Chunked upload. Runs outside the protocol lock; the client library
    /// serializes its own part requests.
    pub async fn upload_chunked(
        &self,
        path: &Path,
        on_progress: &ProgressFn,
    ) -> Result<UploadedFile, ClientError> {
        drop(self.acquire().await.map_err(into_transport)?);
        self.observe(self.inner.client.upload_chunked(path, on_progress).await)
    }

    /// Chunked download. Runs outside the protocol lock.
    pub async fn download_chunked(
        &self,
        document: &RemoteDocument,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        on_progress: &ProgressFn,
    ) -> Result<u64, ClientError> {
        drop(self.acquire().await.map_err(into_transport)?);
        self.observe(
            self.inner
                .client
                .download_chunked(document, sink, on_progress)
                .await,
        )
    }
}

fn into_transport(err: GatewayError) -> ClientError {
    ClientError::Transport(err.to_string())
}
