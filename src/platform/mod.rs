//! Platform Client
//!
//! The messaging platform is reached through a client library. This module
//! defines the seam the gateway consumes:
//! - session handshake (code dispatch, code sign-in, second factor)
//! - chunked upload/download primitives with progress callbacks
//! - container resolution and message publishing/lookup
//!
//! `LocalPlatform` is a filesystem-backed implementation used for local
//! deployments and tests.

pub mod local;
pub mod types;

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

pub use local::{LocalPlatform, LocalPlatformOptions};
pub use types::*;

/// Errors surfaced by a platform client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Transport unavailable: {0}")]
    Transport(String),

    #[error("Session is not authorized")]
    Unauthorized,

    #[error("The login code is invalid")]
    InvalidCode,

    #[error("The login code has expired")]
    CodeExpired,

    #[error("The password is invalid")]
    InvalidPassword,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client library contract.
///
/// Protocol-level calls are serialized by the caller. `upload_chunked` and
/// `download_chunked` must tolerate concurrent invocations.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Open the connection without waiting for authorization
    async fn connect(&self) -> Result<(), ClientError>;

    /// Whether the stored session is authorized
    async fn is_authorized(&self) -> Result<bool, ClientError>;

    /// Dispatch a one-time login code; returns the correlation token
    async fn send_login_code(&self, identity: &str) -> Result<String, ClientError>;

    /// Sign in with a dispatched code
    async fn sign_in(
        &self,
        identity: &str,
        code: &str,
        correlation_token: &str,
    ) -> Result<SignInOutcome, ClientError>;

    /// Complete a sign-in that requires the second factor
    async fn check_password(&self, secret: &str) -> Result<(), ClientError>;

    /// Upload a staged file in parts
    async fn upload_chunked(
        &self,
        path: &Path,
        on_progress: &ProgressFn,
    ) -> Result<UploadedFile, ClientError>;

    /// Download a document into `sink`; returns the number of bytes written
    async fn download_chunked(
        &self,
        document: &RemoteDocument,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        on_progress: &ProgressFn,
    ) -> Result<u64, ClientError>;

    /// Resolve a container identifier under the current session
    async fn resolve_container(&self, id: &str) -> Result<Option<ContainerHandle>, ClientError>;

    /// Fetch one message from a container
    async fn get_message(
        &self,
        container: &ContainerHandle,
        id: i64,
    ) -> Result<Option<RemoteMessage>, ClientError>;

    /// Publish an uploaded document as a new message
    async fn send_document(
        &self,
        container: &ContainerHandle,
        document: OutgoingDocument,
    ) -> Result<RemoteMessage, ClientError>;

    /// Release the transport; repeated calls are no-ops
    async fn disconnect(&self) -> Result<(), ClientError>;
}
