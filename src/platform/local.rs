//! Local Platform Backend
//!
//! Filesystem emulation of the messaging platform:
//! - `containers/<id>/` is a container, `containers/<id>/<message>.json` a message
//! - `blobs/<file_id>` holds uploaded bytes
//! - the session artifact is a JSON file at the configured session path
//! - login codes are "dispatched" to the log

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use super::types::{
    ContainerHandle, OutgoingDocument, ProgressFn, RemoteDocument, RemoteMessage, SignInOutcome,
    UploadedFile,
};
use super::{ClientError, PlatformClient};

/// Size of one transfer part
pub const PART_SIZE: usize = 512 * 1024;

/// Settings for the local backend
#[derive(Debug, Clone)]
pub struct LocalPlatformOptions {
    pub root: PathBuf,
    pub session_path: PathBuf,
    /// Second-factor secret (None = code alone signs in)
    pub password: Option<String>,
    /// Fixed login code (None = generated per dispatch)
    pub login_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    identity: String,
    authorized_at: DateTime<Utc>,
}

struct PendingCode {
    identity: String,
    code: String,
}

#[derive(Default)]
struct LoginState {
    /// Correlation token -> dispatched code
    codes: HashMap<String, PendingCode>,
    /// Identity waiting for its second factor
    awaiting_password: Option<String>,
}

/// Filesystem-backed platform client
pub struct LocalPlatform {
    options: LocalPlatformOptions,
    connected: AtomicBool,
    login: Mutex<LoginState>,
    /// Serializes message id allocation
    publish_lock: tokio::sync::Mutex<()>,
}

impl LocalPlatform {
    pub fn new(options: LocalPlatformOptions) -> Self {
        Self {
            options,
            connected: AtomicBool::new(false),
            login: Mutex::new(LoginState::default()),
            publish_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Create a container if it does not exist yet
    pub async fn ensure_container(&self, id: &str) -> Result<ContainerHandle, ClientError> {
        if !is_valid_container_id(id) {
            return Err(ClientError::Rejected(format!("invalid container id: {}", id)));
        }
        tokio::fs::create_dir_all(self.container_dir(id)).await?;
        Ok(ContainerHandle { id: id.to_string() })
    }

    fn containers_dir(&self) -> PathBuf {
        self.options.root.join("containers")
    }

    fn container_dir(&self, id: &str) -> PathBuf {
        self.containers_dir().join(id)
    }

    fn blobs_dir(&self) -> PathBuf {
        self.options.root.join("blobs")
    }

    fn blob_path(&self, file_id: &str) -> PathBuf {
        self.blobs_dir().join(file_id)
    }

    fn message_path(&self, container: &ContainerHandle, id: i64) -> PathBuf {
        self.container_dir(&container.id).join(format!("{}.json", id))
    }

    fn require_connected(&self) -> Result<(), ClientError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ClientError::Transport("not connected".to_string()))
        }
    }

    async fn require_authorized(&self) -> Result<(), ClientError> {
        self.require_connected()?;
        if self.read_session().await.is_some() {
            Ok(())
        } else {
            Err(ClientError::Unauthorized)
        }
    }

    async fn read_session(&self) -> Option<SessionRecord> {
        let raw = tokio::fs::read(&self.options.session_path).await.ok()?;
        serde_json::from_slice(&raw).ok()
    }

    async fn write_session(&self, identity: String) -> Result<(), ClientError> {
        let record = SessionRecord {
            identity,
            authorized_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| ClientError::Rejected(e.to_string()))?;

        if let Some(parent) = self.options.session_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.options.session_path, json).await?;

        tracing::info!(
            session = %self.options.session_path.display(),
            "Session artifact written"
        );
        Ok(())
    }

    async fn next_message_id(&self, container: &ContainerHandle) -> Result<i64, ClientError> {
        let mut max_id = 0;
        let mut entries = tokio::fs::read_dir(self.container_dir(&container.id)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<i64>().ok());
            if let Some(id) = id {
                max_id = max_id.max(id);
            }
        }
        Ok(max_id + 1)
    }

    fn generate_code(&self) -> String {
        match &self.options.login_code {
            Some(code) => code.clone(),
            None => format!("{:05}", Uuid::new_v4().as_u128() % 100_000),
        }
    }

    async fn copy_parts(
        &self,
        source: &Path,
        target: &Path,
        on_progress: &ProgressFn,
    ) -> Result<(u64, u32), ClientError> {
        let mut input = tokio::fs::File::open(source).await?;
        let total = input.metadata().await?.len();
        let mut output = tokio::fs::File::create(target).await?;

        let mut buffer = vec![0u8; PART_SIZE];
        let mut current = 0u64;
        let mut parts = 0u32;

        loop {
            let n = input.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            output.write_all(&buffer[..n]).await?;
            current += n as u64;
            parts += 1;
            on_progress(current, total);
        }
        output.flush().await?;

        if parts == 0 {
            on_progress(0, 0);
        }

        Ok((current, parts))
    }
}

#[async_trait]
impl PlatformClient for LocalPlatform {
    async fn connect(&self) -> Result<(), ClientError> {
        for dir in [self.containers_dir(), self.blobs_dir()] {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                ClientError::Transport(format!("cannot open {}: {}", dir.display(), e))
            })?;
        }
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, ClientError> {
        self.require_connected()?;
        Ok(self.read_session().await.is_some())
    }

    async fn send_login_code(&self, identity: &str) -> Result<String, ClientError> {
        self.require_connected()?;

        let token = Uuid::new_v4().simple().to_string();
        let code = self.generate_code();

        tracing::warn!(identity = %identity, code = %code, "Login code dispatched");

        let mut login = self.login.lock();
        login.codes.insert(
            token.clone(),
            PendingCode {
                identity: identity.to_string(),
                code,
            },
        );
        login.awaiting_password = None;

        Ok(token)
    }

    async fn sign_in(
        &self,
        identity: &str,
        code: &str,
        correlation_token: &str,
    ) -> Result<SignInOutcome, ClientError> {
        self.require_connected()?;

        // Codes are single-use: the token is consumed by any attempt
        let pending = self
            .login
            .lock()
            .codes
            .remove(correlation_token)
            .ok_or(ClientError::CodeExpired)?;

        if pending.identity != identity || pending.code != code.trim() {
            return Err(ClientError::InvalidCode);
        }

        if self.options.password.is_some() {
            self.login.lock().awaiting_password = Some(pending.identity);
            return Ok(SignInOutcome::SecondFactorRequired);
        }

        self.write_session(pending.identity).await?;
        Ok(SignInOutcome::Authorized)
    }

    async fn check_password(&self, secret: &str) -> Result<(), ClientError> {
        self.require_connected()?;

        let identity = self
            .login
            .lock()
            .awaiting_password
            .clone()
            .ok_or_else(|| ClientError::Rejected("no password sign-in pending".to_string()))?;

        if self.options.password.as_deref() != Some(secret) {
            return Err(ClientError::InvalidPassword);
        }

        self.write_session(identity).await?;
        self.login.lock().awaiting_password = None;
        Ok(())
    }

    async fn upload_chunked(
        &self,
        path: &Path,
        on_progress: &ProgressFn,
    ) -> Result<UploadedFile, ClientError> {
        self.require_authorized().await?;

        let file_id = Uuid::new_v4().simple().to_string();
        let mut part = PartFile::new(self.blobs_dir().join(format!("{}.part", file_id)));

        let (size, parts) = self.copy_parts(path, &part.path, on_progress).await?;
        tokio::fs::rename(&part.path, self.blob_path(&file_id)).await?;
        part.committed = true;

        Ok(UploadedFile {
            file_id,
            size,
            parts,
        })
    }

    async fn download_chunked(
        &self,
        document: &RemoteDocument,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        on_progress: &ProgressFn,
    ) -> Result<u64, ClientError> {
        self.require_authorized().await?;

        let path = self.blob_path(&document.file_id);
        let mut input = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ClientError::NotFound(format!("file {}", document.file_id)));
            }
            Err(e) => return Err(e.into()),
        };

        let total = document.size;
        let mut buffer = vec![0u8; PART_SIZE];
        let mut current = 0u64;

        loop {
            let n = input.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buffer[..n]).await?;
            current += n as u64;
            on_progress(current, total);
        }
        sink.flush().await?;

        if current == 0 {
            on_progress(0, total);
        }

        Ok(current)
    }

    async fn resolve_container(&self, id: &str) -> Result<Option<ContainerHandle>, ClientError> {
        self.require_authorized().await?;

        if !is_valid_container_id(id) {
            return Ok(None);
        }
        match tokio::fs::metadata(self.container_dir(id)).await {
            Ok(meta) if meta.is_dir() => Ok(Some(ContainerHandle { id: id.to_string() })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_message(
        &self,
        container: &ContainerHandle,
        id: i64,
    ) -> Result<Option<RemoteMessage>, ClientError> {
        self.require_authorized().await?;

        let raw = match tokio::fs::read(self.message_path(container, id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| ClientError::Rejected(format!("corrupt message {}: {}", id, e)))
    }

    async fn send_document(
        &self,
        container: &ContainerHandle,
        document: OutgoingDocument,
    ) -> Result<RemoteMessage, ClientError> {
        self.require_authorized().await?;

        if tokio::fs::metadata(self.blob_path(&document.file.file_id))
            .await
            .is_err()
        {
            return Err(ClientError::NotFound(format!(
                "uploaded file {}",
                document.file.file_id
            )));
        }

        let _guard = self.publish_lock.lock().await;
        let id = self.next_message_id(container).await?;

        let message = RemoteMessage {
            id,
            date: Utc::now(),
            caption: document.caption,
            document: Some(RemoteDocument {
                file_id: document.file.file_id,
                size: document.file.size,
                mime_type: Some(document.mime_type),
                attributes: document.attributes,
            }),
        };

        let json =
            serde_json::to_vec_pretty(&message).map_err(|e| ClientError::Rejected(e.to_string()))?;
        tokio::fs::write(self.message_path(container, id), json).await?;

        Ok(message)
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.connected.store(false, Ordering::Release);
        Ok(())
    }
}

/// In-progress blob, removed unless the upload commits it
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Partial blob removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clean up partial blob"
            ),
        }
    }
}

/// Container ids are used as directory names
fn is_valid_container_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
