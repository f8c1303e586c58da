#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use futures::stream::{self, Stream};
use tempfile::TempDir;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use ferry_server::config::Config;
use ferry_server::platform::{
    ClientError, ContainerHandle, LocalPlatform, LocalPlatformOptions, OutgoingDocument,
    PlatformClient, ProgressFn, RemoteDocument, RemoteMessage, SignInOutcome, UploadedFile,
};
use ferry_server::state::AppState;
use ferry_server::supervisor::ConnectionSupervisor;

pub const PHONE: &str = "+15550100";
pub const LOGIN_CODE: &str = "24680";
pub const CHANNEL: &str = "1001";
pub const MIB: usize = 1024 * 1024;

//===============
// Fault injection
//===============

/// Local backend with switchable failures in the transfer primitives
pub struct FaultyPlatform {
    inner: LocalPlatform,
    pub fail_upload: AtomicBool,
    pub fail_download: AtomicBool,
    /// Park transfer primitives forever (cancellation and deadline tests)
    pub hold_transfers: AtomicBool,
    pub resolve_calls: AtomicUsize,
}

impl FaultyPlatform {
    pub fn new(options: LocalPlatformOptions) -> Self {
        Self {
            inner: LocalPlatform::new(options),
            fail_upload: AtomicBool::new(false),
            fail_download: AtomicBool::new(false),
            hold_transfers: AtomicBool::new(false),
            resolve_calls: AtomicUsize::new(0),
        }
    }

    pub fn local(&self) -> &LocalPlatform {
        &self.inner
    }

    async fn maybe_hold(&self) {
        if self.hold_transfers.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl PlatformClient for FaultyPlatform {
    async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect().await
    }

    async fn is_authorized(&self) -> Result<bool, ClientError> {
        self.inner.is_authorized().await
    }

    async fn send_login_code(&self, identity: &str) -> Result<String, ClientError> {
        self.inner.send_login_code(identity).await
    }

    async fn sign_in(
        &self,
        identity: &str,
        code: &str,
        correlation_token: &str,
    ) -> Result<SignInOutcome, ClientError> {
        self.inner.sign_in(identity, code, correlation_token).await
    }

    async fn check_password(&self, secret: &str) -> Result<(), ClientError> {
        self.inner.check_password(secret).await
    }

    async fn upload_chunked(
        &self,
        path: &Path,
        on_progress: &ProgressFn,
    ) -> Result<UploadedFile, ClientError> {
        self.maybe_hold().await;
        if self.fail_upload.load(Ordering::SeqCst) {
            on_progress(0, 1);
            return Err(ClientError::Transport("connection reset during upload".into()));
        }
        self.inner.upload_chunked(path, on_progress).await
    }

    async fn download_chunked(
        &self,
        document: &RemoteDocument,
        sink: &mut (dyn AsyncWrite + Send + Unpin),
        on_progress: &ProgressFn,
    ) -> Result<u64, ClientError> {
        self.maybe_hold().await;
        if self.fail_download.load(Ordering::SeqCst) {
            sink.write_all(b"partial").await?;
            return Err(ClientError::Transport("connection reset during download".into()));
        }
        self.inner.download_chunked(document, sink, on_progress).await
    }

    async fn resolve_container(&self, id: &str) -> Result<Option<ContainerHandle>, ClientError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_container(id).await
    }

    async fn get_message(
        &self,
        container: &ContainerHandle,
        id: i64,
    ) -> Result<Option<RemoteMessage>, ClientError> {
        self.inner.get_message(container, id).await
    }

    async fn send_document(
        &self,
        container: &ContainerHandle,
        document: OutgoingDocument,
    ) -> Result<RemoteMessage, ClientError> {
        self.inner.send_document(container, document).await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.disconnect().await
    }
}

//===============
// Test Harness
//===============

pub struct Harness {
    pub dir: TempDir,
    pub platform: Arc<FaultyPlatform>,
    pub state: AppState,
}

impl Harness {
    pub fn staging_dir(&self) -> PathBuf {
        self.state.config().transfer.staging_dir.clone()
    }

    /// Files currently in the staging directory
    pub fn staged_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.staging_dir())
            .expect("staging dir exists")
            .map(|entry| entry.expect("readable entry").path())
            .collect()
    }

    pub fn supervisor(&self) -> &ConnectionSupervisor {
        self.state.supervisor()
    }
}

pub fn test_config(dir: &Path, overrides: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("ACCOUNT_PHONE".into(), PHONE.into());
    env.insert("PLATFORM_LOGIN_CODE".into(), LOGIN_CODE.into());
    env.insert("STORAGE_CHANNEL_ID".into(), CHANNEL.into());
    env.insert(
        "SESSION_PATH".into(),
        dir.join("test.session").to_string_lossy().into_owned(),
    );
    env.insert(
        "STAGING_DIR".into(),
        dir.join("staging").to_string_lossy().into_owned(),
    );
    env.insert(
        "PLATFORM_ROOT".into(),
        dir.join("platform").to_string_lossy().into_owned(),
    );
    for (key, value) in overrides {
        env.insert(key.to_string(), value.to_string());
    }

    Config::from_lookup(|key| env.get(key).cloned()).expect("valid test config")
}

/// Connected service; optionally signed in through the handshake
pub async fn harness(authorized: bool) -> Harness {
    harness_with(authorized, &[]).await
}

pub async fn harness_with(authorized: bool, overrides: &[(&str, &str)]) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let config = test_config(dir.path(), overrides);

    let platform = Arc::new(FaultyPlatform::new(LocalPlatformOptions {
        root: config.platform.root.clone(),
        session_path: config.account.session_path.clone(),
        password: config.platform.password.clone(),
        login_code: config.platform.login_code.clone(),
    }));
    platform
        .local()
        .ensure_container(CHANNEL)
        .await
        .expect("container created");

    let supervisor = ConnectionSupervisor::new(platform.clone());
    supervisor.connect().await.expect("connected");

    let state = AppState::new(config, supervisor);
    state
        .pipeline()
        .staging()
        .prepare()
        .await
        .expect("staging prepared");

    if authorized {
        state.auth().begin_handshake().await.expect("code sent");
        state
            .auth()
            .submit_code(LOGIN_CODE)
            .await
            .expect("signed in");
    }

    Harness {
        dir,
        platform,
        state,
    }
}

//===============
// Data helpers
//===============

pub fn pattern(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Client body stream delivering `data` in 64 KiB chunks
pub fn body_stream(data: &[u8]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send {
    let chunks: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(64 * 1024)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    stream::iter(chunks)
}

/// Poll until `check` holds or a second has passed
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}
