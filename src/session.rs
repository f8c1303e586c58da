//! Session artifact persistence
//!
//! Stateless hosts lose the session file on every deploy. The artifact can
//! be exported as base64 once authorized and handed back through
//! `SESSION_BASE64`, which is written out at startup.

use std::io;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid base64 session: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Session I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Write the decoded artifact to `path` unless a session file already exists.
///
/// Returns whether a file was written.
pub async fn restore_from_base64(path: &Path, encoded: &str) -> Result<bool, SessionError> {
    if tokio::fs::try_exists(path).await? {
        tracing::debug!(path = %path.display(), "Session file present, skipping restore");
        return Ok(false);
    }

    let data = BASE64.decode(encoded.trim())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &data).await?;

    tracing::info!(path = %path.display(), bytes = data.len(), "Session restored from environment");
    Ok(true)
}

/// Exported session artifact
#[derive(Debug, Serialize)]
pub struct SessionBackup {
    pub success: bool,
    pub message: &'static str,
    pub session_base64: String,
    pub instructions: Vec<&'static str>,
}

/// Read and encode the session file. `None` if it does not exist.
pub async fn backup(path: &Path) -> io::Result<Option<SessionBackup>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    Ok(Some(SessionBackup {
        success: true,
        message: "Store this value as the SESSION_BASE64 environment variable",
        session_base64: BASE64.encode(data),
        instructions: vec![
            "1. Copy the session_base64 value",
            "2. Set SESSION_BASE64=<value> in the service environment",
            "3. Redeploy; the session is restored on startup when no session file exists",
        ],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("a.session");
        std::fs::write(&original, b"{\"identity\":\"+1555\"}").unwrap();

        let exported = backup(&original).await.unwrap().unwrap();

        let restored = dir.path().join("nested").join("b.session");
        assert!(restore_from_base64(&restored, &exported.session_base64)
            .await
            .unwrap());
        assert_eq!(
            std::fs::read(&restored).unwrap(),
            std::fs::read(&original).unwrap()
        );
    }

    #[tokio::test]
    async fn test_restore_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.session");
        std::fs::write(&path, b"current").unwrap();

        let written = restore_from_base64(&path, &BASE64.encode(b"old"))
            .await
            .unwrap();

        assert!(!written);
        assert_eq!(std::fs::read(&path).unwrap(), b"current");
    }

    #[tokio::test]
    async fn test_restore_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.session");

        let result = restore_from_base64(&path, "not base64 !!").await;

        assert!(matches!(result, Err(SessionError::Decode(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_backup_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(backup(&dir.path().join("none.session"))
            .await
            .unwrap()
            .is_none());
    }
}
