//! Staging Area
//!
//! Every transfer materializes its bytes in a file of its own inside the
//! staging directory. Names are derived from the transfer id, so concurrent
//! transfers never collide even for identical client file names.
//! `StagedFile` is a drop guard: the file is removed on every exit path.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use uuid::Uuid;

/// Longest sanitized file name kept in a staged path
const MAX_NAME_LEN: usize = 100;

/// Direction of a transfer relative to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    fn prefix(self) -> &'static str {
        match self {
            Self::Upload => "up-",
            Self::Download => "down-",
        }
    }

    const ALL: [TransferDirection; 2] = [Self::Upload, Self::Download];
}

/// Directory shared by all staged transfers
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and drop files left behind by a previous process.
    ///
    /// Returns the number of stale files removed.
    pub async fn prepare(&self) -> io::Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let staged = TransferDirection::ALL
                .iter()
                .any(|direction| name.starts_with(direction.prefix()));

            if staged && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            tracing::info!(count = removed, dir = %self.dir.display(), "Removed stale staged files");
        }
        Ok(removed)
    }

    /// Create a new, empty staged file for one transfer
    pub async fn stage(
        &self,
        direction: TransferDirection,
        transfer_id: Uuid,
        file_name: &str,
    ) -> io::Result<(StagedFile, File)> {
        let path = self.dir.join(format!(
            "{}{}-{}",
            direction.prefix(),
            transfer_id.simple(),
            sanitize_file_name(file_name)
        ));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        tracing::debug!(path = %path.display(), "Staged file created");
        Ok((StagedFile::new(path), file))
    }
}

/// Owned staged file; removed when released or dropped
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. A file that is already gone counts as removed.
    pub async fn remove(mut self) -> io::Result<()> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Staged file removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged file");
                Err(e)
            }
        }
    }
}

// Drop is sync, so cancelled transfers fall back to a blocking unlink
impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Staged file removed on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to clean up staged file"
            ),
        }
    }
}

/// Make a client-supplied name safe to embed in a staged path.
///
/// Path separators and control characters become `_`, leading dots are
/// stripped, and long names are shortened keeping the extension.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_start_matches('.');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '_' || c == '.') {
        return "file".to_string();
    }

    if trimmed.chars().count() <= MAX_NAME_LEN {
        return trimmed.to_string();
    }

    match trimmed.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && ext.chars().count() <= 16 => {
            let keep = MAX_NAME_LEN - ext.chars().count() - 1;
            let stem: String = stem.chars().take(keep).collect();
            format!("{}.{}", stem, ext)
        }
        _ => trimmed.chars().take(MAX_NAME_LEN).collect(),
    }
}
