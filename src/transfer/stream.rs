//! Single-pass response stream over a staged download.
//!
//! The stream owns the staged file. Reaching end of file deletes it, and
//! dropping the stream early (client disconnect) deletes it through the
//! `StagedFile` guard.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::staging::StagedFile;

/// Size of each chunk handed to the HTTP body
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

// Field order matters: the handle closes before the guard unlinks
struct ReadState {
    file: File,
    staged: StagedFile,
    chunk_size: usize,
}

pub struct StagedStream {
    inner: BoxStream<'static, io::Result<Bytes>>,
}

impl StagedStream {
    pub async fn open(staged: StagedFile, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(staged.path()).await?;
        let state = ReadState {
            file,
            staged,
            chunk_size: chunk_size.max(1),
        };

        let inner = stream::try_unfold(state, |mut state| async move {
            let chunk = read_chunk(&mut state.file, state.chunk_size).await?;
            if chunk.is_empty() {
                let ReadState { file, staged, .. } = state;
                drop(file);
                staged.remove().await?;
                return Ok(None);
            }
            Ok(Some((Bytes::from(chunk), state)))
        })
        .boxed();

        Ok(Self { inner })
    }

    /// Abandon the stream; the staged file is removed immediately
    pub fn cancel(self) {
        drop(self);
    }
}

impl Stream for StagedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Fill up to `size` bytes, short only at end of file
async fn read_chunk(file: &mut File, size: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::staging::{StagingArea, TransferDirection};
    use futures::TryStreamExt;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;
    use uuid::Uuid;

    async fn staged_with(area: &StagingArea, data: &[u8]) -> StagedFile {
        let (staged, mut file) = area
            .stage(TransferDirection::Download, Uuid::new_v4(), "s.bin")
            .await
            .unwrap();
        file.write_all(data).await.unwrap();
        file.flush().await.unwrap();
        staged
    }

    #[tokio::test]
    async fn test_stream_yields_all_bytes_then_removes() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path());
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let staged = staged_with(&area, &data).await;
        let path = staged.path().to_path_buf();

        let stream = StagedStream::open(staged, 4096).await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path());
        let staged = staged_with(&area, b"").await;
        let path = staged.path().to_path_buf();

        let chunks: Vec<Bytes> = StagedStream::open(staged, 16)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert!(chunks.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_drop_mid_stream_removes_file() {
        let dir = TempDir::new().unwrap();
        let area = StagingArea::new(dir.path());
        let staged = staged_with(&area, &[7u8; 8192]).await;
        let path = staged.path().to_path_buf();

        let mut stream = StagedStream::open(staged, 1024).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1024);
        assert!(path.exists());

        stream.cancel();
        assert!(!path.exists());
    }
}
