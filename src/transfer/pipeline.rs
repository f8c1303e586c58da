//! Transfer Pipeline
//!
//! Relays objects between HTTP clients and the platform through the
//! staging area. Uploads drain the client stream to disk before the
//! chunked upload starts. Downloads are fully staged before the first
//! response byte is sent. Staged files never outlive their transfer.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::progress::{TransferOutcome, TransferRegistry, TransferTicket};
use super::staging::{StagedFile, StagingArea, TransferDirection};
use super::stream::{StagedStream, STREAM_CHUNK_SIZE};
use super::types::{ObjectMetadata, ObjectReceipt, StagedDownload, OCTET_STREAM};
use crate::error::GatewayError;
use crate::platform::{
    ClientError, ContainerHandle, DocumentAttribute, OutgoingDocument, RemoteDocument,
    RemoteObjectRef,
};
use crate::supervisor::ConnectionSupervisor;

/// Relay between HTTP clients and the platform
#[derive(Clone)]
pub struct TransferPipeline {
    supervisor: ConnectionSupervisor,
    staging: StagingArea,
    registry: TransferRegistry,
    timeout: Option<Duration>,
}

impl TransferPipeline {
    pub fn new(
        supervisor: ConnectionSupervisor,
        staging: StagingArea,
        registry: TransferRegistry,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            supervisor,
            staging,
            registry,
            timeout,
        }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn registry(&self) -> &TransferRegistry {
        &self.registry
    }

    // ========================================================================
    // Upload
    // ========================================================================

    /// Stage `source`, upload it in parts and publish it to `destination`.
    ///
    /// The staged file is removed whether or not the upload succeeds.
    pub async fn upload<S, E>(
        &self,
        source: S,
        destination: &str,
        display_name: &str,
    ) -> Result<ObjectReceipt, GatewayError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        self.ensure_ready()?;
        let container = self.supervisor.resolve_container(destination).await?;

        let display_name = match display_name.trim() {
            "" => "upload.bin",
            name => name,
        };
        let transfer_id = Uuid::new_v4();
        let (staged, file) = self
            .staging
            .stage(TransferDirection::Upload, transfer_id, display_name)
            .await
            .map_err(|e| GatewayError::Transfer(format!("failed to stage upload: {}", e)))?;
        let ticket = self
            .registry
            .begin(transfer_id, TransferDirection::Upload, display_name, 0);

        let result = self
            .relay_upload(&container, &staged, file, source, display_name, &ticket)
            .await;

        if let Err(e) = staged.remove().await {
            tracing::warn!(transfer_id = %transfer_id, error = %e, "Staged upload left behind");
        }

        match result {
            Ok(receipt) => {
                ticket.finish(TransferOutcome::Succeeded);
                tracing::info!(
                    message_id = receipt.message_id,
                    channel_id = %receipt.channel_id,
                    file_size = receipt.file_size,
                    "Upload published"
                );
                Ok(receipt)
            }
            Err(e) => {
                ticket.finish(TransferOutcome::Failed);
                Err(e)
            }
        }
    }

    async fn relay_upload<S, E>(
        &self,
        container: &ContainerHandle,
        staged: &StagedFile,
        mut file: tokio::fs::File,
        source: S,
        display_name: &str,
        ticket: &TransferTicket,
    ) -> Result<ObjectReceipt, GatewayError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        let mut source = std::pin::pin!(source);
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        while let Some(chunk) = source.next().await {
            let chunk = chunk
                .map_err(|e| GatewayError::Transfer(format!("client stream failed: {}", e)))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(staging_error)?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(staging_error)?;
        drop(file);

        let progress = ticket.progress();
        progress.set_total(size);
        tracing::debug!(transfer_id = %progress.id(), bytes = size, "Upload staged");

        let on_progress = move |current: u64, total: u64| progress.report(current, total);
        let uploaded = self
            .with_deadline(self.supervisor.upload_chunked(staged.path(), &on_progress))
            .await?;

        let mime_type = mime_guess::from_path(staged.path())
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let message = self
            .supervisor
            .send_document(
                container,
                OutgoingDocument {
                    file: uploaded,
                    mime_type: mime_type.clone(),
                    attributes: vec![DocumentAttribute::Filename {
                        name: display_name.to_string(),
                    }],
                    caption: Some(format!("📁 {}", display_name)),
                },
            )
            .await
            .map_err(|e| GatewayError::Transfer(format!("publish failed: {}", e)))?;

        Ok(ObjectReceipt {
            success: true,
            message_id: message.id,
            file_name: display_name.to_string(),
            file_size: size,
            channel_id: container.id.clone(),
            mime_type,
            sha256: hex::encode(hasher.finalize()),
        })
    }

    // ========================================================================
    // Download
    // ========================================================================

    /// Stage the object locally, then hand back a single-pass stream over it.
    pub async fn download(
        &self,
        reference: &RemoteObjectRef,
    ) -> Result<StagedDownload, GatewayError> {
        let (document, metadata) = self.lookup(reference).await?;

        let transfer_id = Uuid::new_v4();
        let (staged, mut file) = self
            .staging
            .stage(TransferDirection::Download, transfer_id, &metadata.file_name)
            .await
            .map_err(|e| GatewayError::Transfer(format!("failed to stage download: {}", e)))?;
        let ticket = self.registry.begin(
            transfer_id,
            TransferDirection::Download,
            &metadata.file_name,
            metadata.file_size,
        );

        let progress = ticket.progress();
        let on_progress = move |current: u64, total: u64| progress.report(current, total);
        let result = self
            .with_deadline(
                self.supervisor
                    .download_chunked(&document, &mut file, &on_progress),
            )
            .await;

        let written = match result {
            Ok(written) => written,
            Err(e) => return Err(abandon(staged, file, ticket, e).await),
        };
        if let Err(e) = file.flush().await {
            return Err(abandon(staged, file, ticket, staging_error(e)).await);
        }
        if written != metadata.file_size {
            let e = GatewayError::Transfer(format!(
                "downloaded {} bytes, expected {}",
                written, metadata.file_size
            ));
            return Err(abandon(staged, file, ticket, e).await);
        }
        drop(file);
        ticket.finish(TransferOutcome::Succeeded);

        let stream = StagedStream::open(staged, STREAM_CHUNK_SIZE)
            .await
            .map_err(staging_error)?;

        Ok(StagedDownload { metadata, stream })
    }

    /// Metadata only; nothing is staged
    pub async fn file_info(
        &self,
        reference: &RemoteObjectRef,
    ) -> Result<ObjectMetadata, GatewayError> {
        let (_, metadata) = self.lookup(reference).await?;
        Ok(metadata)
    }

    async fn lookup(
        &self,
        reference: &RemoteObjectRef,
    ) -> Result<(RemoteDocument, ObjectMetadata), GatewayError> {
        self.ensure_ready()?;
        let container = self
            .supervisor
            .resolve_container(&reference.container_id)
            .await?;

        let message = self
            .supervisor
            .get_message(&container, reference.object_id)
            .await?
            .ok_or_else(|| GatewayError::NotFound("File not found".to_string()))?;
        let document = message
            .document
            .ok_or_else(|| GatewayError::NotFound("Message has no file".to_string()))?;

        let metadata = ObjectMetadata {
            message_id: message.id,
            file_name: document
                .file_name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("file_{}", message.id)),
            file_size: document.size,
            mime_type: document
                .mime_type
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| OCTET_STREAM.to_string()),
            date: message.date,
        };
        Ok((document, metadata))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn ensure_ready(&self) -> Result<(), GatewayError> {
        if self.supervisor.is_authorized() {
            Ok(())
        } else {
            Err(GatewayError::NotReady)
        }
    }

    async fn with_deadline<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                GatewayError::Transfer(format!("timed out after {}s", limit.as_secs()))
            })?,
            None => call.await,
        };
        result.map_err(|e| GatewayError::Transfer(e.to_string()))
    }
}

fn staging_error(err: std::io::Error) -> GatewayError {
    GatewayError::Transfer(format!("staging I/O failed: {}", err))
}

/// Tear down a failed download and pass its error through
async fn abandon(
    staged: StagedFile,
    file: tokio::fs::File,
    ticket: TransferTicket,
    error: GatewayError,
) -> GatewayError {
    drop(file);
    if let Err(e) = staged.remove().await {
        tracing::warn!(error = %e, "Staged download left behind");
    }
    ticket.finish(TransferOutcome::Failed);
    error
}
