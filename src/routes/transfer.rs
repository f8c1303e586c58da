//! Transfer Routes
//!
//! Endpoints:
//! - POST /upload?channel_id= - multipart upload (field `file`)
//! - GET /download/:container_id/:object_id - streamed download
//! - GET /file-info/:container_id/:object_id - metadata only
//! - GET /transfers - in-flight transfers

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::platform::RemoteObjectRef;
use crate::state::AppState;
use crate::transfer::{ObjectMetadata, ObjectReceipt, StagedDownload, TransferSnapshot};

pub fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/upload",
            post(upload).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/download/:container_id/:object_id", get(download))
        .route("/file-info/:container_id/:object_id", get(file_info))
        .route("/transfers", get(list_transfers))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub channel_id: Option<String>,
}

/// POST /upload
///
/// Streams the `file` field into the staging area, then relays it to the
/// destination container (query `channel_id`, else the configured default).
async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Result<Json<ObjectReceipt>> {
    if !state.supervisor().is_authorized() {
        return Err(GatewayError::NotReady);
    }

    let destination = query
        .channel_id
        .filter(|id| !id.trim().is_empty())
        .or_else(|| state.config().transfer.default_channel.clone())
        .ok_or_else(|| GatewayError::BadRequest("channel_id is required".to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::BadRequest(format!("invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload.bin".to_string());
        tracing::info!(file_name = %file_name, destination = %destination, "Upload requested");

        let receipt = state
            .pipeline()
            .upload(field, &destination, &file_name)
            .await?;
        return Ok(Json(receipt));
    }

    Err(GatewayError::BadRequest(
        "multipart field 'file' is required".to_string(),
    ))
}

/// GET /download/:container_id/:object_id
///
/// The object is staged completely before the response starts.
async fn download(
    State(state): State<AppState>,
    Path((container_id, object_id)): Path<(String, i64)>,
) -> Result<Response> {
    let reference = RemoteObjectRef::new(container_id, object_id);
    let StagedDownload { metadata, stream } = state.pipeline().download(&reference).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, metadata.mime_type.as_str())
        .header(header::CONTENT_LENGTH, metadata.file_size)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&metadata.file_name),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

/// GET /file-info/:container_id/:object_id
async fn file_info(
    State(state): State<AppState>,
    Path((container_id, object_id)): Path<(String, i64)>,
) -> Result<Json<ObjectMetadata>> {
    let reference = RemoteObjectRef::new(container_id, object_id);
    Ok(Json(state.pipeline().file_info(&reference).await?))
}

/// GET /transfers
async fn list_transfers(State(state): State<AppState>) -> Json<Vec<TransferSnapshot>> {
    Json(state.registry().snapshots())
}

/// `attachment` disposition with an ASCII fallback and the exact name in `filename*`
fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    )
}
