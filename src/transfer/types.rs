//! Transfer result types

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stream::StagedStream;

/// MIME type used when neither the platform nor the file name says otherwise
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Receipt returned after a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct ObjectReceipt {
    pub success: bool,
    pub message_id: i64,
    pub file_name: String,
    pub file_size: u64,
    pub channel_id: String,
    pub mime_type: String,
    /// Hex SHA-256 of the bytes received from the client
    pub sha256: String,
}

/// Metadata of a stored object
#[derive(Debug, Clone, Serialize)]
pub struct ObjectMetadata {
    pub message_id: i64,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub date: DateTime<Utc>,
}

/// A fully staged download, ready to stream to the client
pub struct StagedDownload {
    pub metadata: ObjectMetadata,
    pub stream: StagedStream,
}
