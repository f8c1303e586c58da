//! Platform-side types exchanged with the client library

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress sink handed to the chunked transfer primitives: `(current, total)`.
///
/// Implementations must not block; the primitive calls it inline.
pub type ProgressFn = dyn Fn(u64, u64) + Send + Sync;

/// Routable handle for a container (channel) resolved under the current session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
}

/// Identifies a previously published object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectRef {
    pub container_id: String,
    pub object_id: i64,
}

impl RemoteObjectRef {
    pub fn new(container_id: impl Into<String>, object_id: i64) -> Self {
        Self {
            container_id: container_id.into(),
            object_id,
        }
    }
}

/// Attribute attached to a remote document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentAttribute {
    Filename { name: String },
    /// Attributes the gateway carries but does not interpret
    Other { kind: String, value: String },
}

/// File payload of a remote message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// Platform-side identifier of the stored bytes
    pub file_id: String,
    pub size: u64,
    pub mime_type: Option<String>,
    pub attributes: Vec<DocumentAttribute>,
}

impl RemoteDocument {
    /// First `Filename` attribute, if any
    pub fn file_name(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attr| match attr {
            DocumentAttribute::Filename { name } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// A message published in a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub caption: Option<String>,
    pub document: Option<RemoteDocument>,
}

/// Handle returned by the chunked upload primitive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_id: String,
    pub size: u64,
    pub parts: u32,
}

/// Uploaded file plus attributes, ready to publish as one message
#[derive(Debug, Clone)]
pub struct OutgoingDocument {
    pub file: UploadedFile,
    pub mime_type: String,
    pub attributes: Vec<DocumentAttribute>,
    pub caption: Option<String>,
}

/// Result of a code sign-in attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInOutcome {
    Authorized,
    SecondFactorRequired,
}
