//! Transfer module
//!
//! Large-object relay through local staging:
//! - `staging`: per-transfer staged files with drop-guard cleanup
//! - `progress`: lock-free progress and the in-flight transfer registry
//! - `stream`: single-pass response body over a staged download
//! - `pipeline`: upload/download orchestration

pub mod pipeline;
pub mod progress;
pub mod staging;
pub mod stream;
pub mod types;

pub use pipeline::TransferPipeline;
pub use progress::{TransferOutcome, TransferRegistry, TransferSnapshot};
pub use staging::{sanitize_file_name, StagingArea, TransferDirection};
pub use stream::StagedStream;
pub use types::*;
