//! Transfer progress and the registry of in-flight transfers.
//!
//! Progress callbacks come from inside the chunked primitives, so
//! recording is lock-free. The registry map is only touched when a
//! transfer begins, ends, or is listed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use super::staging::TransferDirection;

/// Progress is logged each time a transfer crosses another multiple of this
pub const PROGRESS_LOG_INTERVAL: u64 = 5 * 1024 * 1024;

/// How a transfer ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOutcome {
    Succeeded,
    Failed,
    /// Dropped before completion (client disconnect or cancelled task)
    Aborted,
}

/// Live progress of one transfer
pub struct TransferProgress {
    id: Uuid,
    direction: TransferDirection,
    file_name: String,
    started_at: DateTime<Utc>,
    bytes: AtomicU64,
    total: AtomicU64,
    next_mark: AtomicU64,
}

impl TransferProgress {
    fn new(id: Uuid, direction: TransferDirection, file_name: String, total: u64) -> Self {
        Self {
            id,
            direction,
            file_name,
            started_at: Utc::now(),
            bytes: AtomicU64::new(0),
            total: AtomicU64::new(total),
            next_mark: AtomicU64::new(PROGRESS_LOG_INTERVAL),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    /// Progress sink handed to the chunked primitives
    pub fn report(&self, current: u64, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.bytes.fetch_max(current, Ordering::Relaxed);

        let mark = self.next_mark.load(Ordering::Relaxed);
        if current < mark {
            return;
        }
        let next = (current / PROGRESS_LOG_INTERVAL + 1) * PROGRESS_LOG_INTERVAL;
        // Only the caller that advances the mark logs
        if self
            .next_mark
            .compare_exchange(mark, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!(
                transfer_id = %self.id,
                direction = ?self.direction,
                bytes = current,
                total,
                percent = %format!("{:.1}", percent(current, total)),
                "Transfer progress"
            );
        }
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let bytes = self.bytes.load(Ordering::Relaxed);
        let total = self.total.load(Ordering::Relaxed);
        TransferSnapshot {
            id: self.id,
            direction: self.direction,
            file_name: self.file_name.clone(),
            started_at: self.started_at,
            bytes_transferred: bytes,
            total_bytes: total,
            percent: percent(bytes, total),
        }
    }
}

fn percent(current: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (current as f64 / total as f64 * 100.0).min(100.0)
    }
}

/// Point-in-time view of one transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferSnapshot {
    pub id: Uuid,
    pub direction: TransferDirection,
    pub file_name: String,
    pub started_at: DateTime<Utc>,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub percent: f64,
}

/// In-flight transfers, keyed by transfer id
#[derive(Clone, Default)]
pub struct TransferRegistry {
    active: Arc<RwLock<HashMap<Uuid, Arc<TransferProgress>>>>,
}

impl TransferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transfer. It leaves the registry when the ticket is
    /// finished or dropped.
    pub fn begin(
        &self,
        id: Uuid,
        direction: TransferDirection,
        file_name: &str,
        total: u64,
    ) -> TransferTicket {
        let progress = Arc::new(TransferProgress::new(
            id,
            direction,
            file_name.to_string(),
            total,
        ));
        self.active.write().insert(id, progress.clone());

        tracing::info!(transfer_id = %id, ?direction, file_name, total, "Transfer started");

        TransferTicket {
            progress,
            registry: self.clone(),
            finished: false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.read().len()
    }

    /// Active transfers, oldest first
    pub fn snapshots(&self) -> Vec<TransferSnapshot> {
        let mut snapshots: Vec<_> = self
            .active
            .read()
            .values()
            .map(|progress| progress.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.started_at);
        snapshots
    }

    fn end(&self, progress: &TransferProgress, outcome: TransferOutcome) {
        self.active.write().remove(&progress.id);

        let snapshot = progress.snapshot();
        let elapsed_ms = (Utc::now() - snapshot.started_at).num_milliseconds();
        match outcome {
            TransferOutcome::Succeeded => tracing::info!(
                transfer_id = %snapshot.id,
                bytes = snapshot.bytes_transferred,
                elapsed_ms,
                "Transfer completed"
            ),
            TransferOutcome::Failed | TransferOutcome::Aborted => tracing::warn!(
                transfer_id = %snapshot.id,
                ?outcome,
                bytes = snapshot.bytes_transferred,
                elapsed_ms,
                "Transfer did not complete"
            ),
        }
    }
}

/// Registration handle held for the lifetime of one transfer
pub struct TransferTicket {
    progress: Arc<TransferProgress>,
    registry: TransferRegistry,
    finished: bool,
}

impl TransferTicket {
    pub fn progress(&self) -> Arc<TransferProgress> {
        self.progress.clone()
    }

    pub fn finish(mut self, outcome: TransferOutcome) {
        self.finished = true;
        self.registry.end(&self.progress, outcome);
    }
}

impl Drop for TransferTicket {
    fn drop(&mut self) {
        if !self.finished {
            self.registry.end(&self.progress, TransferOutcome::Aborted);
        }
    }
}
