use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use regwatch_model::{BatchConfig, ScanId, ScanOutcome, ScanSnapshot, ScanState};

use crate::persistence::ScanRunRecord;

use super::config::OrchestratorConfig;
use super::progress::ProgressTracker;

/// The single live run: lifecycle state plus progress accounting. Mutated in
/// place by the run task; read as a snapshot by the status query.
#[derive(Clone, Debug)]
pub struct ScanJob {
    pub scan_id: ScanId,
    pub state: ScanState,
    pub config: BatchConfig,
    pub started_at: DateTime<Utc>,
    tracker: ProgressTracker,
}

impl ScanJob {
    /// Fresh job in `Running` state covering `total` registrations.
    pub fn new(config: BatchConfig, total: u64, tuning: &OrchestratorConfig) -> Self {
        Self {
            scan_id: ScanId::new(),
            state: ScanState::Running,
            config,
            started_at: Utc::now(),
            tracker: ProgressTracker::new(total, tuning.recent_outcomes, tuning.ema_alpha),
        }
    }

    /// Rebuild a job from its persisted checkpoint for a cross-restart
    /// resume. Counters carry over; the trailing log does not.
    pub fn from_record(record: &ScanRunRecord, tuning: &OrchestratorConfig) -> Self {
        Self {
            scan_id: record.id,
            state: ScanState::Running,
            config: record.config,
            started_at: record.started_at,
            tracker: ProgressTracker::from_counters(
                record.total_items,
                record.succeeded,
                record.not_found,
                record.failed,
                tuning.recent_outcomes,
                tuning.ema_alpha,
            ),
        }
    }

    pub fn record_outcome(&mut self, outcome: ScanOutcome, duration: Duration) {
        self.tracker.record(outcome, duration);
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        ScanSnapshot {
            scan_id: self.scan_id,
            state: self.state,
            total_items: self.tracker.total(),
            processed: self.tracker.processed(),
            succeeded: self.tracker.succeeded(),
            not_found: self.tracker.not_found(),
            failed: self.tracker.failed(),
            recent_outcomes: self.tracker.recent_outcomes(),
            eta_ms: self.tracker.eta_ms(),
            started_at: self.started_at,
        }
    }

    /// Checkpoint row for the durable store. The cursor equals `processed`:
    /// dispatch is in enumeration order and every dispatched item is counted
    /// before the next checkpoint.
    pub fn to_record(&self) -> ScanRunRecord {
        ScanRunRecord {
            id: self.scan_id,
            state: self.state,
            total_items: self.tracker.total(),
            processed: self.tracker.processed(),
            succeeded: self.tracker.succeeded(),
            not_found: self.tracker.not_found(),
            failed: self.tracker.failed(),
            cursor: self.tracker.processed(),
            config: self.config,
            started_at: self.started_at,
            updated_at: Utc::now(),
        }
    }
}

/// Shared handle to the live job. Only the run task writes through it, so
/// bookkeeping stays serialized while lookups run in parallel.
#[derive(Clone, Debug)]
pub struct ProgressHandle {
    job: Arc<RwLock<ScanJob>>,
}

impl ProgressHandle {
    pub fn new(job: ScanJob) -> Self {
        Self {
            job: Arc::new(RwLock::new(job)),
        }
    }

    pub async fn record_outcome(&self, outcome: ScanOutcome, duration: Duration) {
        self.job.write().await.record_outcome(outcome, duration);
    }

    pub async fn snapshot(&self) -> ScanSnapshot {
        self.job.read().await.snapshot()
    }

    pub async fn state(&self) -> ScanState {
        self.job.read().await.state
    }

    pub async fn to_record(&self) -> ScanRunRecord {
        self.job.read().await.to_record()
    }

    pub async fn update<F>(&self, updater: F)
    where
        F: FnOnce(&mut ScanJob),
    {
        let mut job = self.job.write().await;
        updater(&mut job);
    }
}
