use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ScanId;
use crate::vehicle::Registration;

/// Lifecycle state of a bulk inspection scan run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
}

impl ScanState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Stopped | ScanState::Completed)
    }

    /// A live run blocks a new start command.
    pub fn is_live(&self) -> bool {
        matches!(self, ScanState::Running | ScanState::Paused)
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanState::Idle => "idle",
            ScanState::Running => "running",
            ScanState::Paused => "paused",
            ScanState::Stopped => "stopped",
            ScanState::Completed => "completed",
        };
        write!(f, "{s}")
    }
}

/// Classification of one registration's lookup.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The service returned a status for the registration.
    Success,
    /// The service explicitly has no inspection record. An expected business
    /// state, counted separately from failures.
    NotFound,
    /// Lookup or persistence error; see `failure_stage` / `error`.
    Failed,
}

/// Which side of the pipeline a failed item broke on, so operators can tell
/// "the external service didn't know" from "we couldn't save what it told us".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Lookup,
    Persist,
}

/// The classified result of one registration's lookup. Transient: retained
/// only in the bounded trailing log and as the persisted row update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub registration: Registration,
    pub kind: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<FailureStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Classification time, carried into the row update so replaying the
    /// same outcome writes the same stored state.
    pub checked_at: DateTime<Utc>,
}

impl ScanOutcome {
    pub fn success(
        registration: Registration,
        status: String,
        expires_at: Option<NaiveDate>,
    ) -> Self {
        Self {
            registration,
            kind: OutcomeKind::Success,
            status: Some(status),
            expires_at,
            failure_stage: None,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn not_found(registration: Registration) -> Self {
        Self {
            registration,
            kind: OutcomeKind::NotFound,
            status: None,
            expires_at: None,
            failure_stage: None,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn failed(registration: Registration, stage: FailureStage, error: String) -> Self {
        Self {
            registration,
            kind: OutcomeKind::Failed,
            status: None,
            expires_at: None,
            failure_stage: Some(stage),
            error: Some(error),
            checked_at: Utc::now(),
        }
    }
}

/// Operator-tunable knobs for one scan run, supplied by the start command.
///
/// Defaults are conservative against the external service's own throttling;
/// every field can be overridden per run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Registrations per slice handed to the batch processor.
    pub batch_size: usize,
    /// Upper bound on parallel lookups within a slice.
    pub concurrency: usize,
    /// Sleep between successive slices.
    pub delay_between_batches_ms: u64,
    /// Stagger between item launches within a slice, to smooth burstiness
    /// when concurrency is high relative to the service's tolerance.
    pub per_item_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 10,
            delay_between_batches_ms: 2_000,
            per_item_delay_ms: 100,
        }
    }
}

impl BatchConfig {
    /// Zero-sized batches or zero concurrency would deadlock the run loop.
    pub fn clamped(self) -> Self {
        Self {
            batch_size: self.batch_size.max(1),
            concurrency: self.concurrency.max(1),
            ..self
        }
    }
}

/// Snapshot of the live run used by the status endpoint. Reads are taken
/// under one lock acquisition so callers never observe a half-updated job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanSnapshot {
    pub scan_id: ScanId,
    pub state: ScanState,
    pub total_items: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub failed: u64,
    /// Bounded trailing log of outcomes, most recent last.
    pub recent_outcomes: Vec<ScanOutcome>,
    /// `(total - processed) * avg_item_ms`; absent until one item completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
}

/// Request body for starting a scan. All knobs optional and defaulted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartScanRequest {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub delay_between_batches_ms: Option<u64>,
    pub per_item_delay_ms: Option<u64>,
}

impl StartScanRequest {
    /// Overlay the request's knobs onto the configured defaults.
    pub fn merge_into(&self, base: BatchConfig) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size.unwrap_or(base.batch_size),
            concurrency: self.concurrency.unwrap_or(base.concurrency),
            delay_between_batches_ms: self
                .delay_between_batches_ms
                .unwrap_or(base.delay_between_batches_ms),
            per_item_delay_ms: self.per_item_delay_ms.unwrap_or(base.per_item_delay_ms),
        }
        .clamped()
    }
}

/// Why a start command was rejected before any item began.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartRejectionReason {
    AlreadyRunning,
    NoCredential,
    EmptyRegistry,
    RegistryUnavailable,
}

/// Accepted start command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartScanResponse {
    pub accepted: bool,
    pub scan_id: ScanId,
    pub total_items: u64,
}

/// Final counters returned by the stop command.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StopScanResponse {
    pub scan_id: ScanId,
    pub state: ScanState,
    pub processed: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub failed: u64,
}

/// Body of the status query. Before any run has started all counters are
/// zero and `scan_id`/`started_at` are absent; afterwards it always reflects
/// the last-known counters, including after Stopped/Completed runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScanStatusResponse {
    pub state: ScanState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<ScanId>,
    pub total_items: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub failed: u64,
    pub recent_outcomes: Vec<ScanOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ScanStatusResponse {
    pub fn idle() -> Self {
        Self {
            state: ScanState::Idle,
            scan_id: None,
            total_items: 0,
            processed: 0,
            succeeded: 0,
            not_found: 0,
            failed: 0,
            recent_outcomes: Vec::new(),
            eta_ms: None,
            started_at: None,
        }
    }
}

impl From<ScanSnapshot> for ScanStatusResponse {
    fn from(snapshot: ScanSnapshot) -> Self {
        Self {
            state: snapshot.state,
            scan_id: Some(snapshot.scan_id),
            total_items: snapshot.total_items,
            processed: snapshot.processed,
            succeeded: snapshot.succeeded,
            not_found: snapshot.not_found,
            failed: snapshot.failed,
            recent_outcomes: snapshot.recent_outcomes,
            eta_ms: snapshot.eta_ms,
            started_at: Some(snapshot.started_at),
        }
    }
}

/// Pre-start health probe: can we talk to the credential endpoint and how
/// many registrations would a run cover.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub credential_ok: bool,
    pub registration_count: u64,
}
