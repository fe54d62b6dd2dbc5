//! The scan orchestrator: owns the single live run, spawns the run task, and
//! relays control commands to it over a channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use regwatch_model::{
    ReadinessResponse, ScanSnapshot, ScanState, ScanStatusResponse, StartScanRequest,
    StartScanResponse, StopScanResponse, VehicleRegistration,
};

use crate::error::{ScanError, StartError};
use crate::lookup::InspectionLookup;
use crate::persistence::{CheckpointStore, OutcomeWriter, ScanRunRecord};
use crate::registry::RegistrationSource;

use super::batch::BatchProcessor;
use super::config::OrchestratorConfig;
use super::job::{ProgressHandle, ScanJob};
use super::throttle::AimdWindow;

/// Commands relayed to the run task. Delivery is the channel, not a polled
/// flag: the task reacts at its next dispatch decision without busy-waiting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Control {
    Pause,
    Resume,
    Stop,
}

/// The run task's view of the control channel, folded into two bits of
/// state. `poll` is non-blocking and called between dispatches; the await
/// points (`wait_resume`, `sleep`) wake on control traffic or cancellation.
pub(crate) struct ControlGate {
    rx: mpsc::UnboundedReceiver<Control>,
    cancel: CancellationToken,
    paused: bool,
    stopped: bool,
}

impl ControlGate {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Control>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            paused: false,
            stopped: false,
        }
    }

    fn apply(&mut self, command: Control) {
        match command {
            Control::Pause => self.paused = true,
            Control::Resume => self.paused = false,
            Control::Stop => self.stopped = true,
        }
    }

    /// Drain any queued commands without blocking.
    pub(crate) fn poll(&mut self) {
        while let Ok(command) = self.rx.try_recv() {
            self.apply(command);
        }
        if self.cancel.is_cancelled() {
            self.stopped = true;
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) fn should_stop(&self) -> bool {
        self.stopped
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Park until a resume or stop arrives. A closed channel means the
    /// orchestrator is gone, which the task treats as stop.
    pub(crate) async fn wait_resume(&mut self) {
        while self.paused && !self.stopped {
            tokio::select! {
                _ = self.cancel.cancelled() => self.stopped = true,
                command = self.rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => self.stopped = true,
                },
            }
        }
    }

    /// Sleep that returns early when control traffic arrives; the caller
    /// re-checks the gate afterwards.
    pub(crate) async fn sleep(&mut self, duration: Duration) {
        if self.stopped || self.paused {
            return;
        }
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = self.cancel.cancelled() => {
                    self.stopped = true;
                    return;
                }
                command = self.rx.recv() => match command {
                    Some(command) => {
                        self.apply(command);
                        if self.stopped || self.paused {
                            return;
                        }
                    }
                    None => {
                        self.stopped = true;
                        return;
                    }
                },
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("no scan has been started")]
    NoActiveScan,

    #[error("scan is not running")]
    NotRunning,

    #[error("scan is not paused")]
    NotPaused,

    #[error(transparent)]
    Scan(#[from] ScanError),
}

struct ActiveRun {
    progress: ProgressHandle,
    control: mpsc::UnboundedSender<Control>,
    cancel: CancellationToken,
}

/// Orchestrates bulk inspection-status scans over the vehicle registry.
///
/// At most one run is live at a time. Start validates its preconditions
/// synchronously (credential, non-empty registry) and then hands the work to
/// a spawned run task; pause, resume and stop talk to that task over the
/// control channel. The status query never touches the task; it reads a
/// snapshot of the shared job.
pub struct ScanOrchestrator {
    registry: Arc<dyn RegistrationSource>,
    lookup: Arc<dyn InspectionLookup>,
    writer: Arc<dyn OutcomeWriter>,
    checkpoints: Arc<dyn CheckpointStore>,
    tuning: OrchestratorConfig,
    current: RwLock<Option<ActiveRun>>,
}

impl std::fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<dyn RegistrationSource>,
        lookup: Arc<dyn InspectionLookup>,
        writer: Arc<dyn OutcomeWriter>,
        checkpoints: Arc<dyn CheckpointStore>,
        tuning: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            lookup,
            writer,
            checkpoints,
            tuning: tuning.clamped(),
            current: RwLock::new(None),
        }
    }

    /// Pre-start probe: credential acquisition and registry size.
    pub async fn readiness(&self) -> crate::error::Result<ReadinessResponse> {
        let credential_ok = match self.lookup.ensure_credential().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "credential probe failed");
                false
            }
        };
        let registration_count = self.registry.count().await?;
        Ok(ReadinessResponse {
            credential_ok,
            registration_count,
        })
    }

    /// Start a new run. Holds the run slot's write lock across validation so
    /// two concurrent starts cannot both be accepted.
    pub async fn start(&self, request: &StartScanRequest) -> Result<StartScanResponse, StartError> {
        let mut current = self.current.write().await;
        if let Some(run) = current.as_ref()
            && run.progress.state().await.is_live()
        {
            return Err(StartError::AlreadyRunning);
        }

        self.lookup
            .ensure_credential()
            .await
            .map_err(|e| StartError::NoCredential(e.to_string()))?;

        let items = self
            .registry
            .list_registrations()
            .await
            .map_err(|e| StartError::RegistryUnavailable(e.to_string()))?;
        if items.is_empty() {
            return Err(StartError::EmptyRegistry);
        }

        let config = request.merge_into(self.tuning.defaults);
        let total = items.len() as u64;
        let job = ScanJob::new(config, total, &self.tuning);
        let response = StartScanResponse {
            accepted: true,
            scan_id: job.scan_id,
            total_items: total,
        };

        info!(
            scan_id = %job.scan_id,
            total_items = total,
            batch_size = config.batch_size,
            concurrency = config.concurrency,
            "starting inspection scan"
        );
        *current = Some(self.spawn_run(job, items, 0));
        Ok(response)
    }

    /// Pause the running scan. Acknowledged immediately; lookups already in
    /// flight complete and are counted, nothing new is dispatched.
    pub async fn pause(&self) -> Result<ScanSnapshot, ControlError> {
        let current = self.current.read().await;
        let run = current.as_ref().ok_or(ControlError::NoActiveScan)?;

        let mut acknowledged = false;
        run.progress
            .update(|job| {
                if job.state == ScanState::Running {
                    job.state = ScanState::Paused;
                    acknowledged = true;
                }
            })
            .await;
        if !acknowledged {
            return Err(ControlError::NotRunning);
        }

        let _ = run.control.send(Control::Pause);
        let snapshot = run.progress.snapshot().await;
        info!(scan_id = %snapshot.scan_id, processed = snapshot.processed, "scan paused");
        Ok(snapshot)
    }

    /// Resume a paused scan. Prefers the live in-memory run; with none
    /// available (a restart happened), rebuilds from the latest durable
    /// checkpoint and continues from its cursor.
    pub async fn resume(&self) -> Result<ScanSnapshot, ControlError> {
        let mut current = self.current.write().await;

        if let Some(run) = current.as_ref() {
            let state = run.progress.state().await;
            if state == ScanState::Paused {
                run.progress.update(|job| job.state = ScanState::Running).await;
                let _ = run.control.send(Control::Resume);
                let snapshot = run.progress.snapshot().await;
                info!(scan_id = %snapshot.scan_id, processed = snapshot.processed, "scan resumed");
                return Ok(snapshot);
            }
            if state.is_live() {
                return Err(ControlError::NotPaused);
            }
            // terminal run left in the slot; fall through to the checkpoint
        }

        let record = self
            .checkpoints
            .latest_resumable()
            .await
            .map_err(ControlError::Scan)?
            .ok_or(ControlError::NotPaused)?;

        let items = self
            .registry
            .list_registrations()
            .await
            .map_err(ControlError::Scan)?;
        let start_index = (record.cursor as usize).min(items.len());

        info!(
            scan_id = %record.id,
            cursor = start_index,
            processed = record.processed,
            "resuming scan from durable checkpoint"
        );
        let job = ScanJob::from_record(&record, &self.tuning);
        let run = self.spawn_run(job, items, start_index);
        let snapshot = run.progress.snapshot().await;
        *current = Some(run);
        Ok(snapshot)
    }

    /// Stop the running or paused scan. Terminal: the run cannot continue,
    /// but its final counters stay queryable.
    pub async fn stop(&self) -> Result<StopScanResponse, ControlError> {
        let current = self.current.read().await;
        let run = current.as_ref().ok_or(ControlError::NoActiveScan)?;

        let mut was_live = false;
        run.progress
            .update(|job| {
                if job.state.is_live() {
                    job.state = ScanState::Stopped;
                    was_live = true;
                }
            })
            .await;
        if !was_live {
            return Err(ControlError::NotRunning);
        }

        let _ = run.control.send(Control::Stop);
        run.cancel.cancel();

        let snapshot = run.progress.snapshot().await;
        info!(
            scan_id = %snapshot.scan_id,
            processed = snapshot.processed,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            "scan stopped"
        );
        Ok(StopScanResponse {
            scan_id: snapshot.scan_id,
            state: ScanState::Stopped,
            processed: snapshot.processed,
            succeeded: snapshot.succeeded,
            not_found: snapshot.not_found,
            failed: snapshot.failed,
        })
    }

    /// Live progress, or the last run's final counters, or the idle shape if
    /// nothing has run since boot.
    pub async fn status(&self) -> ScanStatusResponse {
        let current = self.current.read().await;
        match current.as_ref() {
            Some(run) => run.progress.snapshot().await.into(),
            None => ScanStatusResponse::idle(),
        }
    }

    /// Boot-time recovery: runs a crashed process left `running` become
    /// `paused` in the checkpoint store, eligible for an explicit resume.
    pub async fn recover_interrupted(&self) -> crate::error::Result<Vec<ScanRunRecord>> {
        self.checkpoints.recover_interrupted().await
    }

    fn spawn_run(
        &self,
        job: ScanJob,
        items: Vec<VehicleRegistration>,
        start_index: usize,
    ) -> ActiveRun {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let gate = ControlGate::new(rx, cancel.clone());

        let config = job.config;
        let progress = ProgressHandle::new(job);
        let processor = BatchProcessor::new(
            Arc::clone(&self.lookup),
            Arc::clone(&self.writer),
            Duration::from_millis(config.per_item_delay_ms),
        );

        tokio::spawn(run_scan(
            processor,
            Arc::clone(&self.checkpoints),
            progress.clone(),
            items,
            start_index,
            gate,
        ));

        ActiveRun {
            progress,
            control: tx,
            cancel,
        }
    }
}

/// The run task: walks the registry slice by slice, checkpoints after each
/// one, and finalizes the job state when the walk ends.
async fn run_scan(
    processor: BatchProcessor,
    checkpoints: Arc<dyn CheckpointStore>,
    progress: ProgressHandle,
    items: Vec<VehicleRegistration>,
    start_index: usize,
    mut gate: ControlGate,
) {
    let config = {
        let record = progress.to_record().await;
        record.config
    };
    let batch_delay = Duration::from_millis(config.delay_between_batches_ms);
    let mut window = AimdWindow::new(config.concurrency);
    let mut index = start_index.min(items.len());

    // First checkpoint before any item, so a crash mid-first-batch still
    // leaves a resumable row.
    checkpoint(&checkpoints, &progress).await;

    while index < items.len() {
        let end = (index + config.batch_size).min(items.len());
        let report = processor
            .process_slice(&items[index..end], window.current(), &mut gate, &progress)
            .await;

        index += report.dispatched;
        window.observe(report.lookup_failures);
        checkpoint(&checkpoints, &progress).await;

        if report.stopped {
            break;
        }
        if index < items.len() && !batch_delay.is_zero() {
            gate.sleep(batch_delay).await;
            gate.poll();
            if gate.should_stop() {
                break;
            }
            // a pause that lands during the delay parks at the top of the
            // next slice, before anything is dispatched
        }
    }

    let stopped = gate.should_stop();
    progress
        .update(|job| {
            if !job.state.is_terminal() {
                job.state = if stopped {
                    ScanState::Stopped
                } else {
                    ScanState::Completed
                };
            }
        })
        .await;
    checkpoint(&checkpoints, &progress).await;

    let snapshot = progress.snapshot().await;
    info!(
        scan_id = %snapshot.scan_id,
        state = %snapshot.state,
        processed = snapshot.processed,
        succeeded = snapshot.succeeded,
        not_found = snapshot.not_found,
        failed = snapshot.failed,
        "scan run finished"
    );
}

/// Checkpoint failures are logged, never fatal: losing a checkpoint costs
/// re-scanning at most one batch after a crash.
async fn checkpoint(store: &Arc<dyn CheckpointStore>, progress: &ProgressHandle) {
    let record = progress.to_record().await;
    if let Err(e) = store.upsert(&record).await {
        warn!(scan_id = %record.id, error = %e, "failed to checkpoint scan run");
    }
}
