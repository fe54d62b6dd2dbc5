use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{error, warn};

use regwatch_model::{FailureStage, OutcomeKind, ScanOutcome, VehicleRegistration};

use crate::lookup::{InspectionLookup, LookupResponse};
use crate::persistence::OutcomeWriter;

use super::job::ProgressHandle;
use super::orchestrator::ControlGate;

/// What one slice did: how far the cursor moved, how many lookups failed
/// (the adaptive throttle's feedback signal), and whether a stop command was
/// observed.
#[derive(Clone, Copy, Debug, Default)]
pub struct SliceReport {
    pub dispatched: usize,
    pub lookup_failures: u64,
    pub stopped: bool,
}

struct ItemResult {
    outcome: ScanOutcome,
    duration: Duration,
}

/// Executes one slice of registrations with bounded parallelism.
///
/// Items are dispatched in enumeration order; up to the window's worth run
/// in parallel, staggered by the per-item delay. Control commands are
/// observed between item launches, so pause latency is bounded by a single
/// lookup, not a whole slice. No error from one item ever escapes: every
/// dispatched registration settles as exactly one outcome.
pub struct BatchProcessor {
    lookup: Arc<dyn InspectionLookup>,
    writer: Arc<dyn OutcomeWriter>,
    per_item_delay: Duration,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("per_item_delay", &self.per_item_delay)
            .finish()
    }
}

impl BatchProcessor {
    pub fn new(
        lookup: Arc<dyn InspectionLookup>,
        writer: Arc<dyn OutcomeWriter>,
        per_item_delay: Duration,
    ) -> Self {
        Self {
            lookup,
            writer,
            per_item_delay,
        }
    }

    pub(crate) async fn process_slice(
        &self,
        slice: &[VehicleRegistration],
        window: usize,
        gate: &mut ControlGate,
        progress: &ProgressHandle,
    ) -> SliceReport {
        let semaphore = Arc::new(Semaphore::new(window.max(1)));
        let mut join_set: JoinSet<ItemResult> = JoinSet::new();
        let mut report = SliceReport::default();

        for item in slice {
            if report.dispatched > 0 && !self.per_item_delay.is_zero() {
                gate.sleep(self.per_item_delay).await;
            }

            // Settle finished items, honor control traffic, and hold a
            // window slot before committing to the dispatch. The gate is
            // re-checked after the permit wait: a pause that lands while
            // the window is full must stop the next item, not the one after.
            let mut slot = None;
            let permit = loop {
                while let Some(result) = join_set.try_join_next() {
                    report.lookup_failures += settle(result, progress).await;
                }
                gate.poll();
                if gate.is_paused() && !gate.should_stop() {
                    // Release the slot, let in-flight items finish and be
                    // counted, then park until resume or stop.
                    slot = None;
                    while let Some(result) = join_set.join_next().await {
                        report.lookup_failures += settle(result, progress).await;
                    }
                    gate.wait_resume().await;
                    continue;
                }
                if gate.should_stop() {
                    break None;
                }
                match slot.take() {
                    Some(permit) => break Some(permit),
                    None => {
                        let cancel = gate.cancel_token();
                        tokio::select! {
                            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                                Ok(permit) => slot = Some(permit),
                                Err(_) => break None,
                            },
                            _ = cancel.cancelled() => break None,
                        }
                    }
                }
            };
            let Some(permit) = permit else {
                break;
            };

            let lookup = Arc::clone(&self.lookup);
            let writer = Arc::clone(&self.writer);
            let item = item.clone();
            join_set.spawn(async move {
                let _permit = permit;
                process_item(lookup, writer, item).await
            });
            report.dispatched += 1;
        }

        // Stop never aborts an outstanding external call; whatever is in
        // flight completes and is counted.
        while let Some(result) = join_set.join_next().await {
            report.lookup_failures += settle(result, progress).await;
        }

        gate.poll();
        report.stopped = gate.should_stop();
        report
    }
}

/// One registration end to end: lookup, classify, persist. Failures on
/// either side become a `Failed` outcome with the stage that broke. A failed
/// lookup carries nothing worth storing, so the writer only sees Success and
/// NotFound outcomes.
async fn process_item(
    lookup: Arc<dyn InspectionLookup>,
    writer: Arc<dyn OutcomeWriter>,
    item: VehicleRegistration,
) -> ItemResult {
    let started = Instant::now();

    let outcome = match lookup.lookup(&item.registration).await {
        Ok(LookupResponse::Found(record)) => {
            ScanOutcome::success(item.registration.clone(), record.status, record.expires_at)
        }
        Ok(LookupResponse::NotFound) => ScanOutcome::not_found(item.registration.clone()),
        Err(e) => {
            warn!(registration = %item.registration, error = %e, "status lookup failed");
            let outcome =
                ScanOutcome::failed(item.registration, FailureStage::Lookup, e.to_string());
            return ItemResult {
                outcome,
                duration: started.elapsed(),
            };
        }
    };

    let outcome = match writer.apply(item.id, &outcome).await {
        Ok(()) => outcome,
        Err(e) => {
            warn!(registration = %item.registration, error = %e, "could not persist outcome");
            ScanOutcome::failed(item.registration, FailureStage::Persist, e.to_string())
        }
    };

    ItemResult {
        outcome,
        duration: started.elapsed(),
    }
}

/// Serialized accounting: results from parallel lookups funnel through this
/// one call site on the run task. Returns 1 when the item is a throttle
/// signal for the AIMD window.
async fn settle(result: Result<ItemResult, JoinError>, progress: &ProgressHandle) -> u64 {
    match result {
        Ok(item) => {
            let throttle_signal = matches!(
                (item.outcome.kind, item.outcome.failure_stage),
                (OutcomeKind::Failed, Some(FailureStage::Lookup))
            );
            progress.record_outcome(item.outcome, item.duration).await;
            u64::from(throttle_signal)
        }
        Err(e) => {
            // Item tasks catch everything themselves; a join error would mean
            // a panic inside the lookup client.
            error!(error = %e, "lookup task aborted before settling");
            0
        }
    }
}
