use std::collections::VecDeque;
use std::time::Duration;

use regwatch_model::{OutcomeKind, ScanOutcome};

/// Live counters, the bounded trailing outcome log, and the moving-average
/// item duration behind the ETA.
///
/// Lookups run in parallel, but every update lands here through a single
/// `&mut` call on the run task, so a reader never observes `processed`
/// ahead of the per-kind counters.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    total: u64,
    processed: u64,
    succeeded: u64,
    not_found: u64,
    failed: u64,
    recent: VecDeque<ScanOutcome>,
    capacity: usize,
    ema_alpha: f64,
    avg_item_ms: Option<f64>,
}

impl ProgressTracker {
    pub fn new(total: u64, capacity: usize, ema_alpha: f64) -> Self {
        Self {
            total,
            processed: 0,
            succeeded: 0,
            not_found: 0,
            failed: 0,
            recent: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            ema_alpha,
            avg_item_ms: None,
        }
    }

    /// Rebuild from persisted counters after a restart. The trailing log is
    /// not durable; it starts empty.
    pub fn from_counters(
        total: u64,
        succeeded: u64,
        not_found: u64,
        failed: u64,
        capacity: usize,
        ema_alpha: f64,
    ) -> Self {
        let mut tracker = Self::new(total, capacity, ema_alpha);
        tracker.succeeded = succeeded;
        tracker.not_found = not_found;
        tracker.failed = failed;
        tracker.processed = succeeded + not_found + failed;
        tracker
    }

    /// Record one completed item: counter bump, trailing log append, and a
    /// duration sample for the ETA.
    pub fn record(&mut self, outcome: ScanOutcome, duration: Duration) {
        match outcome.kind {
            OutcomeKind::Success => self.succeeded += 1,
            OutcomeKind::NotFound => self.not_found += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
        self.processed += 1;

        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(outcome);

        let sample = duration.as_millis() as f64;
        self.avg_item_ms = Some(match self.avg_item_ms {
            Some(avg) => avg + self.ema_alpha * (sample - avg),
            None => sample,
        });
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded
    }

    pub fn not_found(&self) -> u64 {
        self.not_found
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn is_exhausted(&self) -> bool {
        self.processed >= self.total
    }

    /// Most recent outcomes, oldest first.
    pub fn recent_outcomes(&self) -> Vec<ScanOutcome> {
        self.recent.iter().cloned().collect()
    }

    /// `(total - processed) * avg`. None until a duration sample exists, so
    /// callers never see a fabricated estimate.
    pub fn eta_ms(&self) -> Option<u64> {
        let avg = self.avg_item_ms?;
        let remaining = self.total.saturating_sub(self.processed);
        Some((remaining as f64 * avg).round() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regwatch_model::{FailureStage, Registration};

    fn success(reg: &str) -> ScanOutcome {
        ScanOutcome::success(Registration::new(reg), "approved".into(), None)
    }

    fn failed(reg: &str) -> ScanOutcome {
        ScanOutcome::failed(
            Registration::new(reg),
            FailureStage::Lookup,
            "timeout".into(),
        )
    }

    #[test]
    fn counters_stay_in_sync_per_record() {
        let mut tracker = ProgressTracker::new(5, 10, 0.2);
        tracker.record(success("AB10000"), Duration::from_millis(100));
        tracker.record(failed("AB10001"), Duration::from_millis(100));
        tracker.record(
            ScanOutcome::not_found(Registration::new("AB10002")),
            Duration::from_millis(100),
        );

        assert_eq!(tracker.processed(), 3);
        assert_eq!(
            tracker.processed(),
            tracker.succeeded() + tracker.not_found() + tracker.failed()
        );
    }

    #[test]
    fn trailing_log_is_bounded_most_recent_last() {
        let mut tracker = ProgressTracker::new(20, 3, 0.2);
        for i in 0..5 {
            tracker.record(success(&format!("AB1000{i}")), Duration::from_millis(50));
        }

        let recent = tracker.recent_outcomes();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].registration.as_str(), "AB10002");
        assert_eq!(recent[2].registration.as_str(), "AB10004");
    }

    #[test]
    fn eta_absent_until_first_sample() {
        let mut tracker = ProgressTracker::new(10, 10, 0.2);
        assert_eq!(tracker.eta_ms(), None);

        tracker.record(success("AB10000"), Duration::from_millis(200));
        let eta = tracker.eta_ms().expect("eta after first sample");
        assert_eq!(eta, 9 * 200);
    }

    #[test]
    fn eta_zero_when_exhausted() {
        let mut tracker = ProgressTracker::new(1, 10, 0.2);
        tracker.record(success("AB10000"), Duration::from_millis(200));
        assert_eq!(tracker.eta_ms(), Some(0));
        assert!(tracker.is_exhausted());
    }

    #[test]
    fn ema_smooths_toward_new_samples() {
        let mut tracker = ProgressTracker::new(100, 10, 0.5);
        tracker.record(success("AB10000"), Duration::from_millis(100));
        tracker.record(success("AB10001"), Duration::from_millis(300));
        // 100 + 0.5 * (300 - 100) = 200 per remaining item
        assert_eq!(tracker.eta_ms(), Some(98 * 200));
    }

    #[test]
    fn restart_rebuild_preserves_counter_invariant() {
        let tracker = ProgressTracker::from_counters(25, 10, 2, 3, 10, 0.2);
        assert_eq!(tracker.processed(), 15);
        assert_eq!(tracker.eta_ms(), None);
        assert!(tracker.recent_outcomes().is_empty());
    }
}
