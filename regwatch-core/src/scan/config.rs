use serde::{Deserialize, Serialize};

use regwatch_model::BatchConfig;

/// Global knobs that tune orchestrator behaviour.
///
/// All fields carry defaults so deployments only supply what they want to
/// override; the per-run [`BatchConfig`] is overlaid on `defaults` by the
/// start command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Per-run batch tuning used when the start command omits a knob.
    pub defaults: BatchConfig,
    /// Capacity of the trailing outcome log kept for live inspection.
    pub recent_outcomes: usize,
    /// Smoothing factor for the per-item duration average driving the ETA.
    pub ema_alpha: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            defaults: BatchConfig::default(),
            recent_outcomes: 10,
            ema_alpha: 0.2,
        }
    }
}

impl OrchestratorConfig {
    /// Out-of-range smoothing factors silently degenerate the ETA, so clamp
    /// into (0, 1].
    pub fn clamped(mut self) -> Self {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            self.ema_alpha = 0.2;
        }
        self.recent_outcomes = self.recent_outcomes.max(1);
        self.defaults = self.defaults.clamped();
        self
    }
}
