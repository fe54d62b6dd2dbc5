//! The bulk inspection-status scan: state machine, batch processing, and
//! progress tracking.

pub mod batch;
pub mod config;
pub mod job;
pub mod orchestrator;
pub mod progress;
pub mod throttle;

pub use batch::{BatchProcessor, SliceReport};
pub use config::OrchestratorConfig;
pub use job::{ProgressHandle, ScanJob};
pub use orchestrator::{ControlError, ScanOrchestrator};
pub use progress::ProgressTracker;
pub use throttle::AimdWindow;
