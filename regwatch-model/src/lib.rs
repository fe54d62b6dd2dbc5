//! Core data model definitions shared across regwatch crates.
#![allow(missing_docs)]

pub mod ids;
pub mod scan;
pub mod vehicle;

pub use ids::{ScanId, VehicleId};
pub use scan::{
    BatchConfig, FailureStage, OutcomeKind, ReadinessResponse, ScanOutcome, ScanSnapshot,
    ScanState, ScanStatusResponse, StartRejectionReason, StartScanRequest, StartScanResponse,
    StopScanResponse,
};
pub use vehicle::{InspectionUpdate, Registration, VehicleRegistration};
