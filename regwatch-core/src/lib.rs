//! Core library for the regwatch vehicle-record platform.
//!
//! The hard part of the system lives here: the bulk inspection-status scan
//! orchestrator, its batch processor and progress tracking, and the narrow
//! interfaces to the storage layer and the external status service.
#![allow(missing_docs)]

pub mod error;
pub mod lookup;
pub mod persistence;
pub mod registry;
pub mod scan;

pub use error::{Result, ScanError, StartError};
pub use lookup::{InspectionLookup, InspectionRecord, LookupError, LookupResponse};
pub use persistence::{CheckpointStore, OutcomeWriter, ScanRunRecord, WriteError};
pub use registry::RegistrationSource;
pub use scan::orchestrator::{ControlError, ScanOrchestrator};
