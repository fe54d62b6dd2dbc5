use thiserror::Error;

use regwatch_model::StartRejectionReason;

use crate::lookup::LookupError;
use crate::persistence::WriteError;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("write error: {0}")]
    Write(#[from] WriteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Fatal-to-start conditions. Surfaced synchronously by the start command;
/// no job is created and the orchestrator stays in its previous state.
#[derive(Error, Debug)]
pub enum StartError {
    #[error("a scan is already running or paused")]
    AlreadyRunning,

    #[error("could not obtain an API credential: {0}")]
    NoCredential(String),

    #[error("vehicle registry is empty")]
    EmptyRegistry,

    #[error("vehicle registry unavailable: {0}")]
    RegistryUnavailable(String),
}

impl StartError {
    /// Wire-level rejection reason for the control surface.
    pub fn reason(&self) -> StartRejectionReason {
        match self {
            StartError::AlreadyRunning => StartRejectionReason::AlreadyRunning,
            StartError::NoCredential(_) => StartRejectionReason::NoCredential,
            StartError::EmptyRegistry => StartRejectionReason::EmptyRegistry,
            StartError::RegistryUnavailable(_) => StartRejectionReason::RegistryUnavailable,
        }
    }
}
