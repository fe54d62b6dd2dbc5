//! Status lookup against the external government inspection service.
//!
//! The orchestrator only sees the [`InspectionLookup`] trait; the HTTP
//! implementation with credential handling lives in [`http`].

pub mod http;

use async_trait::async_trait;
use chrono::NaiveDate;

use regwatch_model::Registration;

pub use http::{HttpInspectionClient, InspectionApiConfig};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("API error: {0}")]
    Api(String),

    #[error("rate limited")]
    RateLimited,

    #[error("invalid credential")]
    InvalidCredential,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LookupError {
    /// Signals the adaptive throttle to shrink its window harder.
    pub fn is_throttle_signal(&self) -> bool {
        matches!(self, LookupError::RateLimited)
    }
}

/// Status payload for a registration the service knows about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InspectionRecord {
    pub status: String,
    pub expires_at: Option<NaiveDate>,
}

/// A completed lookup: either a record, or an explicit "no record" answer.
/// The latter is a normal business state and is classified separately from
/// transport or service errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupResponse {
    Found(InspectionRecord),
    NotFound,
}

/// One status lookup per registration, behind a credential the client is
/// responsible for acquiring and refreshing.
#[async_trait]
pub trait InspectionLookup: Send + Sync {
    /// Acquire (or refresh) the access credential. Called before a run is
    /// allowed to start and by the readiness probe.
    async fn ensure_credential(&self) -> std::result::Result<(), LookupError>;

    /// Look up the inspection status for one registration.
    async fn lookup(
        &self,
        registration: &Registration,
    ) -> std::result::Result<LookupResponse, LookupError>;
}
