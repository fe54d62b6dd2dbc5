use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use regwatch_core::{ControlError, ScanError, StartError};
use regwatch_model::StartRejectionReason;

pub type AppResult<T> = Result<T, AppError>;

/// Wire-level error: an HTTP status, a human-readable message, and for start
/// rejections a machine-readable reason.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub reason: Option<StartRejectionReason>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            reason: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    fn with_reason(mut self, reason: StartRejectionReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "message": self.message,
            "status": self.status.as_u16(),
        });
        if let Some(reason) = self.reason
            && let Ok(value) = serde_json::to_value(reason)
        {
            error["reason"] = value;
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<StartError> for AppError {
    fn from(err: StartError) -> Self {
        let reason = err.reason();
        let base = match &err {
            StartError::AlreadyRunning => Self::conflict(err.to_string()),
            StartError::NoCredential(_) => Self::unavailable(err.to_string()),
            StartError::EmptyRegistry => Self::unprocessable(err.to_string()),
            StartError::RegistryUnavailable(_) => Self::unavailable(err.to_string()),
        };
        base.with_reason(reason)
    }
}

impl From<ControlError> for AppError {
    fn from(err: ControlError) -> Self {
        match err {
            ControlError::NoActiveScan
            | ControlError::NotRunning
            | ControlError::NotPaused => Self::conflict(err.to_string()),
            ControlError::Scan(e) => e.into(),
        }
    }
}

impl From<ScanError> for AppError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::RegistryUnavailable(_) => Self::unavailable(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}
