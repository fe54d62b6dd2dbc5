use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::VehicleId;

/// Normalized registration plate used as the lookup key against the external
/// inspection-status service.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registration(String);

impl Registration {
    /// Uppercases and strips whitespace so `ab 12345` and `AB12345` address
    /// the same record.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized: String = raw
            .as_ref()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Registration {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One entry of the registry enumeration: the stored row's id plus the key
/// used against the external service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRegistration {
    pub id: VehicleId,
    pub registration: Registration,
}

/// Columns written back onto a vehicle row after a successful lookup.
///
/// The update is last-write-wins by design: the external service is the
/// source of truth for these three fields, so no conflict detection is done
/// against concurrent manual edits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionUpdate {
    pub status: String,
    pub expires_at: Option<NaiveDate>,
    pub checked_at: DateTime<Utc>,
}
