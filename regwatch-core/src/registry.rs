//! Enumeration of the vehicle registry the scan walks.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use regwatch_model::{Registration, VehicleId, VehicleRegistration};

use crate::error::Result;

/// Registration source: yields the identifiers a scan run covers.
///
/// The list is fetched once per run and must come back in a stable order.
/// Batches are processed strictly in enumeration order, which is what makes
/// the persisted cursor meaningful across a resume.
#[async_trait]
pub trait RegistrationSource: Send + Sync {
    async fn list_registrations(&self) -> Result<Vec<VehicleRegistration>>;

    /// Cheap count for the readiness probe.
    async fn count(&self) -> Result<u64>;
}

/// Registry backed by the `vehicles` table.
#[derive(Clone, Debug)]
pub struct PostgresRegistry {
    pool: PgPool,
}

impl PostgresRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationSource for PostgresRegistry {
    async fn list_registrations(&self) -> Result<Vec<VehicleRegistration>> {
        let rows = sqlx::query(
            r#"
            SELECT id, registration
            FROM vehicles
            WHERE registration IS NOT NULL AND registration <> ''
            ORDER BY registration, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut registrations = Vec::with_capacity(rows.len());
        for row in rows {
            let id: uuid::Uuid = row.try_get("id")?;
            let registration: String = row.try_get("registration")?;
            registrations.push(VehicleRegistration {
                id: VehicleId(id),
                registration: Registration::new(registration),
            });
        }
        Ok(registrations)
    }

    async fn count(&self) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count
            FROM vehicles
            WHERE registration IS NOT NULL AND registration <> ''
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }
}
