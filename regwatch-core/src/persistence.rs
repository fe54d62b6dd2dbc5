//! Storage-layer collaborators: the per-item outcome writer and the durable
//! scan-run checkpoint store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::info;

use regwatch_model::{
    BatchConfig, OutcomeKind, ScanId, ScanOutcome, ScanState, VehicleId,
};

use crate::error::Result;

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Applies one outcome to the corresponding vehicle row.
///
/// Contract: idempotent per identifier (replaying the same outcome yields
/// the same stored state) and last-write-wins. The external service is
/// authoritative for the inspection columns, so no conflict detection is
/// done against concurrent manual edits; whether that policy should survive
/// hardening is an open stakeholder question. Failed outcomes are never
/// persisted and a writer may treat them as a no-op.
#[async_trait]
pub trait OutcomeWriter: Send + Sync {
    async fn apply(
        &self,
        vehicle: VehicleId,
        outcome: &ScanOutcome,
    ) -> std::result::Result<(), WriteError>;
}

/// Writer backed by the `vehicles` inspection columns.
#[derive(Clone, Debug)]
pub struct PostgresOutcomeWriter {
    pool: PgPool,
}

impl PostgresOutcomeWriter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Stored status value for registrations the service has no record of.
const NO_RECORD_STATUS: &str = "no_record";

#[async_trait]
impl OutcomeWriter for PostgresOutcomeWriter {
    async fn apply(
        &self,
        vehicle: VehicleId,
        outcome: &ScanOutcome,
    ) -> std::result::Result<(), WriteError> {
        let (status, expires_at) = match outcome.kind {
            OutcomeKind::Success => (
                outcome.status.as_deref().unwrap_or_default(),
                outcome.expires_at,
            ),
            OutcomeKind::NotFound => (NO_RECORD_STATUS, None),
            // The batch processor never persists failures; they surface
            // through the run counters.
            OutcomeKind::Failed => return Ok(()),
        };

        sqlx::query(
            r#"
            UPDATE vehicles
            SET inspection_status = $2,
                inspection_expires_at = $3,
                inspection_checked_at = $4
            WHERE id = $1
            "#,
        )
        .bind(vehicle.to_uuid())
        .bind(status)
        .bind(expires_at)
        .bind(outcome.checked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Durable record of one scan run, checkpointed once per batch so a restart
/// can resume from the last persisted cursor instead of item zero.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRunRecord {
    pub id: ScanId,
    pub state: ScanState,
    pub total_items: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub not_found: u64,
    pub failed: u64,
    /// Index of the next un-started item in enumeration order. Equal to
    /// `processed`: dispatch is ordered and every dispatched item is counted.
    pub cursor: u64,
    pub config: BatchConfig,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn upsert(&self, record: &ScanRunRecord) -> Result<()>;

    /// The most recent paused run, if any. This is the candidate for a
    /// cross-restart resume.
    async fn latest_resumable(&self) -> Result<Option<ScanRunRecord>>;

    /// Flip runs left `running` by a crashed process to `paused` so they can
    /// be resumed explicitly.
    async fn recover_interrupted(&self) -> Result<Vec<ScanRunRecord>>;
}

/// Checkpoint store backed by the `scan_runs` table.
#[derive(Clone, Debug)]
pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<ScanRunRecord> {
        let state: String = row.try_get("state")?;
        let state = match state.as_str() {
            "running" => ScanState::Running,
            "paused" => ScanState::Paused,
            "stopped" => ScanState::Stopped,
            "completed" => ScanState::Completed,
            _ => ScanState::Idle,
        };
        let config: serde_json::Value = row.try_get("config")?;
        let config: BatchConfig = serde_json::from_value(config)?;
        let total: i64 = row.try_get("total_items")?;
        let processed: i64 = row.try_get("processed")?;
        let succeeded: i64 = row.try_get("succeeded")?;
        let not_found: i64 = row.try_get("not_found")?;
        let failed: i64 = row.try_get("failed")?;
        let cursor: i64 = row.try_get("cursor_index")?;
        Ok(ScanRunRecord {
            id: ScanId(row.try_get("id")?),
            state,
            total_items: total.max(0) as u64,
            processed: processed.max(0) as u64,
            succeeded: succeeded.max(0) as u64,
            not_found: not_found.max(0) as u64,
            failed: failed.max(0) as u64,
            cursor: cursor.max(0) as u64,
            config,
            started_at: row.try_get("started_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn upsert(&self, record: &ScanRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scan_runs (
                id, state, total_items, processed, succeeded, not_found,
                failed, cursor_index, config, started_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                state = EXCLUDED.state,
                processed = EXCLUDED.processed,
                succeeded = EXCLUDED.succeeded,
                not_found = EXCLUDED.not_found,
                failed = EXCLUDED.failed,
                cursor_index = EXCLUDED.cursor_index,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.id.0)
        .bind(record.state.to_string())
        .bind(record.total_items as i64)
        .bind(record.processed as i64)
        .bind(record.succeeded as i64)
        .bind(record.not_found as i64)
        .bind(record.failed as i64)
        .bind(record.cursor as i64)
        .bind(serde_json::to_value(record.config)?)
        .bind(record.started_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_resumable(&self) -> Result<Option<ScanRunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, state, total_items, processed, succeeded, not_found,
                   failed, cursor_index, config, started_at, updated_at
            FROM scan_runs
            WHERE state = 'paused'
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn recover_interrupted(&self) -> Result<Vec<ScanRunRecord>> {
        let rows = sqlx::query(
            r#"
            UPDATE scan_runs
            SET state = 'paused', updated_at = NOW()
            WHERE state = 'running'
            RETURNING id, state, total_items, processed, succeeded, not_found,
                      failed, cursor_index, config, started_at, updated_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let recovered: Vec<ScanRunRecord> = rows
            .iter()
            .map(Self::record_from_row)
            .collect::<Result<_>>()?;

        if !recovered.is_empty() {
            info!("recovered {} interrupted scan runs", recovered.len());
        }
        Ok(recovered)
    }
}
