//! PostgreSQL snapshot repository.
//!
//! Snapshots are written inside one transaction so a reader never observes
//! a header without its entries.

use async_trait::async_trait;
use capflow_core::{PersistenceError, PersistenceResult, Snapshot, SnapshotStore};
use sqlx::PgPool;

use crate::models::{assemble_snapshot, indicators_to_json, SnapshotEntryRecord, SnapshotRecord};

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS flow_snapshots (
        id BIGSERIAL PRIMARY KEY,
        run_at TIMESTAMPTZ NOT NULL UNIQUE,
        risk_score NUMERIC NOT NULL,
        risk_band TEXT NOT NULL,
        indicators JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS flow_snapshot_entries (
        snapshot_id BIGINT NOT NULL REFERENCES flow_snapshots (id) ON DELETE CASCADE,
        entity_id TEXT NOT NULL,
        tvl NUMERIC,
        volume NUMERIC,
        price_change_pct NUMERIC,
        momentum_state TEXT,
        source_count INTEGER NOT NULL,
        PRIMARY KEY (snapshot_id, entity_id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_flow_snapshots_run_at ON flow_snapshots (run_at DESC)
    "#,
];

/// Repository for snapshot operations.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    pool: PgPool,
}

impl SnapshotRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the snapshot tables if they do not exist.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn ensure_schema(&self) -> PersistenceResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(PersistenceError::database)?;
        }
        Ok(())
    }

    /// Inserts a snapshot header and all of its entries in one transaction.
    ///
    /// Dropping the returned future before it completes rolls the
    /// transaction back.
    ///
    /// # Errors
    /// Returns an error if any statement or the commit fails.
    pub async fn insert(&self, snapshot: &Snapshot) -> PersistenceResult<i64> {
        let indicators = indicators_to_json(&snapshot.risk.indicators)?;
        let mut tx = self.pool.begin().await.map_err(PersistenceError::database)?;

        let snapshot_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO flow_snapshots (run_at, risk_score, risk_band, indicators)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(snapshot.run_at)
        .bind(snapshot.risk.value)
        .bind(snapshot.risk.band.as_str())
        .bind(indicators)
        .fetch_one(&mut *tx)
        .await
        .map_err(PersistenceError::database)?;

        for entry in snapshot.entries() {
            let row = SnapshotEntryRecord::from_entry(snapshot_id, entry);
            sqlx::query(
                r#"
                INSERT INTO flow_snapshot_entries
                    (snapshot_id, entity_id, tvl, volume, price_change_pct,
                     momentum_state, source_count)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(row.snapshot_id)
            .bind(&row.entity_id)
            .bind(row.tvl)
            .bind(row.volume)
            .bind(row.price_change_pct)
            .bind(&row.momentum_state)
            .bind(row.source_count)
            .execute(&mut *tx)
            .await
            .map_err(PersistenceError::database)?;
        }

        tx.commit().await.map_err(PersistenceError::database)?;

        tracing::debug!(snapshot_id, entries = snapshot.len(), "snapshot committed");
        Ok(snapshot_id)
    }

    /// Gets the most recent snapshot.
    ///
    /// # Errors
    /// Returns an error if the query fails or stored rows are corrupt.
    pub async fn get_latest(&self) -> PersistenceResult<Option<Snapshot>> {
        let header = sqlx::query_as::<_, SnapshotRecord>(
            r#"
            SELECT id, run_at, risk_score, risk_band, indicators
            FROM flow_snapshots
            ORDER BY run_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(PersistenceError::database)?;

        let Some(header) = header else {
            return Ok(None);
        };

        let entries = sqlx::query_as::<_, SnapshotEntryRecord>(
            r#"
            SELECT snapshot_id, entity_id, tvl, volume, price_change_pct,
                   momentum_state, source_count
            FROM flow_snapshot_entries
            WHERE snapshot_id = $1
            ORDER BY entity_id ASC
            "#,
        )
        .bind(header.id)
        .fetch_all(&self.pool)
        .await
        .map_err(PersistenceError::database)?;

        assemble_snapshot(header, entries).map(Some)
    }
}

#[async_trait]
impl SnapshotStore for SnapshotRepository {
    async fn latest(&self) -> PersistenceResult<Option<Snapshot>> {
        self.get_latest().await
    }

    async fn save(&self, snapshot: &Snapshot) -> PersistenceResult<()> {
        self.insert(snapshot).await.map(|_| ())
    }
}
