use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    HistoryRecord, HistoryStoreError, RecordId, Result, RunId, Sequence,
    store::{HistoryStore, RunInfo, validate_append},
};

/// PostgreSQL-backed history store.
#[derive(Clone)]
pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<HistoryRecord> {
        Ok(HistoryRecord {
            record_id: RecordId::from_uuid(row.try_get::<Uuid, _>("record_id")?),
            run_id: RunId::from_uuid(row.try_get::<Uuid, _>("run_id")?),
            workflow_id: row.try_get("workflow_id")?,
            workflow_type: row.try_get("workflow_type")?,
            sequence: Sequence::new(row.try_get("sequence")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            closes_run: row.try_get("closes_run")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn row_to_run_info(row: PgRow) -> Result<RunInfo> {
        Ok(RunInfo {
            run_id: RunId::from_uuid(row.try_get::<Uuid, _>("run_id")?),
            workflow_id: row.try_get("workflow_id")?,
            workflow_type: row.try_get("workflow_type")?,
        })
    }
}

#[async_trait]
impl HistoryStore for PostgresHistoryStore {
    async fn append(&self, records: Vec<HistoryRecord>, expected: Sequence) -> Result<Sequence> {
        validate_append(&records, expected)?;
        let run_id = records[0].run_id;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(sequence) FROM workflow_history WHERE run_id = $1")
                .bind(run_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let actual = Sequence::new(current.unwrap_or(0));

        if actual != expected {
            return Err(HistoryStoreError::Conflict {
                run_id,
                expected,
                actual,
            });
        }

        let mut last = expected;
        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO workflow_history
                    (record_id, run_id, workflow_id, workflow_type, sequence, event_type, payload, closes_run, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.record_id.as_uuid())
            .bind(record.run_id.as_uuid())
            .bind(&record.workflow_id)
            .bind(&record.workflow_type)
            .bind(record.sequence.as_i64())
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(record.closes_run)
            .bind(record.recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer won the race for this sequence.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_run_sequence")
                {
                    return HistoryStoreError::Conflict {
                        run_id,
                        expected,
                        actual: record.sequence,
                    };
                }
                HistoryStoreError::Database(e)
            })?;

            last = record.sequence;
        }

        tx.commit().await?;
        tracing::debug!(%run_id, sequence = %last, "history appended");
        Ok(last)
    }

    async fn load_run(&self, run_id: RunId) -> Result<Vec<HistoryRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT record_id, run_id, workflow_id, workflow_type, sequence, event_type, payload, closes_run, recorded_at
            FROM workflow_history
            WHERE run_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(run_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn open_runs(&self) -> Result<Vec<RunInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT h.run_id, h.workflow_id, h.workflow_type
            FROM workflow_history h
            WHERE h.sequence = 1
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_history c
                  WHERE c.run_id = h.run_id AND c.closes_run
              )
            ORDER BY h.recorded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_run_info).collect()
    }

    async fn runs_for_workflow(&self, workflow_id: &str) -> Result<Vec<RunInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, workflow_id, workflow_type
            FROM workflow_history
            WHERE workflow_id = $1 AND sequence = 1
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_run_info).collect()
    }
}
