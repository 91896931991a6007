use crate::errors::{Result, StoreError};
use crate::metrics::DB_FAILURES_TOTAL;
use crate::store::{ReadingStore, Tables};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info};
use wire::{MetricKind, Reading};

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    Ok(pool)
}

/// Postgres-backed reading store, one table per metric kind.
#[derive(Debug, Clone)]
pub struct PgReadingStore {
    pool: PgPool,
    tables: Tables,
}

impl PgReadingStore {
    pub fn new(pool: PgPool, tables: Tables) -> Self {
        Self { pool, tables }
    }

    /// Creates the configured tables if they do not exist yet.
    pub async fn ensure_tables(&self) -> Result<()> {
        for (kind, table) in self.tables.configured() {
            info!(%kind, table, "Ensuring reading table exists");
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{}" (
                    device_id TEXT NOT NULL,
                    ts BIGINT NOT NULL,
                    value REAL NOT NULL,
                    PRIMARY KEY (device_id, ts)
                )
                "#,
                table
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    fn tables(&self) -> &Tables {
        &self.tables
    }

    async fn put(&self, kind: MetricKind, reading: &Reading) -> std::result::Result<(), StoreError> {
        let table = self.namespace(kind)?;
        let ts = i64::try_from(reading.timestamp)
            .map_err(|_| StoreError::Backend(format!("timestamp {} out of range", reading.timestamp)))?;

        let query = format!(
            r#"
            INSERT INTO "{}" (device_id, ts, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (device_id, ts) DO UPDATE SET value = EXCLUDED.value
            "#,
            table
        );

        sqlx::query(&query)
            .bind(&reading.device_id)
            .bind(ts)
            .bind(reading.value)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DB_FAILURES_TOTAL.inc();
                StoreError::from(e)
            })?;

        debug!(%kind, device_id = %reading.device_id, ts, "Reading stored");
        Ok(())
    }

    async fn query_recent(
        &self,
        kind: MetricKind,
        device_id: &str,
        since_epoch_ms: i64,
        limit: usize,
    ) -> std::result::Result<Vec<Reading>, StoreError> {
        let table = self.namespace(kind)?;

        // Newest first so LIMIT keeps the most recent rows, then flip to ascending
        let query = format!(
            r#"
            SELECT device_id, ts, value
            FROM "{}"
            WHERE device_id = $1 AND ts > $2
            ORDER BY ts DESC
            LIMIT $3
            "#,
            table
        );

        let rows = sqlx::query_as::<_, (String, i64, f32)>(&query)
            .bind(device_id)
            .bind(since_epoch_ms)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .rev()
            .map(|(device_id, ts, value)| {
                let timestamp = u64::try_from(ts)
                    .map_err(|_| StoreError::Backend(format!("negative timestamp {} in {}", ts, table)))?;
                Ok(Reading {
                    device_id,
                    timestamp,
                    value,
                })
            })
            .collect()
    }
}

pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Connection-related SQLSTATEs
            db_err.code().is_some_and(|code| {
                code.starts_with("08") || // connection_exception class
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}
