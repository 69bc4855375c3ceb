use crate::error::{ProcessingError, Result};
use crate::models::StagingRecord;
use crate::processors::CancellationFlag;
use crate::utils::constants::{DEFAULT_COMMIT_TIMEOUT_SECS, DEFAULT_INSERT_BATCH_SIZE};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub staged: usize,
    pub committed: usize,
    pub skipped_duplicates: usize,
}

/// Moves one run's staged records into `weather_data` in a single
/// transaction.
///
/// Records are first copied into a temporary staging table on the
/// transaction's connection, then merged with `ON CONFLICT DO NOTHING`, so a
/// key that appeared in the store after the dedup index was built is skipped
/// instead of failing the run. The staging table is created and dropped inside
/// the transaction: on rollback neither it nor any merged row survives.
pub struct MergeCommitter {
    batch_size: usize,
    timeout: Duration,
    cancel: CancellationFlag,
}

impl MergeCommitter {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_INSERT_BATCH_SIZE,
            timeout: Duration::from_secs(DEFAULT_COMMIT_TIMEOUT_SECS),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Commit all records or none. Cancellation and timeout both roll back.
    pub async fn commit(&self, pool: &SqlitePool, records: &[StagingRecord]) -> Result<CommitSummary> {
        match tokio::time::timeout(self.timeout, self.commit_all(pool, records)).await {
            Ok(result) => result,
            Err(_) => Err(ProcessingError::Timeout(self.timeout)),
        }
    }

    async fn commit_all(&self, pool: &SqlitePool, records: &[StagingRecord]) -> Result<CommitSummary> {
        self.check_cancelled()?;

        if records.is_empty() {
            return Ok(CommitSummary::default());
        }

        let mut tx = pool.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS temp.staging_weather_data")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r#"
            CREATE TEMP TABLE staging_weather_data (
                station_id TEXT NOT NULL,
                date TEXT NOT NULL,
                max_temp REAL,
                min_temp REAL,
                precipitation REAL,
                file_index INTEGER NOT NULL,
                line_number INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *tx)
        .await?;

        for batch in records.chunks(self.batch_size) {
            self.check_cancelled()?;
            Self::insert_staging_batch(&mut *tx, batch).await?;
        }

        debug!("Filled staging table with {} records", records.len());

        // WHERE true keeps SQLite from reading ON CONFLICT as a join clause
        let merged = sqlx::query(
            r#"
            INSERT INTO weather_data (station_id, date, max_temp, min_temp, precipitation)
            SELECT station_id, date, max_temp, min_temp, precipitation
            FROM temp.staging_weather_data
            WHERE true
            ORDER BY file_index, line_number
            ON CONFLICT (station_id, date) DO NOTHING
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("DROP TABLE temp.staging_weather_data")
            .execute(&mut *tx)
            .await?;

        self.check_cancelled()?;
        tx.commit().await?;

        let committed = merged.rows_affected() as usize;
        let summary = CommitSummary {
            staged: records.len(),
            committed,
            skipped_duplicates: records.len() - committed,
        };

        info!(
            "Committed {} records ({} already present)",
            summary.committed, summary.skipped_duplicates
        );

        Ok(summary)
    }

    async fn insert_staging_batch(conn: &mut SqliteConnection, batch: &[StagingRecord]) -> Result<()> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO temp.staging_weather_data \
             (station_id, date, max_temp, min_temp, precipitation, file_index, line_number) ",
        );

        builder.push_values(batch, |mut row, record| {
            let obs = &record.observation;
            row.push_bind(obs.station_id.clone())
                .push_bind(obs.date)
                .push_bind(obs.max_temp)
                .push_bind(obs.min_temp)
                .push_bind(obs.precipitation)
                .push_bind(record.file_index as i64)
                .push_bind(record.line_number as i64);
        });

        builder.build().execute(conn).await?;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }
        Ok(())
    }
}

impl Default for MergeCommitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Observation;
    use crate::store::{connect_in_memory, count_observations};
    use chrono::NaiveDate;

    fn staged(station: &str, day: u32, max_temp: f64, line: usize) -> StagingRecord {
        let obs = Observation::new(
            station.to_string(),
            NaiveDate::from_ymd_opt(2020, 1, day).unwrap(),
            Some(max_temp),
            None,
            Some(0.0),
        );
        StagingRecord::new(obs, 0, line)
    }

    #[tokio::test]
    async fn test_commit_inserts_all_records() {
        let pool = connect_in_memory().await.unwrap();
        let records: Vec<_> = (1..=25).map(|d| staged("S1", d, d as f64, d as usize)).collect();

        let summary = MergeCommitter::new()
            .with_batch_size(7)
            .commit(&pool, &records)
            .await
            .unwrap();

        assert_eq!(summary.committed, 25);
        assert_eq!(summary.skipped_duplicates, 0);
        assert_eq!(count_observations(&pool).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_existing_key_skipped_not_fatal() {
        let pool = connect_in_memory().await.unwrap();
        sqlx::query("INSERT INTO weather_data (station_id, date, max_temp) VALUES ('S1', '2020-01-02', 99.0)")
            .execute(&pool)
            .await
            .unwrap();

        let records = vec![staged("S1", 1, 1.0, 1), staged("S1", 2, 2.0, 2), staged("S1", 3, 3.0, 3)];
        let summary = MergeCommitter::new().commit(&pool, &records).await.unwrap();

        assert_eq!(summary.committed, 2);
        assert_eq!(summary.skipped_duplicates, 1);

        let kept: f64 = sqlx::query_scalar("SELECT max_temp FROM weather_data WHERE date = '2020-01-02'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(kept, 99.0);
    }

    #[tokio::test]
    async fn test_cancelled_commit_leaves_store_untouched() {
        let pool = connect_in_memory().await.unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let records = vec![staged("S1", 1, 1.0, 1)];
        let result = MergeCommitter::new()
            .with_cancellation(cancel)
            .commit(&pool, &records)
            .await;

        assert!(matches!(result, Err(ProcessingError::Cancelled)));
        assert_eq!(count_observations(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_everything() {
        let pool = connect_in_memory().await.unwrap();

        // Negative precipitation violates the CHECK constraint and aborts the merge
        let mut bad = staged("S1", 2, 2.0, 2);
        bad.observation.precipitation = Some(-1.0);
        let records = vec![staged("S1", 1, 1.0, 1), bad];

        let result = MergeCommitter::new().commit(&pool, &records).await;

        assert!(matches!(result, Err(ProcessingError::Database(_))));
        assert_eq!(count_observations(&pool).await.unwrap(), 0);

        // The connection is usable again and the staging table is gone
        let summary = MergeCommitter::new()
            .commit(&pool, &[staged("S1", 1, 1.0, 1)])
            .await
            .unwrap();
        assert_eq!(summary.committed, 1);
    }

    #[tokio::test]
    async fn test_timed_out_commit_rolls_back_and_pool_recovers() {
        let pool = connect_in_memory().await.unwrap();
        let records: Vec<_> = (1..=28).map(|d| staged("S1", d, d as f64, d as usize)).collect();

        let result = MergeCommitter::new()
            .with_batch_size(5)
            .with_timeout(Duration::from_nanos(1))
            .commit(&pool, &records)
            .await;

        match result {
            Err(ProcessingError::Timeout(limit)) => assert_eq!(limit, Duration::from_nanos(1)),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(count_observations(&pool).await.unwrap(), 0);

        let summary = MergeCommitter::new()
            .with_batch_size(5)
            .commit(&pool, &records)
            .await
            .unwrap();
        assert_eq!(summary.committed, 28);
        assert_eq!(count_observations(&pool).await.unwrap(), 28);
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let pool = connect_in_memory().await.unwrap();
        let summary = MergeCommitter::new().commit(&pool, &[]).await.unwrap();
        assert_eq!(summary, CommitSummary::default());
    }
}
