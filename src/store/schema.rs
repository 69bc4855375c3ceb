//! Permanent store bootstrap
//!
//! Observations and yearly statistics live in SQLite. Uniqueness of
//! `(station_id, date)` and `(station_id, year)` is enforced by the schema and
//! is the last line of defence against duplicate ingestion.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the database at `database_url` and make sure
/// the tables exist.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    if in_memory {
        return connect_in_memory().await;
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    info!("Opened database: {}", database_url);

    init_schema(&pool).await?;
    Ok(pool)
}

/// Private in-memory database. A single long-lived connection keeps the
/// data alive for the lifetime of the pool.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_observations_table(pool).await?;
    create_yearly_stats_table(pool).await?;
    Ok(())
}

async fn create_observations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_data (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            date TEXT NOT NULL,
            max_temp REAL,
            min_temp REAL,
            precipitation REAL CHECK (precipitation IS NULL OR precipitation >= 0),
            UNIQUE (station_id, date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_weather_data_station ON weather_data(station_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_yearly_stats_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS weather_station_yearly_stats (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            station_id TEXT NOT NULL,
            year INTEGER NOT NULL,
            avg_max_temp REAL,
            avg_min_temp REAL,
            total_precipitation REAL NOT NULL DEFAULT 0,
            UNIQUE (station_id, year)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_yearly_stats_station ON weather_station_yearly_stats(station_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_schema_idempotent() {
        let pool = connect_in_memory().await.unwrap();

        init_schema(&pool).await.unwrap();
        init_schema(&pool).await.unwrap();

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
             AND name IN ('weather_data', 'weather_station_yearly_stats')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(tables, 2);
    }

    #[tokio::test]
    async fn test_unique_station_date_enforced() {
        let pool = connect_in_memory().await.unwrap();

        let insert = "INSERT INTO weather_data (station_id, date, max_temp) VALUES ('S1', '2020-01-01', 1.0)";
        sqlx::query(insert).execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_file_database_created() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("weather.db").display());

        let pool = connect(&url, 2).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weather_data")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(dir.path().join("weather.db").exists());
    }
}
