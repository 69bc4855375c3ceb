use crate::error::Result;
use crate::models::YearlyStat;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationSummary {
    pub rows_upserted: usize,
    pub stations: usize,
}

/// Recomputes yearly per-station statistics from the full observation set.
///
/// Averages skip missing values and are NULL when a station-year has none;
/// missing precipitation contributes nothing to the total. Every run
/// overwrites the stored rows, so repeated runs converge on the same result.
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    /// Grouped statistics for every (station, year) in `weather_data`.
    pub async fn compute(&self, pool: &SqlitePool) -> Result<Vec<YearlyStat>> {
        let stats = sqlx::query_as::<_, YearlyStat>(
            r#"
            SELECT station_id,
                   CAST(strftime('%Y', date) AS INTEGER) AS year,
                   AVG(max_temp) AS avg_max_temp,
                   AVG(min_temp) AS avg_min_temp,
                   COALESCE(SUM(precipitation), 0.0) AS total_precipitation
            FROM weather_data
            GROUP BY station_id, year
            ORDER BY station_id, year
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(stats)
    }

    /// Compute and upsert all statistics in one transaction. On failure no
    /// row is changed and the previous statistics stay in place.
    pub async fn run(&self, pool: &SqlitePool) -> Result<AggregationSummary> {
        let stats = self.compute(pool).await?;

        let mut tx = pool.begin().await?;

        for stat in &stats {
            sqlx::query(
                r#"
                INSERT INTO weather_station_yearly_stats
                    (station_id, year, avg_max_temp, avg_min_temp, total_precipitation)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT (station_id, year) DO UPDATE SET
                    avg_max_temp = excluded.avg_max_temp,
                    avg_min_temp = excluded.avg_min_temp,
                    total_precipitation = excluded.total_precipitation
                "#,
            )
            .bind(stat.station_id.as_str())
            .bind(stat.year)
            .bind(stat.avg_max_temp)
            .bind(stat.avg_min_temp)
            .bind(stat.total_precipitation)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let summary = AggregationSummary {
            rows_upserted: stats.len(),
            stations: stats
                .iter()
                .map(|s| s.station_id.as_str())
                .collect::<BTreeSet<_>>()
                .len(),
        };

        info!(
            "Upserted {} yearly statistics for {} stations",
            summary.rows_upserted, summary.stations
        );

        Ok(summary)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
