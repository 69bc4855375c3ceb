use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::models::{Observation, Page, PageRequest, YearlyStat};

/// Optional exact-match filters for observation reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ObservationFilter {
    pub station_id: Option<String>,
    pub date: Option<NaiveDate>,
}

/// One page of observations, ordered by station then date.
pub async fn query_observations(
    pool: &SqlitePool,
    filter: &ObservationFilter,
    request: PageRequest,
) -> Result<Page<Observation>> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM weather_data
         WHERE (?1 IS NULL OR station_id = ?1) AND (?2 IS NULL OR date = ?2)",
    )
    .bind(filter.station_id.as_deref())
    .bind(filter.date)
    .fetch_one(pool)
    .await?;

    let data = sqlx::query_as::<_, Observation>(
        "SELECT station_id, date, max_temp, min_temp, precipitation
         FROM weather_data
         WHERE (?1 IS NULL OR station_id = ?1) AND (?2 IS NULL OR date = ?2)
         ORDER BY station_id, date
         LIMIT ?3 OFFSET ?4",
    )
    .bind(filter.station_id.as_deref())
    .bind(filter.date)
    .bind(request.per_page)
    .bind(request.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(request, total, data))
}

/// One page of yearly statistics, ordered by station then year.
pub async fn query_yearly_stats(
    pool: &SqlitePool,
    station_id: Option<&str>,
    request: PageRequest,
) -> Result<Page<YearlyStat>> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM weather_station_yearly_stats WHERE (?1 IS NULL OR station_id = ?1)",
    )
    .bind(station_id)
    .fetch_one(pool)
    .await?;

    let data = sqlx::query_as::<_, YearlyStat>(
        "SELECT station_id, year, avg_max_temp, avg_min_temp, total_precipitation
         FROM weather_station_yearly_stats
         WHERE (?1 IS NULL OR station_id = ?1)
         ORDER BY station_id, year
         LIMIT ?2 OFFSET ?3",
    )
    .bind(station_id)
    .bind(request.per_page)
    .bind(request.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(request, total, data))
}

pub async fn count_observations(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM weather_data")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
