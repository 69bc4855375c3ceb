use crate::error::Result;
use crate::models::ObservationKey;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::info;

/// Keys already present in the permanent store, captured once at the start
/// of an ingestion run. The index is never updated during the run.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    keys: HashSet<ObservationKey>,
}

impl DedupIndex {
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let rows: Vec<(String, NaiveDate)> =
            sqlx::query_as("SELECT station_id, date FROM weather_data")
                .fetch_all(pool)
                .await?;

        let index = Self::from_keys(
            rows.into_iter()
                .map(|(station_id, date)| ObservationKey::new(station_id, date)),
        );

        info!("Loaded {} existing observation keys", index.len());
        Ok(index)
    }

    pub fn from_keys<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = ObservationKey>,
    {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn contains(&self, key: &ObservationKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
