use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One station's reading for one calendar day.
///
/// Temperatures are in degrees Celsius and precipitation in millimetres,
/// already scaled from the tenths used by the source files. `None` means the
/// source carried the missing-value sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Observation {
    pub station_id: String,
    pub date: NaiveDate,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub precipitation: Option<f64>,
}

/// Identity of an observation in the permanent store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationKey {
    pub station_id: String,
    pub date: NaiveDate,
}

impl ObservationKey {
    pub fn new(station_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            station_id: station_id.into(),
            date,
        }
    }
}

impl Observation {
    pub fn new(
        station_id: String,
        date: NaiveDate,
        max_temp: Option<f64>,
        min_temp: Option<f64>,
        precipitation: Option<f64>,
    ) -> Self {
        Self {
            station_id,
            date,
            max_temp,
            min_temp,
            precipitation,
        }
    }

    pub fn key(&self) -> ObservationKey {
        ObservationKey::new(self.station_id.clone(), self.date)
    }
}

/// A validated observation held for one ingestion run, tagged with where it
/// came from so that in-run duplicates can be resolved by source order.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingRecord {
    pub observation: Observation,
    pub file_index: usize,
    pub line_number: usize,
}

impl StagingRecord {
    pub fn new(observation: Observation, file_index: usize, line_number: usize) -> Self {
        Self {
            observation,
            file_index,
            line_number,
        }
    }

    /// Position of this record in the run's source order: files sorted by
    /// name, then lines within a file.
    pub fn source_rank(&self) -> (usize, usize) {
        (self.file_index, self.line_number)
    }
}
