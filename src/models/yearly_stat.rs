use serde::{Deserialize, Serialize};

/// Annual summary for one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct YearlyStat {
    pub station_id: String,
    pub year: i32,
    pub avg_max_temp: Option<f64>,
    pub avg_min_temp: Option<f64>,
    pub total_precipitation: f64,
}

