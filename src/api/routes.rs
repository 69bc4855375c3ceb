use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::ApiError;
use crate::settings::Settings;
use crate::error::{ProcessingError, Result};
use crate::models::{Observation, Page, PageRequest, YearlyStat};
use crate::store::{query_observations, query_yearly_stats, ObservationFilter};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub default_per_page: i64,
    pub max_per_page: i64,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: &Settings) -> Self {
        Self {
            db,
            default_per_page: settings.default_per_page,
            max_per_page: settings.max_per_page,
        }
    }

    fn page_request(&self, page: Option<i64>, per_page: Option<i64>) -> Result<PageRequest> {
        PageRequest::new(page.unwrap_or(1), per_page.unwrap_or(self.default_per_page))
            .validated(self.max_per_page)
    }
}

#[derive(Debug, Deserialize)]
pub struct WeatherParams {
    pub station_id: Option<String>,
    pub date: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    pub station_id: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/weather", get(weather))
        .route("/api/weather/stats", get(weather_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the read API until Ctrl-C.
pub async fn serve(db: SqlitePool, settings: &Settings) -> Result<()> {
    let app = router(AppState::new(db, settings));
    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;

    info!("Listening on {}", settings.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down API server");
        })
        .await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/weather
async fn weather(
    State(state): State<AppState>,
    params: std::result::Result<Query<WeatherParams>, QueryRejection>,
) -> std::result::Result<Json<Page<Observation>>, ApiError> {
    let Query(params) = params?;
    let request = state.page_request(params.page, params.per_page)?;
    let filter = ObservationFilter {
        station_id: non_empty(params.station_id),
        date: non_empty(params.date).as_deref().map(parse_date).transpose()?,
    };

    let page = query_observations(&state.db, &filter, request).await?;
    Ok(Json(page))
}

/// GET /api/weather/stats
async fn weather_stats(
    State(state): State<AppState>,
    params: std::result::Result<Query<StatsParams>, QueryRejection>,
) -> std::result::Result<Json<Page<YearlyStat>>, ApiError> {
    let Query(params) = params?;
    let request = state.page_request(params.page, params.per_page)?;
    let station_id = non_empty(params.station_id);

    let page = query_yearly_stats(&state.db, station_id.as_deref(), request).await?;
    Ok(Json(page))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Accepts `YYYY-MM-DD` or the source files' `YYYYMMDD`.
fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y%m%d"))
        .map_err(|_| ProcessingError::InvalidInput(format!("invalid date '{}'", value)))
}
