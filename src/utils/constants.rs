/// Source value that marks a missing reading
pub const MISSING_SENTINEL: i64 = -9999;

/// Source files carry tenths of a degree / tenths of a millimetre
pub const SOURCE_SCALE: f64 = 10.0;

/// Expected tab-separated fields: DATE, TMAX, TMIN, PRCP
pub const FIELD_COUNT: usize = 4;
pub const FIELD_SEPARATOR: char = '\t';
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Station data files
pub const STATION_FILE_EXTENSION: &str = "txt";

/// Processing defaults
pub const DEFAULT_INSERT_BATCH_SIZE: usize = 500;
pub const MAX_INSERT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_COMMIT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB
pub const MAX_REJECTION_SAMPLES: usize = 20;

/// Store and API defaults
pub const DEFAULT_DATABASE_URL: &str = "sqlite://weather.db?mode=rwc";
pub const DEFAULT_DATA_DIR: &str = "wx_data";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
pub const DEFAULT_CONFIG_FILE: &str = "wx-ingest.toml";
pub const ENV_PREFIX: &str = "WX";

/// Pagination defaults
pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PER_PAGE: i64 = 10;
pub const DEFAULT_MAX_PER_PAGE: i64 = 100;
