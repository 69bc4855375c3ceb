use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::Result;
use crate::utils::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_COMMIT_TIMEOUT_SECS, DEFAULT_CONFIG_FILE, DEFAULT_DATABASE_URL,
    DEFAULT_DATA_DIR, DEFAULT_INSERT_BATCH_SIZE, DEFAULT_MAX_PER_PAGE, DEFAULT_PER_PAGE,
    ENV_PREFIX, MAX_INSERT_BATCH_SIZE,
};

/// Runtime settings, layered from defaults, an optional TOML file and
/// `WX_*` environment variables (later layers win).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate(length(min = 1))]
    pub database_url: String,

    pub data_dir: PathBuf,

    #[validate(range(min = 1))]
    pub max_workers: usize,

    #[validate(range(min = 1, max = 5000))]
    pub insert_batch_size: usize,

    #[validate(range(min = 1))]
    pub commit_timeout_secs: u64,

    #[validate(length(min = 1))]
    pub bind_address: String,

    #[validate(range(min = 1))]
    pub default_per_page: i64,

    #[validate(range(min = 1))]
    pub max_per_page: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_workers: num_cpus::get(),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
            commit_timeout_secs: DEFAULT_COMMIT_TIMEOUT_SECS,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            default_per_page: DEFAULT_PER_PAGE,
            max_per_page: DEFAULT_MAX_PER_PAGE,
        }
    }
}

impl Settings {
    /// Load settings. An explicit `path` must exist; without one the default
    /// `wx-ingest.toml` in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();

        let mut builder = Config::builder()
            .set_default("database_url", defaults.database_url)?
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?
            .set_default("max_workers", defaults.max_workers as u64)?
            .set_default("insert_batch_size", defaults.insert_batch_size as u64)?
            .set_default("commit_timeout_secs", defaults.commit_timeout_secs)?
            .set_default("bind_address", defaults.bind_address)?
            .set_default("default_per_page", defaults.default_per_page)?
            .set_default("max_per_page", defaults.max_per_page)?;

        builder = match path {
            Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml).required(true)),
            None => builder.add_source(
                File::with_name(DEFAULT_CONFIG_FILE)
                    .format(FileFormat::Toml)
                    .required(false),
            ),
        };

        let settings: Settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn with_database_url(mut self, database_url: Option<String>) -> Self {
        if let Some(url) = database_url {
            self.database_url = url;
        }
        self
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        if let Some(workers) = max_workers {
            self.max_workers = workers.max(1);
        }
        self
    }

    pub fn with_data_dir(mut self, data_dir: Option<PathBuf>) -> Self {
        if let Some(dir) = data_dir {
            self.data_dir = dir;
        }
        self
    }

    pub fn insert_batch_size(&self) -> usize {
        self.insert_batch_size.clamp(1, MAX_INSERT_BATCH_SIZE)
    }
}
