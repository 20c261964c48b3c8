//! Server configuration.
//!
//! Layers, lowest precedence first: built-in defaults, a TOML file
//! (`salecast.toml` or the `--config` path), then `SALECAST_` environment
//! variables with `__` separating nested keys (`SALECAST_PIPELINE__TOP_N=3`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use salecast_core::{
    Criterion, EstimatorKind, FeatureConfig, FutureHolidayPolicy, HolidaySource, PipelineConfig,
    SelectionStrategy,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use validator::{Validate, ValidationError};

pub const DEFAULT_CONFIG_FILE: &str = "salecast.toml";
pub const ENV_PREFIX: &str = "SALECAST_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid pipeline settings: {0}")]
    Pipeline(#[from] salecast_core::ForecastError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_horizons"))]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    /// Parent of the per-request scratch directories.
    #[validate(custom(function = "validate_path"))]
    pub upload_dir: PathBuf,

    #[validate(range(min = 1))]
    pub max_upload_bytes: usize,

    #[validate(range(min = 1))]
    pub default_horizon: usize,

    #[validate(range(min = 1))]
    pub max_horizon: usize,

    /// Wall-clock limit of one forecast request; the run is cancelled when
    /// it expires.
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,

    /// Budget of a single candidate fit; unbounded when absent.
    #[validate(range(min = 1))]
    pub fit_budget_secs: Option<u64>,

    pub cors: bool,

    pub estimator: EstimatorKind,

    #[validate(nested)]
    pub pipeline: PipelineSettings,
}

/// The `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PipelineSettings {
    pub fill_missing_days: bool,
    pub holiday_source: HolidaySource,
    pub future_holidays: FutureHolidayPolicy,
    pub use_temperature: bool,

    #[validate(custom(function = "validate_open_unit"))]
    pub confidence_level: f64,

    #[validate(custom(function = "validate_train_fraction"))]
    pub train_fraction: f64,

    #[validate(range(min = 1))]
    pub top_n: usize,

    pub criterion: Criterion,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let preset = PipelineConfig::server();
        Self {
            fill_missing_days: preset.features.fill_missing_days,
            holiday_source: preset.features.holiday_source,
            future_holidays: preset.features.future_holidays,
            use_temperature: preset.features.use_temperature,
            confidence_level: preset.confidence_level,
            train_fraction: preset.train_fraction,
            top_n: preset.top_n,
            criterion: preset.selection.criterion,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            upload_dir: std::env::temp_dir(),
            max_upload_bytes: 16 * 1024 * 1024,
            default_horizon: 30,
            max_horizon: 365,
            request_timeout_ms: 120_000,
            fit_budget_secs: Some(20),
            cors: true,
            estimator: EstimatorKind::Css,
            pipeline: PipelineSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `salecast.toml` (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load from `path` (skipped when missing) and the environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        let config = Self::from_figment(figment)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pipeline settings for the upload endpoint.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        let p = &self.pipeline;
        let config = PipelineConfig {
            features: FeatureConfig {
                holiday_source: p.holiday_source,
                future_holidays: p.future_holidays,
                fill_missing_days: p.fill_missing_days,
                use_temperature: p.use_temperature,
            },
            selection: SelectionStrategy::fixed_grid().with_criterion(p.criterion),
            estimator: self.estimator,
            fit_budget: self.fit_budget_secs.map(Duration::from_secs),
            confidence_level: p.confidence_level,
            train_fraction: p.train_fraction,
            top_n: p.top_n,
            ..PipelineConfig::server()
        };
        config.validate()?;
        Ok(config)
    }
}

fn validate_path(path: &PathBuf) -> Result<(), ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(ValidationError::new("path_empty"));
    }
    Ok(())
}

fn validate_open_unit(value: f64) -> Result<(), ValidationError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ValidationError::new("outside_open_unit_interval"))
    }
}

fn validate_train_fraction(value: f64) -> Result<(), ValidationError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ValidationError::new("train_fraction_out_of_range"))
    }
}

fn validate_horizons(config: &ServerConfig) -> Result<(), ValidationError> {
    if config.default_horizon > config.max_horizon {
        return Err(ValidationError::new("default_horizon_exceeds_max_horizon"));
    }
    Ok(())
}
