//! Use-case and credential configuration.
//!
//! A use case is described by a YAML file:
//!
//! ```yaml
//! dataset: data/australian_cases.csv
//! timecol: date
//! target: cases
//! series: Province/State
//! metric: RMSE
//! fdw: -28
//! horizon: 7
//! description: Daily case forecasts
//! ref_file: reference.csv
//! states:
//!   - New South Wales
//!   - Victoria
//! ```
//!
//! Platform credentials use the `drconfig.yaml` shape (`endpoint`,
//! `token`) and can be overridden from the environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding the management API endpoint.
pub const ENV_ENDPOINT: &str = "DATAROBOT_ENDPOINT";

/// Environment variable overriding the API token.
pub const ENV_TOKEN: &str = "DATAROBOT_API_TOKEN";

/// Endpoint used when neither the credentials file nor the environment set one.
pub const DEFAULT_ENDPOINT: &str = "https://app.datarobot.com/api/v2";

/// Worker count hint meaning "use every worker available to the project".
pub const MAX_WORKERS: i32 = -1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Datetime partitioning applied when a project's target is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitioningSpec {
    pub datetime_partition_column: String,
    pub use_time_series: bool,
    pub default_to_known_in_advance: bool,
    pub disable_holdout: bool,
    pub number_of_backtests: u32,
    /// ISO-8601 duration, e.g. `P0Y0M7DT0H0M0S`.
    pub validation_duration: String,
    pub feature_derivation_window_start: i32,
    pub feature_derivation_window_end: i32,
    pub forecast_window_start: i32,
    pub forecast_window_end: i32,
}

impl Default for PartitioningSpec {
    fn default() -> Self {
        Self {
            datetime_partition_column: "date".to_string(),
            use_time_series: true,
            default_to_known_in_advance: false,
            disable_holdout: true,
            number_of_backtests: 2,
            validation_duration: duration_days(7),
            feature_derivation_window_start: -28,
            feature_derivation_window_end: 0,
            forecast_window_start: 1,
            forecast_window_end: 7,
        }
    }
}

impl PartitioningSpec {
    /// Canonical text form used when hashing a project's training input.
    pub fn fingerprint(&self) -> String {
        format!(
            "col={};ts={};kia={};noholdout={};bt={};val={};fdw=[{},{}];fw=[{},{}]",
            self.datetime_partition_column,
            self.use_time_series,
            self.default_to_known_in_advance,
            self.disable_holdout,
            self.number_of_backtests,
            self.validation_duration,
            self.feature_derivation_window_start,
            self.feature_derivation_window_end,
            self.forecast_window_start,
            self.forecast_window_end,
        )
    }
}

/// Build an ISO-8601 duration string spanning whole days.
///
/// ```
/// use autocast_core::config::duration_days;
///
/// assert_eq!(duration_days(7), "P0Y0M7DT0H0M0S");
/// ```
pub fn duration_days(days: u32) -> String {
    format!("P0Y0M{days}DT0H0M0S")
}

// ---------------------------------------------------------------------------
// Use case
// ---------------------------------------------------------------------------

/// Settings for one forecasting use case (one dataset, many series).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseCaseConfig {
    /// Path to the CSV dataset.
    pub dataset: PathBuf,
    /// Time column name.
    pub timecol: String,
    /// Target column name.
    pub target: String,
    /// Column holding the series identifier.
    pub series: String,
    /// Optimisation metric, e.g. `RMSE`.
    pub metric: String,
    /// Feature derivation window start (negative, in days).
    pub fdw: i32,
    #[serde(default)]
    pub fdw_end: i32,
    #[serde(default = "default_forecast_window_start")]
    pub forecast_window_start: i32,
    /// Forecast window end; also the number of future days scored.
    pub horizon: i32,
    #[serde(default = "default_backtests")]
    pub backtests: u32,
    #[serde(default = "default_validation_days")]
    pub validation_days: u32,
    #[serde(default)]
    pub description: String,
    /// Reference file mapping series to projects and deployments.
    pub ref_file: PathBuf,
    /// Optional allow-list of series values.
    #[serde(default)]
    pub states: Option<Vec<String>>,
    #[serde(default = "default_out_file")]
    pub out_file: PathBuf,
    /// Number of most recent rows sent with each scoring request.
    #[serde(default = "default_history")]
    pub history: usize,
    #[serde(default = "default_training_timeout_secs")]
    pub training_timeout_secs: u64,
    /// Re-apply drift and association-id settings on reused deployments.
    #[serde(default = "default_true")]
    pub reapply_settings: bool,
    /// Column carrying the synthetic association id.
    #[serde(default = "default_association_id")]
    pub association_id: String,
}

fn default_forecast_window_start() -> i32 {
    1
}

fn default_backtests() -> u32 {
    2
}

fn default_validation_days() -> u32 {
    7
}

fn default_out_file() -> PathBuf {
    PathBuf::from("scores.csv")
}

fn default_history() -> usize {
    28
}

fn default_training_timeout_secs() -> u64 {
    6 * 60 * 60
}

fn default_true() -> bool {
    true
}

fn default_association_id() -> String {
    "id".to_string()
}

impl UseCaseConfig {
    /// Load and validate a use-case file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a use case from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting that would otherwise fail later against the platform.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("timecol", &self.timecol)?;
        require_non_empty("target", &self.target)?;
        require_non_empty("series", &self.series)?;
        require_non_empty("metric", &self.metric)?;
        require_non_empty("association_id", &self.association_id)?;

        if self.dataset.as_os_str().is_empty() {
            return Err(ConfigError::Missing("dataset"));
        }
        if self.ref_file.as_os_str().is_empty() {
            return Err(ConfigError::Missing("ref_file"));
        }
        if self.fdw > self.fdw_end {
            return Err(ConfigError::Invalid {
                field: "fdw",
                reason: format!(
                    "window start {} is after window end {}",
                    self.fdw, self.fdw_end
                ),
            });
        }
        if self.horizon < 1 {
            return Err(ConfigError::Invalid {
                field: "horizon",
                reason: format!("must be at least 1, got {}", self.horizon),
            });
        }
        if self.forecast_window_start > self.horizon {
            return Err(ConfigError::Invalid {
                field: "forecast_window_start",
                reason: format!(
                    "{} is beyond the horizon {}",
                    self.forecast_window_start, self.horizon
                ),
            });
        }
        if self.backtests == 0 {
            return Err(ConfigError::Invalid {
                field: "backtests",
                reason: "at least one backtest is required".to_string(),
            });
        }
        if self.validation_days == 0 {
            return Err(ConfigError::Invalid {
                field: "validation_days",
                reason: "validation duration must be positive".to_string(),
            });
        }
        if self.history == 0 {
            return Err(ConfigError::Invalid {
                field: "history",
                reason: "at least one history row is required".to_string(),
            });
        }
        if let Some(states) = &self.states {
            if states.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "states",
                    reason: "allow-list is present but empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Partitioning applied to every project of this use case.
    pub fn partitioning(&self) -> PartitioningSpec {
        PartitioningSpec {
            datetime_partition_column: self.timecol.clone(),
            use_time_series: true,
            default_to_known_in_advance: false,
            disable_holdout: true,
            number_of_backtests: self.backtests,
            validation_duration: duration_days(self.validation_days),
            feature_derivation_window_start: self.fdw,
            feature_derivation_window_end: self.fdw_end,
            forecast_window_start: self.forecast_window_start,
            forecast_window_end: self.horizon,
        }
    }

    /// Per-series view of this use case.
    pub fn series_config(&self, series: &str) -> SeriesConfig {
        SeriesConfig {
            series: series.to_string(),
            target: self.target.clone(),
            time_column: self.timecol.clone(),
            metric: self.metric.clone(),
            description: self.description.clone(),
            partitioning: self.partitioning(),
        }
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(field))
    } else {
        Ok(())
    }
}

/// One logical forecasting unit. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesConfig {
    pub series: String,
    pub target: String,
    pub time_column: String,
    pub metric: String,
    pub description: String,
    pub partitioning: PartitioningSpec,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Management API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("endpoint", &self.endpoint)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct CredentialsFile {
    endpoint: Option<String>,
    token: Option<String>,
}

impl Credentials {
    /// Resolve credentials from an optional YAML file, then the environment.
    ///
    /// Environment values (looked up through `env`) win over the file. A
    /// missing token is an error; a missing endpoint falls back to
    /// [`DEFAULT_ENDPOINT`].
    pub fn resolve<F>(file: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let from_file = match file {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                serde_yaml::from_str::<CredentialsFile>(&content)?
            }
            None => CredentialsFile::default(),
        };

        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let endpoint = non_empty(env(ENV_ENDPOINT))
            .or_else(|| non_empty(from_file.endpoint))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let token = non_empty(env(ENV_TOKEN))
            .or_else(|| non_empty(from_file.token))
            .ok_or(ConfigError::Missing("token"))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
