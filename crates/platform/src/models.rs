//! Request and response bodies of the platform management API.
//!
//! Field names follow the API's camelCase JSON; only the fields this
//! workspace reads or writes are modelled, everything else is ignored.

use std::collections::HashMap;

use autocast_core::config::SeriesConfig;
use autocast_core::types::RemoteId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// A modeling project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: RemoteId,
    pub project_name: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
}

/// Autopilot progress reported by `GET projects/{id}/status/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotStatus {
    pub autopilot_done: bool,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub stage_description: Option<String>,
}

/// Target and datetime partitioning submitted to `PATCH projects/{id}/aim/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AimRequest {
    pub target: String,
    pub metric: String,
    pub mode: String,
    pub cv_method: String,
    pub datetime_partition_column: String,
    pub use_time_series: bool,
    pub default_to_known_in_advance: bool,
    pub disable_holdout: bool,
    pub number_of_backtests: u32,
    pub validation_duration: String,
    pub feature_derivation_window_start: i32,
    pub feature_derivation_window_end: i32,
    pub forecast_window_start: i32,
    pub forecast_window_end: i32,
}

impl AimRequest {
    /// Full autopilot with datetime partitioning for one series.
    pub fn for_series(config: &SeriesConfig) -> Self {
        let p = &config.partitioning;
        Self {
            target: config.target.clone(),
            metric: config.metric.clone(),
            mode: "auto".to_string(),
            cv_method: "datetime".to_string(),
            datetime_partition_column: p.datetime_partition_column.clone(),
            use_time_series: p.use_time_series,
            default_to_known_in_advance: p.default_to_known_in_advance,
            disable_holdout: p.disable_holdout,
            number_of_backtests: p.number_of_backtests,
            validation_duration: p.validation_duration.clone(),
            feature_derivation_window_start: p.feature_derivation_window_start,
            feature_derivation_window_end: p.feature_derivation_window_end,
            forecast_window_start: p.forecast_window_start,
            forecast_window_end: p.forecast_window_end,
        }
    }
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

/// The platform's pick for deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedModel {
    pub model_id: RemoteId,
    #[serde(default)]
    pub recommendation_type: Option<String>,
}

/// Scores of one metric across partitions. Unscored partitions are `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricScores {
    #[serde(default)]
    pub validation: Option<f64>,
    #[serde(default)]
    pub cross_validation: Option<f64>,
    #[serde(default)]
    pub backtesting: Option<f64>,
    #[serde(default)]
    pub holdout: Option<f64>,
}

/// A leaderboard model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: RemoteId,
    pub project_id: RemoteId,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub metrics: HashMap<String, MetricScores>,
}

impl Model {
    /// Cross-validation score for `metric`, if computed.
    pub fn cross_validation(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).and_then(|m| m.cross_validation)
    }

    /// Backtesting score for `metric`, if computed.
    pub fn backtesting(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).and_then(|m| m.backtesting)
    }
}

/// A model retrained from a parent with frozen parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrozenModel {
    pub id: RemoteId,
    pub parent_model_id: RemoteId,
}

// ---------------------------------------------------------------------------
// Deployments
// ---------------------------------------------------------------------------

/// A deployment serving one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: RemoteId,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST deployments/fromLearningModel/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentCreate {
    pub model_id: RemoteId,
    pub label: String,
    pub description: String,
    pub default_prediction_server_id: RemoteId,
}

/// `{"id": ...}` as returned by creation endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedId {
    pub id: RemoteId,
}

/// Toggle used by drift settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enabled {
    pub enabled: bool,
}

/// Association-id settings of a deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationIdSettings {
    pub column_names: Vec<String>,
    pub required_in_prediction_requests: bool,
}

/// Body of `PATCH deployments/{id}/settings/`. Absent sections are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_drift: Option<Enabled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_drift: Option<Enabled>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association_id: Option<AssociationIdSettings>,
}

impl DeploymentSettings {
    /// Enable both target and feature drift tracking.
    pub fn drift_tracking() -> Self {
        Self {
            target_drift: Some(Enabled { enabled: true }),
            feature_drift: Some(Enabled { enabled: true }),
            ..Self::default()
        }
    }

    /// Require `column` as the association id on every prediction request.
    pub fn required_association_id(column: &str) -> Self {
        Self {
            association_id: Some(AssociationIdSettings {
                column_names: vec![column.to_string()],
                required_in_prediction_requests: true,
            }),
            ..Self::default()
        }
    }
}

/// A prediction server deployments can be bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionServer {
    pub id: RemoteId,
    pub url: String,
    #[serde(rename = "datarobot-key", default)]
    pub datarobot_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Training predictions
// ---------------------------------------------------------------------------

/// Body of `POST projects/{id}/trainingPredictions/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPredictionsRequest {
    pub model_id: RemoteId,
    pub data_subset: String,
}

impl TrainingPredictionsRequest {
    /// Predictions over every backtest partition.
    pub fn all_backtests(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            data_subset: "allBacktests".to_string(),
        }
    }
}

/// Entry of `GET projects/{id}/trainingPredictions/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPredictionsInfo {
    pub id: RemoteId,
    pub model_id: RemoteId,
    #[serde(default)]
    pub data_subset: Option<String>,
    /// Where the prediction rows are served.
    pub url: String,
}

/// One row of backtest predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPredictionRow {
    #[serde(default)]
    pub row_id: Option<i64>,
    #[serde(default)]
    pub partition_id: Option<String>,
    pub prediction: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub forecast_point: Option<String>,
    #[serde(default)]
    pub forecast_distance: Option<i64>,
    #[serde(default)]
    pub series_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Shared envelopes
// ---------------------------------------------------------------------------

/// Paginated list envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Body of `GET status/{id}/` while an async job is still running.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AsyncStatus {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Handle to an asynchronous platform job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncJob {
    /// Absolute status URL from the `Location` header.
    pub status_url: String,
}

/// State of an asynchronous job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Running,
    /// Finished; `resource` is the URL of the created resource, if any.
    Completed { resource: Option<String> },
}

/// Extract the id following `collection` in a resource URL.
///
/// ```
/// use autocast_platform::models::resource_id;
///
/// let url = "https://host/api/v2/projects/5f1a/";
/// assert_eq!(resource_id(url, "projects").as_deref(), Some("5f1a"));
/// ```
pub fn resource_id(url: &str, collection: &str) -> Option<String> {
    let mut segments = url.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == collection)?;
    segments.next().map(str::to_string)
}
