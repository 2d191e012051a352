//! Backtest accuracy simulation for one project.
//!
//! Picks the best time series model on the leaderboard, scores its
//! backtests, joins the predictions with the actuals from the dataset and
//! reports how often the RMSE exceeds a baseline.

use autocast_core::accuracy::{
    accuracy_check, accuracy_check_n, actuals_by_day, best_by_metric, failure_rate, join_actuals,
    AccuracyCheck, BacktestPrediction,
};
use autocast_core::config::UseCaseConfig;
use autocast_core::dataset::Dataset;
use autocast_core::error::CoreError;
use autocast_platform::models::{Model, TrainingPredictionRow, TrainingPredictionsRequest};
use autocast_platform::{wait_for_job, Platform};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::WaitConfig;

/// Parameters of one accuracy run.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyOptions {
    pub project_id: String,
    pub series: String,
    /// Fixed baseline. Defaults to the model's backtesting score.
    pub baseline: Option<f64>,
    /// Applied to the backtesting score when no fixed baseline is given.
    pub baseline_multiplier: f64,
    /// Window size for the rolling check.
    pub window: Option<usize>,
}

/// Outcome of an accuracy run.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyReport {
    pub model: Model,
    pub baseline: f64,
    pub points: usize,
    pub checks: Vec<AccuracyCheck>,
    pub rolling: Vec<AccuracyCheck>,
}

impl AccuracyReport {
    pub fn failure_rate(&self) -> f64 {
        failure_rate(&self.checks)
    }

    pub fn rolling_failure_rate(&self) -> f64 {
        failure_rate(&self.rolling)
    }
}

/// Best model by cross-validation score for `metric`, lowest first.
pub async fn best_model<P: Platform>(
    platform: &P,
    project_id: &str,
    metric: &str,
) -> Result<Model, PipelineError> {
    let models = platform.list_models(project_id).await?;
    best_by_metric(&models, |m| m.cross_validation(metric))
        .cloned()
        .ok_or_else(|| PipelineError::NoRankableModel {
            project_id: project_id.to_string(),
            metric: metric.to_string(),
        })
}

/// Backtest rows of `series` that carry both a forecast point and a timestamp.
fn backtest_predictions(rows: Vec<TrainingPredictionRow>, series: &str) -> Vec<BacktestPrediction> {
    rows.into_iter()
        .filter(|row| row.series_id.as_deref().map_or(true, |s| s == series))
        .filter_map(|row| {
            Some(BacktestPrediction {
                forecast_point: row.forecast_point?,
                timestamp: row.timestamp?,
                prediction: row.prediction,
            })
        })
        .collect()
}

/// Compute the model's backtest predictions, or reuse ones already computed.
///
/// Requesting predictions a second time for the same model is rejected by
/// the platform, so any failure other than cancellation falls back to the
/// project's existing training predictions for `model_id`.
async fn backtest_rows<P: Platform>(
    platform: &P,
    project_id: &str,
    model_id: &str,
    wait: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<Vec<TrainingPredictionRow>, PipelineError> {
    let requested = async {
        let job = platform
            .request_training_predictions(
                project_id,
                &TrainingPredictionsRequest::all_backtests(model_id),
            )
            .await?;
        wait_for_job(platform, &job, "training predictions", &wait.job, cancel)
            .await?
            .ok_or(PipelineError::MissingResource {
                what: "training predictions",
            })
    }
    .await;

    let url = match requested {
        Ok(url) => url,
        Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(e) => {
            tracing::warn!(
                project_id,
                model_id,
                error = %e,
                "Backtest prediction request failed, looking for existing predictions",
            );
            let existing = platform.list_training_predictions(project_id).await?;
            match existing.into_iter().find(|p| p.model_id == model_id) {
                Some(found) => found.url,
                None => return Err(e),
            }
        }
    };
    Ok(platform.training_predictions(&url).await?)
}

pub async fn run_accuracy<P: Platform>(
    platform: &P,
    config: &UseCaseConfig,
    dataset: &Dataset,
    options: &AccuracyOptions,
    wait: &WaitConfig,
    cancel: &CancellationToken,
) -> Result<AccuracyReport, PipelineError> {
    let model = best_model(platform, &options.project_id, &config.metric).await?;
    let baseline = match options.baseline {
        Some(b) => b,
        None => model
            .backtesting(&config.metric)
            .map(|b| b * options.baseline_multiplier)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "model {} has no backtesting {} score; pass a baseline",
                    model.id, config.metric
                ))
            })?,
    };
    tracing::info!(project_id = %options.project_id, model_id = %model.id, baseline, "Scoring backtests");

    let rows = backtest_rows(platform, &options.project_id, &model.id, wait, cancel).await?;

    let predictions = backtest_predictions(rows, &options.series);
    let actuals = actuals_by_day(
        dataset,
        &config.series,
        &options.series,
        &config.timecol,
        &config.target,
    )?;
    let points = join_actuals(&predictions, &actuals);

    let checks = accuracy_check(&points, baseline);
    let rolling = options
        .window
        .map(|n| accuracy_check_n(&points, baseline, n))
        .unwrap_or_default();

    Ok(AccuracyReport {
        model,
        baseline,
        points: points.len(),
        checks,
        rolling,
    })
}
