//! Support code for the `autocast` binary: logging setup, configuration
//! and credential loading, and run reports.

use std::path::{Path, PathBuf};

use anyhow::Context;
use autocast_core::config::{Credentials, UseCaseConfig};
use autocast_pipeline::accuracy::AccuracyReport;
use autocast_pipeline::retrain::{RetrainSummary, SeriesFailure};
use autocast_pipeline::scoring::ScoringSummary;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Credentials file picked up from the working directory when none is given.
pub const DEFAULT_CREDENTIALS_FILE: &str = "drconfig.yaml";

/// Default log filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "autocast=info";

/// Install the global tracing subscriber.
pub fn init_logging(json: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

pub fn load_use_case(path: &Path) -> anyhow::Result<UseCaseConfig> {
    UseCaseConfig::load(path)
        .with_context(|| format!("Failed to load use case config {}", path.display()))
}

/// The credentials file to read: the explicit one, or `drconfig.yaml` if present.
pub fn credentials_file(explicit: Option<PathBuf>, cwd: &Path) -> Option<PathBuf> {
    explicit.or_else(|| {
        let fallback = cwd.join(DEFAULT_CREDENTIALS_FILE);
        fallback.exists().then_some(fallback)
    })
}

/// Resolve credentials from the file (if any) and the process environment.
pub fn load_credentials(file: Option<&Path>) -> anyhow::Result<Credentials> {
    Credentials::resolve(file, |key| std::env::var(key).ok())
        .context("Failed to resolve platform credentials")
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

fn failure_lines(failures: &[SeriesFailure]) -> Vec<String> {
    failures
        .iter()
        .map(|f| format!("  FAILED {}: {}", f.series, f.error))
        .collect()
}

/// Human-readable end-of-run summary of a retraining run.
pub fn render_retrain_summary(summary: &RetrainSummary) -> String {
    let mut lines = vec![format!(
        "retrain: {} provisioned ({} created, {} reused, {} stale), {} failed",
        summary.records.len(),
        summary.created_projects.len(),
        summary.reused_projects.len(),
        summary.stale_projects.len(),
        summary.failures.len(),
    )];
    for series in &summary.stale_projects {
        lines.push(format!("  STALE {series}: project data differs from the dataset"));
    }
    lines.extend(failure_lines(&summary.failures));
    if summary.cancelled {
        lines.push("  run was cancelled before every series was processed".to_string());
    }
    lines.join("\n")
}

/// Human-readable end-of-run summary of a scoring run.
pub fn render_scoring_summary(summary: &ScoringSummary) -> String {
    let mut lines = vec![format!(
        "predict: {} series scored, {} new rows, {} failed",
        summary.scored.len(),
        summary.rows_added,
        summary.failures.len(),
    )];
    lines.extend(failure_lines(&summary.failures));
    if summary.cancelled {
        lines.push("  run was cancelled before every series was scored".to_string());
    }
    lines.join("\n")
}

/// Table of accuracy checks followed by failure rates.
pub fn render_accuracy_report(report: &AccuracyReport) -> String {
    let mut lines = vec![
        format!(
            "model {} ({} backtest points), baseline {:.4}",
            report.model.id, report.points, report.baseline
        ),
        "forecast_point,rmse,failed".to_string(),
    ];
    for check in &report.checks {
        lines.push(format!("{},{:.4},{}", check.forecast_point, check.rmse, check.failed));
    }
    lines.push(format!("failure rate: {:.3}", report.failure_rate()));

    if !report.rolling.is_empty() {
        lines.push("rolling forecast_point,rmse,failed".to_string());
        for check in &report.rolling {
            lines.push(format!("{},{:.4},{}", check.forecast_point, check.rmse, check.failed));
        }
        lines.push(format!("rolling failure rate: {:.3}", report.rolling_failure_rate()));
    }
    lines.join("\n")
}
