//! The scoring flow: one time series prediction request per reference record.

use autocast_core::config::UseCaseConfig;
use autocast_core::dataset::Dataset;
use autocast_core::parser::{parse_predictions, ParseOptions, PredictionTable, COL_SERIES};
use autocast_core::payload::{build_payload, PayloadSpec};
use autocast_core::reference::{ReferenceRecord, ReferenceStore};
use autocast_core::scores::ScoreStore;
use autocast_platform::PredictionService;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::retrain::SeriesFailure;

/// What happened during one scoring run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringSummary {
    pub scored: Vec<String>,
    /// Rows that were new to the score store.
    pub rows_added: usize,
    pub failures: Vec<SeriesFailure>,
    pub cancelled: bool,
}

impl ScoringSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Payload layout for a use case.
pub fn payload_spec(config: &UseCaseConfig) -> PayloadSpec {
    PayloadSpec {
        series_column: config.series.clone(),
        time_column: config.timecol.clone(),
        association_column: config.association_id.clone(),
        history: config.history,
        horizon: u32::try_from(config.horizon).unwrap_or(0),
    }
}

/// Build, send and parse the prediction request of one series.
///
/// The returned rows carry the record's `use_case` in the series column.
pub async fn score_series<S: PredictionService>(
    service: &S,
    dataset: &Dataset,
    record: &ReferenceRecord,
    spec: &PayloadSpec,
) -> Result<PredictionTable, PipelineError> {
    let payload = build_payload(dataset, &record.use_case, spec)?;
    let body = payload.to_csv_string()?.into_bytes();

    tracing::debug!(
        series = %record.use_case,
        deployment_id = %record.deployment_id,
        rows = payload.rows.len(),
        last_known_date = %payload.last_known_date,
        "Sending prediction request",
    );
    let response = service
        .predict_timeseries(&record.deployment_id, body, None)
        .await?;

    let mut table = parse_predictions(
        &response,
        ParseOptions {
            timeseries: true,
            passthrough: false,
        },
    )?;
    table.set_column(COL_SERIES, &record.use_case);
    Ok(table)
}

/// Score every series in `references` and add the results to `scores`.
///
/// A series whose request or parsing fails is logged and skipped. The
/// caller persists `scores` afterwards.
pub async fn run_scoring<S: PredictionService>(
    service: &S,
    dataset: &Dataset,
    references: &ReferenceStore,
    spec: &PayloadSpec,
    scores: &mut ScoreStore,
    cancel: &CancellationToken,
) -> ScoringSummary {
    let mut summary = ScoringSummary::default();

    for record in references.records() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                summary.cancelled = true;
                break;
            }
            result = score_series(service, dataset, record, spec) => result,
        };

        match result.and_then(|table| Ok(scores.append(&table)?)) {
            Ok(added) => {
                tracing::info!(series = %record.use_case, rows_added = added, "Series scored");
                summary.rows_added += added;
                summary.scored.push(record.use_case.clone());
            }
            Err(e) => {
                tracing::error!(series = %record.use_case, error = %e, "Failed to score series");
                summary.failures.push(SeriesFailure {
                    series: record.use_case.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary
}
