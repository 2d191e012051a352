mod common;

use std::sync::Mutex;

use autocast_core::reference::{ReferenceRecord, ReferenceStore};
use autocast_core::scores::ScoreStore;
use autocast_pipeline::scoring::{payload_spec, run_scoring};
use autocast_platform::{PredictionError, PredictionService};
use common::{dataset, use_case};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Answers every request with two forecast rows of a fixed value.
struct FakeScorer {
    requests: Mutex<Vec<(String, String)>>,
    failing_deployment: Option<String>,
    value: f64,
}

impl FakeScorer {
    fn new(value: f64) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing_deployment: None,
            value,
        }
    }
}

impl PredictionService for FakeScorer {
    async fn predict_timeseries(
        &self,
        deployment_id: &str,
        csv: Vec<u8>,
        _forecast_point: Option<&str>,
    ) -> Result<Value, PredictionError> {
        let body = String::from_utf8(csv).unwrap();
        self.requests
            .lock()
            .unwrap()
            .push((deployment_id.to_string(), body));
        if self.failing_deployment.as_deref() == Some(deployment_id) {
            return Err(PredictionError::Status {
                status: 422,
                body: "not enough history".to_string(),
            });
        }
        Ok(json!({"data": [
            {
                "forecastPoint": "2021-03-03T00:00:00Z",
                "timestamp": "2021-03-04T00:00:00Z",
                "seriesId": null,
                "predictionValues": [{"label": "cases", "value": self.value}]
            },
            {
                "forecastPoint": "2021-03-03T00:00:00Z",
                "timestamp": "2021-03-05T00:00:00Z",
                "seriesId": null,
                "predictionValues": [{"label": "cases", "value": self.value}]
            }
        ]}))
    }
}

fn references() -> ReferenceStore {
    let mut store = ReferenceStore::new();
    for (series, deployment) in [("NSW", "d1"), ("VIC", "d2")] {
        store.upsert(ReferenceRecord {
            use_case: series.to_string(),
            latest_project: format!("p-{series}"),
            deployment_id: deployment.to_string(),
            error: None,
            content_key: String::new(),
        });
    }
    store
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scores_every_reference_and_tags_series() {
    let scorer = FakeScorer::new(4.5);
    let config = use_case();
    let mut scores = ScoreStore::new();

    let summary = run_scoring(
        &scorer,
        &dataset(),
        &references(),
        &payload_spec(&config),
        &mut scores,
        &CancellationToken::new(),
    )
    .await;

    assert!(summary.is_success());
    assert_eq!(summary.scored, ["NSW", "VIC"]);
    assert_eq!(summary.rows_added, 4);
    assert_eq!(
        scores.columns(),
        ["forecastPoint", "timestamp", "series", "label", "prediction"]
    );
    assert_eq!(scores.rows()[0][2], "NSW");
    assert_eq!(scores.rows()[2][2], "VIC");

    let requests = scorer.requests.lock().unwrap();
    assert_eq!(requests[0].0, "d1");
    assert_eq!(
        requests[0].1,
        "state,date,cases,id\n\
         NSW,2021-03-02,6,NSW 2021-03-02\n\
         NSW,2021-03-03,5,NSW 2021-03-03\n\
         NSW,2021-03-04,,NSW 2021-03-04\n\
         NSW,2021-03-05,,NSW 2021-03-05\n"
    );
}

#[tokio::test]
async fn rescoring_replaces_instead_of_duplicating() {
    let config = use_case();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scores.csv");

    for value in [4.5, 5.5] {
        let mut scores = ScoreStore::load_or_empty(&path).unwrap();
        run_scoring(
            &FakeScorer::new(value),
            &dataset(),
            &references(),
            &payload_spec(&config),
            &mut scores,
            &CancellationToken::new(),
        )
        .await;
        scores.save(&path).unwrap();
    }

    let scores = ScoreStore::load_or_empty(&path).unwrap();
    assert_eq!(scores.len(), 4);
    assert!(scores.rows().iter().all(|row| row[4] == "5.5"));
}

#[tokio::test]
async fn failed_request_skips_only_that_series() {
    let mut scorer = FakeScorer::new(1.0);
    scorer.failing_deployment = Some("d1".to_string());
    let config = use_case();
    let mut scores = ScoreStore::new();

    let summary = run_scoring(
        &scorer,
        &dataset(),
        &references(),
        &payload_spec(&config),
        &mut scores,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(summary.scored, ["VIC"]);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].error, "422 Error: not enough history");
    assert_eq!(scores.len(), 2);
}

#[tokio::test]
async fn series_missing_from_dataset_is_a_failure() {
    let mut refs = references();
    refs.upsert(ReferenceRecord {
        use_case: "TAS".to_string(),
        latest_project: "p-TAS".to_string(),
        deployment_id: "d3".to_string(),
        error: None,
        content_key: String::new(),
    });
    let scorer = FakeScorer::new(1.0);
    let mut scores = ScoreStore::new();

    let summary = run_scoring(
        &scorer,
        &dataset(),
        &refs,
        &payload_spec(&use_case()),
        &mut scores,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].series, "TAS");
    assert_eq!(scorer.requests.lock().unwrap().len(), 2);
}
