//! Client for a dedicated prediction server.
//!
//! Scoring goes to the prediction server a deployment is bound to, not to
//! the management API. Requests carry the server's `datarobot-key` and
//! the API token.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::models::PredictionServer;

/// Largest request body the prediction server accepts.
pub const MAX_PREDICTION_FILE_SIZE_BYTES: usize = 52_428_800; // 50 MiB

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Errors from scoring requests.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer from the prediction server.
    #[error("{status} Error: {body}")]
    Status { status: u16, body: String },

    #[error("Input file is too large: {size} bytes. Max allowed size is: {max} bytes.")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Prediction server {0} has no datarobot-key")]
    MissingKey(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Reject bodies of [`MAX_PREDICTION_FILE_SIZE_BYTES`] or more.
pub fn check_payload_size(size: usize) -> Result<(), PredictionError> {
    if size >= MAX_PREDICTION_FILE_SIZE_BYTES {
        return Err(PredictionError::PayloadTooLarge {
            size,
            max: MAX_PREDICTION_FILE_SIZE_BYTES,
        });
    }
    Ok(())
}

/// Time series scoring against a deployment.
pub trait PredictionService: Send + Sync {
    /// Score a CSV body. `forecast_point` pins the forecast origin.
    fn predict_timeseries(
        &self,
        deployment_id: &str,
        csv: Vec<u8>,
        forecast_point: Option<&str>,
    ) -> impl Future<Output = Result<Value, PredictionError>> + Send;
}

/// HTTP client for one prediction server.
pub struct PredictionClient {
    client: reqwest::Client,
    server_url: String,
    datarobot_key: String,
    token: String,
}

impl PredictionClient {
    pub fn new(server_url: &str, datarobot_key: &str, token: &str) -> Result<Self, PredictionError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
            datarobot_key: datarobot_key.to_string(),
            token: token.to_string(),
        })
    }

    /// Client for a server as listed by the management API.
    pub fn for_server(server: &PredictionServer, token: &str) -> Result<Self, PredictionError> {
        let key = server
            .datarobot_key
            .as_deref()
            .ok_or_else(|| PredictionError::MissingKey(server.id.clone()))?;
        Self::new(&server.url, key, token)
    }

    /// Score a CSV file from disk.
    pub async fn predict_file(
        &self,
        deployment_id: &str,
        path: &Path,
        forecast_point: Option<&str>,
    ) -> Result<Value, PredictionError> {
        let csv = tokio::fs::read(path).await.map_err(|source| PredictionError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.predict_timeseries(deployment_id, csv, forecast_point).await
    }

    fn endpoint(&self, deployment_id: &str) -> String {
        format!(
            "{}/predApi/v1.0/deployments/{}/timeSeriesPredictions",
            self.server_url, deployment_id
        )
    }
}

impl PredictionService for PredictionClient {
    async fn predict_timeseries(
        &self,
        deployment_id: &str,
        csv: Vec<u8>,
        forecast_point: Option<&str>,
    ) -> Result<Value, PredictionError> {
        check_payload_size(csv.len())?;

        let mut request = self
            .client
            .post(self.endpoint(deployment_id))
            .header(CONTENT_TYPE, "text/plain; charset=UTF-8")
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header("datarobot-key", &self.datarobot_key)
            .body(csv);
        if let Some(point) = forecast_point {
            request = request.query(&[("forecastPoint", point)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(deployment_id, status = status.as_u16(), "Prediction request rejected");
            return Err(PredictionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
