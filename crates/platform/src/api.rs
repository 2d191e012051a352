//! REST client for the platform management API.
//!
//! [`Platform`] is the seam the pipeline talks to; [`PlatformApi`] is the
//! HTTP implementation using [`reqwest`]. Asynchronous jobs are returned
//! as [`AsyncJob`] handles and awaited with [`wait_for_job`].

use std::future::Future;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::models::{
    AimRequest, AsyncJob, AsyncStatus, AutopilotStatus, CreatedId, Deployment, DeploymentCreate,
    DeploymentSettings, FrozenModel, JobState, Model, Page, PredictionServer, Project,
    RecommendedModel, TrainingPredictionRow, TrainingPredictionsInfo, TrainingPredictionsRequest,
};
use crate::poll::{poll_until, PollConfig, PollError};

/// Per-request timeout. Dataset uploads are the slowest calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the management API layer.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform returned a non-2xx status code.
    #[error("Platform API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    #[error("{0} response had no usable Location header")]
    MissingLocation(&'static str),

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("Async job {status}: {message}")]
    JobFailed { status: String, message: String },

    #[error("Timed out waiting for {what} after {}s", waited.as_secs())]
    TimedOut { what: String, waited: Duration },

    #[error("Cancelled while waiting for {0}")]
    Cancelled(String),
}

impl PlatformError {
    /// Translate a polling failure for the job named `what`.
    pub fn from_poll(what: &str, err: PollError<PlatformError>) -> Self {
        match err {
            PollError::TimedOut { waited } => Self::TimedOut {
                what: what.to_string(),
                waited,
            },
            PollError::Cancelled => Self::Cancelled(what.to_string()),
            PollError::Failed(e) => e,
        }
    }
}

/// A created resource, plus the job to await if creation is still running.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted<T> {
    pub value: T,
    pub job: Option<AsyncJob>,
}

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// Operations the pipeline needs from the modeling platform.
///
/// Implementations must be `Send + Sync` so they can be shared across
/// tasks.
pub trait Platform: Send + Sync {
    fn list_projects(&self) -> impl Future<Output = Result<Vec<Project>, PlatformError>> + Send;

    fn get_project(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Project, PlatformError>> + Send;

    /// Upload a CSV dataset as a new project. The job resolves to the project URL.
    fn create_project(
        &self,
        name: &str,
        file_name: &str,
        csv: Vec<u8>,
    ) -> impl Future<Output = Result<AsyncJob, PlatformError>> + Send;

    fn set_worker_count(
        &self,
        project_id: &str,
        workers: i32,
    ) -> impl Future<Output = Result<(), PlatformError>> + Send;

    /// Set the target and start autopilot.
    fn start_autopilot(
        &self,
        project_id: &str,
        request: &AimRequest,
    ) -> impl Future<Output = Result<Option<AsyncJob>, PlatformError>> + Send;

    fn autopilot_status(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<AutopilotStatus, PlatformError>> + Send;

    /// `None` when the platform has no recommendation yet.
    fn recommended_model(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Option<RecommendedModel>, PlatformError>> + Send;

    fn get_model(
        &self,
        project_id: &str,
        model_id: &str,
    ) -> impl Future<Output = Result<Model, PlatformError>> + Send;

    fn list_models(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<Model>, PlatformError>> + Send;

    /// Parent of a frozen model. `None` when the model is not frozen.
    fn frozen_parent_id(
        &self,
        project_id: &str,
        model_id: &str,
    ) -> impl Future<Output = Result<Option<String>, PlatformError>> + Send;

    fn list_deployments(
        &self,
    ) -> impl Future<Output = Result<Vec<Deployment>, PlatformError>> + Send;

    fn create_deployment(
        &self,
        request: &DeploymentCreate,
    ) -> impl Future<Output = Result<Accepted<Deployment>, PlatformError>> + Send;

    fn update_deployment_settings(
        &self,
        deployment_id: &str,
        settings: &DeploymentSettings,
    ) -> impl Future<Output = Result<Option<AsyncJob>, PlatformError>> + Send;

    fn list_prediction_servers(
        &self,
    ) -> impl Future<Output = Result<Vec<PredictionServer>, PlatformError>> + Send;

    /// Request backtest predictions. The job resolves to the predictions URL.
    fn request_training_predictions(
        &self,
        project_id: &str,
        request: &TrainingPredictionsRequest,
    ) -> impl Future<Output = Result<AsyncJob, PlatformError>> + Send;

    /// Training predictions already computed for the project's models.
    fn list_training_predictions(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<Vec<TrainingPredictionsInfo>, PlatformError>> + Send;

    fn training_predictions(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Vec<TrainingPredictionRow>, PlatformError>> + Send;

    fn job_state(
        &self,
        job: &AsyncJob,
    ) -> impl Future<Output = Result<JobState, PlatformError>> + Send;
}

/// Poll `job` until it completes, returning the created resource URL.
pub async fn wait_for_job<P: Platform>(
    platform: &P,
    job: &AsyncJob,
    what: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<Option<String>, PlatformError> {
    poll_until(what, config, cancel, move || async move {
        let state = platform.job_state(job).await?;
        Ok::<_, PlatformError>(match state {
            JobState::Running => None,
            JobState::Completed { resource } => Some(resource),
        })
    })
    .await
    .map_err(|e| PlatformError::from_poll(what, e))
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// HTTP client for one platform endpoint.
pub struct PlatformApi {
    client: reqwest::Client,
    api_url: String,
    token: String,
}

impl PlatformApi {
    /// Create a client for `endpoint` (e.g. `https://app.datarobot.com/api/v2`).
    ///
    /// Redirects are not followed: a `303 See Other` from a status URL is
    /// how the platform reports a finished job.
    pub fn new(endpoint: &str, token: &str) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("autocast/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, endpoint, token))
    }

    /// Reuse an existing [`reqwest::Client`]. It should not follow redirects.
    pub fn with_client(client: reqwest::Client, endpoint: &str, token: &str) -> Self {
        Self {
            client,
            api_url: endpoint.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    /// Resolve a `Location` or `next` link against the endpoint.
    fn resolve(&self, link: &str) -> Result<String, PlatformError> {
        let base = reqwest::Url::parse(&format!("{}/", self.api_url))
            .map_err(|_| PlatformError::InvalidUrl(self.api_url.clone()))?;
        base.join(link)
            .map(String::from)
            .map_err(|_| PlatformError::InvalidUrl(link.to_string()))
    }

    fn location(
        &self,
        response: &reqwest::Response,
        what: &'static str,
    ) -> Result<String, PlatformError> {
        let raw = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(PlatformError::MissingLocation(what))?;
        self.resolve(raw)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, PlatformError> {
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        Self::parse_response(response).await
    }

    /// Like [`Self::get_json`] but maps `404 Not Found` to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, PlatformError> {
        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::parse_response(response).await.map(Some)
    }

    /// Follow `next` links and collect every page.
    async fn get_all_pages<T: DeserializeOwned>(&self, first: String) -> Result<Vec<T>, PlatformError> {
        let mut url = first;
        let mut items = Vec::new();
        loop {
            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.data);
            match page.next {
                Some(next) => url = self.resolve(&next)?,
                None => return Ok(items),
            }
        }
    }

    async fn patch_accepted<B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Option<AsyncJob>, PlatformError> {
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        if response.status() == StatusCode::ACCEPTED && response.headers().contains_key(LOCATION) {
            let status_url = self.location(&response, "PATCH")?;
            return Ok(Some(AsyncJob { status_url }));
        }
        Ok(None)
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`PlatformError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(PlatformError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PlatformError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), PlatformError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

impl Platform for PlatformApi {
    async fn list_projects(&self) -> Result<Vec<Project>, PlatformError> {
        self.get_json(&self.url("projects/")).await
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, PlatformError> {
        self.get_json(&self.url(&format!("projects/{project_id}/"))).await
    }

    async fn create_project(
        &self,
        name: &str,
        file_name: &str,
        csv: Vec<u8>,
    ) -> Result<AsyncJob, PlatformError> {
        let file = reqwest::multipart::Part::bytes(csv)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = reqwest::multipart::Form::new()
            .text("projectName", name.to_string())
            .part("file", file);

        let response = self
            .client
            .post(self.url("projects/"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let status_url = self.location(&response, "project upload")?;
        Ok(AsyncJob { status_url })
    }

    async fn set_worker_count(&self, project_id: &str, workers: i32) -> Result<(), PlatformError> {
        let response = self
            .client
            .patch(self.url(&format!("projects/{project_id}/")))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "workerCount": workers }))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn start_autopilot(
        &self,
        project_id: &str,
        request: &AimRequest,
    ) -> Result<Option<AsyncJob>, PlatformError> {
        self.patch_accepted(&self.url(&format!("projects/{project_id}/aim/")), request)
            .await
    }

    async fn autopilot_status(&self, project_id: &str) -> Result<AutopilotStatus, PlatformError> {
        self.get_json(&self.url(&format!("projects/{project_id}/status/")))
            .await
    }

    async fn recommended_model(
        &self,
        project_id: &str,
    ) -> Result<Option<RecommendedModel>, PlatformError> {
        self.get_optional(&self.url(&format!(
            "projects/{project_id}/recommendedModels/recommendedModel/"
        )))
        .await
    }

    async fn get_model(&self, project_id: &str, model_id: &str) -> Result<Model, PlatformError> {
        self.get_json(&self.url(&format!("projects/{project_id}/models/{model_id}/")))
            .await
    }

    async fn list_models(&self, project_id: &str) -> Result<Vec<Model>, PlatformError> {
        self.get_json(&self.url(&format!("projects/{project_id}/models/")))
            .await
    }

    async fn frozen_parent_id(
        &self,
        project_id: &str,
        model_id: &str,
    ) -> Result<Option<String>, PlatformError> {
        let frozen: Option<FrozenModel> = self
            .get_optional(&self.url(&format!("projects/{project_id}/frozenModels/{model_id}/")))
            .await?;
        Ok(frozen.map(|f| f.parent_model_id))
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, PlatformError> {
        self.get_all_pages(self.url("deployments/")).await
    }

    async fn create_deployment(
        &self,
        request: &DeploymentCreate,
    ) -> Result<Accepted<Deployment>, PlatformError> {
        let response = self
            .client
            .post(self.url("deployments/fromLearningModel/"))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let job = if response.headers().contains_key(LOCATION) {
            Some(AsyncJob {
                status_url: self.location(&response, "deployment creation")?,
            })
        } else {
            None
        };
        let created: CreatedId = response.json().await?;

        Ok(Accepted {
            value: Deployment {
                id: created.id,
                label: request.label.clone(),
                description: Some(request.description.clone()),
            },
            job,
        })
    }

    async fn update_deployment_settings(
        &self,
        deployment_id: &str,
        settings: &DeploymentSettings,
    ) -> Result<Option<AsyncJob>, PlatformError> {
        self.patch_accepted(
            &self.url(&format!("deployments/{deployment_id}/settings/")),
            settings,
        )
        .await
    }

    async fn list_prediction_servers(&self) -> Result<Vec<PredictionServer>, PlatformError> {
        self.get_all_pages(self.url("predictionServers/")).await
    }

    async fn request_training_predictions(
        &self,
        project_id: &str,
        request: &TrainingPredictionsRequest,
    ) -> Result<AsyncJob, PlatformError> {
        let response = self
            .client
            .post(self.url(&format!("projects/{project_id}/trainingPredictions/")))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        let status_url = self.location(&response, "training predictions")?;
        Ok(AsyncJob { status_url })
    }

    async fn list_training_predictions(
        &self,
        project_id: &str,
    ) -> Result<Vec<TrainingPredictionsInfo>, PlatformError> {
        self.get_all_pages(self.url(&format!("projects/{project_id}/trainingPredictions/")))
            .await
    }

    async fn training_predictions(&self, url: &str) -> Result<Vec<TrainingPredictionRow>, PlatformError> {
        let first = self.resolve(url)?;
        self.get_all_pages(first).await
    }

    async fn job_state(&self, job: &AsyncJob) -> Result<JobState, PlatformError> {
        let response = self
            .client
            .get(&job.status_url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if response.status() == StatusCode::SEE_OTHER {
            let resource = self.location(&response, "job status")?;
            return Ok(JobState::Completed {
                resource: Some(resource),
            });
        }

        let status: AsyncStatus = Self::parse_response(response).await?;
        match status.status.to_ascii_uppercase().as_str() {
            "COMPLETED" => Ok(JobState::Completed { resource: None }),
            "ERROR" | "ABORTED" => Err(PlatformError::JobFailed {
                status: status.status,
                message: status.message.unwrap_or_default(),
            }),
            _ => Ok(JobState::Running),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let api = PlatformApi::with_client(reqwest::Client::new(), "https://h/api/v2/", "t");
        assert_eq!(api.api_url(), "https://h/api/v2");
        assert_eq!(api.url("projects/"), "https://h/api/v2/projects/");
    }

    #[test]
    fn links_resolve_against_endpoint() {
        let api = PlatformApi::with_client(reqwest::Client::new(), "https://h/api/v2", "t");
        assert_eq!(api.resolve("status/7/").unwrap(), "https://h/api/v2/status/7/");
        assert_eq!(api.resolve("/api/v2/status/7/").unwrap(), "https://h/api/v2/status/7/");
        assert_eq!(
            api.resolve("https://other/api/v2/projects/p1/").unwrap(),
            "https://other/api/v2/projects/p1/"
        );
    }

    #[test]
    fn poll_errors_keep_job_name() {
        let err = PlatformError::from_poll(
            "autopilot",
            PollError::TimedOut {
                waited: Duration::from_secs(90),
            },
        );
        assert_eq!(err.to_string(), "Timed out waiting for autopilot after 90s");

        let err = PlatformError::from_poll("upload", PollError::Cancelled);
        assert_eq!(err.to_string(), "Cancelled while waiting for upload");
    }
}
