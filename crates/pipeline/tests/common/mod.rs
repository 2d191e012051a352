//! In-memory platform used by the flow tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use autocast_core::config::UseCaseConfig;
use autocast_core::dataset::Dataset;
use autocast_platform::models::{
    AimRequest, AsyncJob, AutopilotStatus, Deployment, DeploymentCreate, DeploymentSettings,
    JobState, MetricScores, Model, PredictionServer, Project, RecommendedModel,
    TrainingPredictionRow, TrainingPredictionsInfo, TrainingPredictionsRequest,
};
use autocast_platform::{Accepted, Platform, PlatformError, PollConfig};
use autocast_pipeline::WaitConfig;

pub const FAKE_API: &str = "https://fake/api/v2";

#[derive(Default)]
pub struct FakeState {
    pub projects: Vec<Project>,
    pub deployments: Vec<Deployment>,
    pub servers: Vec<PredictionServer>,
    pub models: Vec<Model>,
    /// Child model id -> parent model id.
    pub frozen: HashMap<String, String>,
    pub frozen_lookup_fails: bool,
    pub autopilot_never_finishes: bool,
    pub no_recommendation: bool,
    /// Uploads whose project name contains one of these fail.
    pub failing_uploads: Vec<String>,
    pub training_rows: Vec<TrainingPredictionRow>,
    /// Requests for backtest predictions are rejected.
    pub training_request_fails: bool,
    pub existing_training_predictions: Vec<TrainingPredictionsInfo>,
    /// Settings jobs of this deployment never leave the running state.
    pub settings_stuck_for: Option<String>,

    pub uploads: Vec<(String, String)>,
    pub aims: Vec<AimRequest>,
    pub worker_counts: Vec<i32>,
    pub created_deployments: Vec<DeploymentCreate>,
    pub settings_updates: Vec<(String, DeploymentSettings)>,
    pub fetched_training_urls: Vec<String>,
}

pub struct FakePlatform {
    pub state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        let state = FakeState {
            servers: vec![PredictionServer {
                id: "srv-1".to_string(),
                url: "https://pred.fake".to_string(),
                datarobot_key: Some("key-1".to_string()),
            }],
            ..FakeState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn with<F: FnOnce(&mut FakeState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

pub fn model(project_id: &str, id: &str, cv: Option<f64>, backtesting: Option<f64>) -> Model {
    let mut metrics = HashMap::new();
    metrics.insert(
        "RMSE".to_string(),
        MetricScores {
            cross_validation: cv,
            backtesting,
            ..MetricScores::default()
        },
    );
    Model {
        id: id.to_string(),
        project_id: project_id.to_string(),
        model_type: None,
        metrics,
    }
}

fn not_found(what: &str) -> PlatformError {
    PlatformError::ApiError {
        status: 404,
        body: format!("{what} not found"),
    }
}

impl Platform for FakePlatform {
    async fn list_projects(&self) -> Result<Vec<Project>, PlatformError> {
        Ok(self.state().projects.clone())
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, PlatformError> {
        self.state()
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .cloned()
            .ok_or_else(|| not_found("project"))
    }

    async fn create_project(
        &self,
        name: &str,
        _file_name: &str,
        csv: Vec<u8>,
    ) -> Result<AsyncJob, PlatformError> {
        let mut state = self.state();
        if state.failing_uploads.iter().any(|f| name.contains(f.as_str())) {
            return Err(PlatformError::ApiError {
                status: 422,
                body: "upload rejected".to_string(),
            });
        }
        let id = format!("p{}", state.projects.len() + 1);
        state.projects.push(Project {
            id: id.clone(),
            project_name: name.to_string(),
            target: None,
            metric: None,
        });
        state
            .uploads
            .push((name.to_string(), String::from_utf8(csv).unwrap()));
        let recommended = format!("{id}-m1");
        state.models.push(model(&id, &recommended, Some(2.5), Some(3.0)));
        // The job resolves straight to the project resource.
        Ok(AsyncJob {
            status_url: format!("{FAKE_API}/projects/{id}/"),
        })
    }

    async fn set_worker_count(&self, _project_id: &str, workers: i32) -> Result<(), PlatformError> {
        self.state().worker_counts.push(workers);
        Ok(())
    }

    async fn start_autopilot(
        &self,
        project_id: &str,
        request: &AimRequest,
    ) -> Result<Option<AsyncJob>, PlatformError> {
        let mut state = self.state();
        if let Some(project) = state.projects.iter_mut().find(|p| p.id == project_id) {
            project.target = Some(request.target.clone());
        }
        state.aims.push(request.clone());
        Ok(None)
    }

    async fn autopilot_status(&self, _project_id: &str) -> Result<AutopilotStatus, PlatformError> {
        Ok(AutopilotStatus {
            autopilot_done: !self.state().autopilot_never_finishes,
            stage: Some("modeling".to_string()),
            stage_description: None,
        })
    }

    async fn recommended_model(
        &self,
        project_id: &str,
    ) -> Result<Option<RecommendedModel>, PlatformError> {
        if self.state().no_recommendation {
            return Ok(None);
        }
        Ok(Some(RecommendedModel {
            model_id: format!("{project_id}-m1"),
            recommendation_type: None,
        }))
    }

    async fn get_model(&self, project_id: &str, model_id: &str) -> Result<Model, PlatformError> {
        let state = self.state();
        Ok(state
            .models
            .iter()
            .find(|m| m.id == model_id)
            .cloned()
            .unwrap_or_else(|| model(project_id, model_id, None, None)))
    }

    async fn list_models(&self, project_id: &str) -> Result<Vec<Model>, PlatformError> {
        Ok(self
            .state()
            .models
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn frozen_parent_id(
        &self,
        _project_id: &str,
        model_id: &str,
    ) -> Result<Option<String>, PlatformError> {
        let state = self.state();
        if state.frozen_lookup_fails {
            return Err(PlatformError::ApiError {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(state.frozen.get(model_id).cloned())
    }

    async fn list_deployments(&self) -> Result<Vec<Deployment>, PlatformError> {
        Ok(self.state().deployments.clone())
    }

    async fn create_deployment(
        &self,
        request: &DeploymentCreate,
    ) -> Result<Accepted<Deployment>, PlatformError> {
        let mut state = self.state();
        let deployment = Deployment {
            id: format!("d{}", state.deployments.len() + 1),
            label: request.label.clone(),
            description: Some(request.description.clone()),
        };
        state.deployments.push(deployment.clone());
        state.created_deployments.push(request.clone());
        Ok(Accepted {
            value: deployment,
            job: None,
        })
    }

    async fn update_deployment_settings(
        &self,
        deployment_id: &str,
        settings: &DeploymentSettings,
    ) -> Result<Option<AsyncJob>, PlatformError> {
        self.state()
            .settings_updates
            .push((deployment_id.to_string(), settings.clone()));
        Ok(Some(AsyncJob {
            status_url: format!("{FAKE_API}/status/settings/{deployment_id}/"),
        }))
    }

    async fn list_prediction_servers(&self) -> Result<Vec<PredictionServer>, PlatformError> {
        Ok(self.state().servers.clone())
    }

    async fn request_training_predictions(
        &self,
        project_id: &str,
        _request: &TrainingPredictionsRequest,
    ) -> Result<AsyncJob, PlatformError> {
        if self.state().training_request_fails {
            return Err(PlatformError::ApiError {
                status: 422,
                body: "training predictions already exist".to_string(),
            });
        }
        Ok(AsyncJob {
            status_url: format!("{FAKE_API}/projects/{project_id}/trainingPredictions/tp1/"),
        })
    }

    async fn list_training_predictions(
        &self,
        _project_id: &str,
    ) -> Result<Vec<TrainingPredictionsInfo>, PlatformError> {
        Ok(self.state().existing_training_predictions.clone())
    }

    async fn training_predictions(&self, url: &str) -> Result<Vec<TrainingPredictionRow>, PlatformError> {
        let mut state = self.state();
        state.fetched_training_urls.push(url.to_string());
        Ok(state.training_rows.clone())
    }

    async fn job_state(&self, job: &AsyncJob) -> Result<JobState, PlatformError> {
        if let Some(stuck) = &self.state().settings_stuck_for {
            if job.status_url.ends_with(&format!("/status/settings/{stuck}/")) {
                return Ok(JobState::Running);
            }
        }
        Ok(JobState::Completed {
            resource: Some(job.status_url.clone()),
        })
    }
}

pub fn fast_wait(training_timeout: Duration) -> WaitConfig {
    let poll = PollConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
        timeout: Some(Duration::from_secs(5)),
    };
    WaitConfig {
        training: poll.with_timeout(training_timeout),
        settings: poll.clone(),
        job: poll,
    }
}

pub fn use_case() -> UseCaseConfig {
    UseCaseConfig::from_yaml(
        "dataset: cases.csv\n\
         timecol: date\n\
         target: cases\n\
         series: state\n\
         metric: RMSE\n\
         fdw: -14\n\
         horizon: 2\n\
         description: test deployments\n\
         ref_file: reference.csv\n\
         history: 2\n",
    )
    .unwrap()
}

pub fn dataset() -> Dataset {
    Dataset::from_csv_str(
        "state,date,cases\n\
         NSW,2021-03-01,4\n\
         NSW,2021-03-02,6\n\
         NSW,2021-03-03,5\n\
         VIC,2021-03-01,1\n\
         VIC,2021-03-02,2\n",
    )
    .unwrap()
}
