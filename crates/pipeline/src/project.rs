//! Create-or-reuse of one training project per series.
//!
//! The deterministic project name is the lookup key: a project whose name
//! already exists remotely is reused without retraining. The content key
//! of the training input is compared with the one stored in the reference
//! record so a reused project trained on different data is reported as
//! stale.

use std::collections::HashMap;

use autocast_core::config::{SeriesConfig, MAX_WORKERS};
use autocast_core::dataset::Dataset;
use autocast_core::hashing::content_key;
use autocast_core::naming::project_name;
use autocast_core::reference::ReferenceRecord;
use autocast_core::types::RemoteId;
use autocast_platform::models::{resource_id, AimRequest, Project};
use autocast_platform::{wait_for_job, Platform, PlatformError, PollConfig, PollError};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::WaitConfig;

/// How a project was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectOutcome {
    Created,
    /// An existing project was reused. `stale` is set when the stored
    /// content key differs from the current training input.
    Reused { stale: bool },
}

/// A project with completed training.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedProject {
    pub project: Project,
    pub outcome: ProjectOutcome,
    /// Content key of the data the project was trained on, when known.
    pub content_key: String,
}

/// Locates or creates projects, remembering every name it has seen.
pub struct ProjectProvisioner<'a, P> {
    platform: &'a P,
    by_name: HashMap<String, RemoteId>,
    wait: WaitConfig,
    cancel: CancellationToken,
}

impl<'a, P: Platform> ProjectProvisioner<'a, P> {
    /// `existing` is the remote project list, fetched once per run.
    pub fn new(
        platform: &'a P,
        existing: Vec<Project>,
        wait: WaitConfig,
        cancel: CancellationToken,
    ) -> Self {
        // Later entries win on duplicate names, matching a name -> id lookup.
        let by_name = existing
            .into_iter()
            .map(|p| (p.project_name, p.id))
            .collect();
        Self {
            platform,
            by_name,
            wait,
            cancel,
        }
    }

    /// Return a trained project for `config.series`.
    ///
    /// `subset` holds the series' rows; `max_date` is the latest time value
    /// of the whole filtered dataset and fixes the project name.
    pub async fn provision(
        &mut self,
        config: &SeriesConfig,
        subset: &Dataset,
        max_date: &str,
        previous: Option<&ReferenceRecord>,
    ) -> Result<ProvisionedProject, PipelineError> {
        let name = project_name(&config.series, max_date);
        let key = content_key(&config.series, subset, &config.partitioning);

        if let Some(id) = self.by_name.get(&name).cloned() {
            let prior_key = previous
                .filter(|r| r.latest_project == id && !r.content_key.is_empty())
                .map(|r| r.content_key.as_str());
            let stale = prior_key.is_some_and(|k| k != key);
            if stale {
                tracing::warn!(
                    series = %config.series,
                    project_id = %id,
                    "Reusing project whose training data differs from the current dataset",
                );
            } else {
                tracing::info!(series = %config.series, project_id = %id, "Reusing existing project");
            }

            let project = self.ensure_trained(config, &id).await?;
            return Ok(ProvisionedProject {
                project,
                outcome: ProjectOutcome::Reused { stale },
                content_key: prior_key.unwrap_or(&key).to_string(),
            });
        }

        let project = self.create_and_train(config, subset, &name).await?;
        self.by_name.insert(name, project.id.clone());
        Ok(ProvisionedProject {
            project,
            outcome: ProjectOutcome::Created,
            content_key: key,
        })
    }

    /// A reused project may come from an interrupted run: it must have a
    /// target and finished autopilot before it is deployed.
    async fn ensure_trained(&self, config: &SeriesConfig, project_id: &str) -> Result<Project, PipelineError> {
        let project = self.platform.get_project(project_id).await?;
        if project.target.is_none() {
            return Err(PipelineError::TargetNotSet(project_id.to_string()));
        }
        wait_for_training(self.platform, project_id, &self.wait.training, &self.cancel).await?;
        tracing::debug!(series = %config.series, project_id, "Reused project is trained");
        Ok(project)
    }

    async fn create_and_train(
        &self,
        config: &SeriesConfig,
        subset: &Dataset,
        name: &str,
    ) -> Result<Project, PipelineError> {
        tracing::info!(series = %config.series, project = %name, rows = subset.len(), "Creating project");

        let csv = subset.to_csv_bytes()?;
        let job = self
            .platform
            .create_project(name, &format!("{}.csv", config.series), csv)
            .await?;
        let resource = wait_for_job(self.platform, &job, "project upload", &self.wait.job, &self.cancel)
            .await?
            .ok_or(PipelineError::MissingResource {
                what: "project upload",
            })?;
        let project_id = resource_id(&resource, "projects").ok_or(PipelineError::MissingResource {
            what: "project upload",
        })?;

        self.platform.set_worker_count(&project_id, MAX_WORKERS).await?;

        let aim = AimRequest::for_series(config);
        if let Some(job) = self.platform.start_autopilot(&project_id, &aim).await? {
            wait_for_job(self.platform, &job, "target selection", &self.wait.job, &self.cancel).await?;
        }
        tracing::info!(series = %config.series, project_id = %project_id, "Autopilot started");

        wait_for_training(self.platform, &project_id, &self.wait.training, &self.cancel).await?;
        tracing::info!(series = %config.series, project_id = %project_id, "Autopilot finished");

        Ok(self.platform.get_project(&project_id).await?)
    }
}

/// Poll autopilot status until it reports done.
pub async fn wait_for_training<P: Platform>(
    platform: &P,
    project_id: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let result = autocast_platform::poll::poll_until("autopilot", config, cancel, move || async move {
        let status = platform.autopilot_status(project_id).await?;
        tracing::debug!(project_id, stage = ?status.stage, "Autopilot status");
        Ok::<_, PlatformError>(status.autopilot_done.then_some(()))
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(PollError::TimedOut { waited }) => Err(PipelineError::TrainingTimedOut {
            project_id: project_id.to_string(),
            waited,
        }),
        Err(PollError::Cancelled) => Err(PipelineError::Cancelled),
        Err(PollError::Failed(e)) => Err(e.into()),
    }
}
