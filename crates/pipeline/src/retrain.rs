//! The retraining flow: one project and one deployment per series.
//!
//! Series are processed strictly one after another. A failing series is
//! logged and recorded in the [`RetrainSummary`]; the loop moves on to the
//! next one. Only a missing prediction server aborts the whole run, and it
//! is checked before any series is touched.

use autocast_core::config::UseCaseConfig;
use autocast_core::dataset::Dataset;
use autocast_core::error::CoreError;
use autocast_core::reference::{ReferenceRecord, ReferenceStore};
use autocast_platform::Platform;
use tokio_util::sync::CancellationToken;

use crate::deployment::{select_prediction_server, DeploymentProvisioner};
use crate::error::PipelineError;
use crate::project::{ProjectOutcome, ProjectProvisioner};
use crate::WaitConfig;

/// A series that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesFailure {
    pub series: String,
    pub error: String,
}

/// What happened during one retraining run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrainSummary {
    pub records: Vec<ReferenceRecord>,
    pub created_projects: Vec<String>,
    pub reused_projects: Vec<String>,
    pub stale_projects: Vec<String>,
    pub failures: Vec<SeriesFailure>,
    /// Reference rows added and replaced by the merge.
    pub inserted: usize,
    pub replaced: usize,
    pub cancelled: bool,
}

impl RetrainSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Load the use case's dataset and apply the optional series allow-list.
pub fn load_filtered_dataset(config: &UseCaseConfig) -> Result<Dataset, CoreError> {
    let dataset = Dataset::from_path(&config.dataset)?;
    match &config.states {
        Some(allowed) => dataset.filter_in(&config.series, allowed),
        None => Ok(dataset),
    }
}

/// Provision every series of the use case and merge the results into `store`.
///
/// The caller persists `store` afterwards.
pub async fn run_retrain<P: Platform>(
    platform: &P,
    config: &UseCaseConfig,
    dataset: &Dataset,
    store: &mut ReferenceStore,
    wait: WaitConfig,
    cancel: &CancellationToken,
) -> Result<RetrainSummary, PipelineError> {
    let max_date = dataset
        .max_of(&config.timecol)?
        .ok_or_else(|| CoreError::Validation("dataset has no rows after filtering".to_string()))?
        .to_string();
    let series_keys = dataset.distinct(&config.series)?;

    let server = select_prediction_server(platform.list_prediction_servers().await?)?;
    let existing_projects = platform.list_projects().await?;
    let existing_deployments = platform.list_deployments().await?;

    tracing::info!(
        series_count = series_keys.len(),
        max_date = %max_date,
        prediction_server = %server.url,
        "Starting retraining run",
    );

    let mut projects = ProjectProvisioner::new(platform, existing_projects, wait.clone(), cancel.clone());
    let mut deployments = DeploymentProvisioner::new(
        platform,
        existing_deployments,
        server,
        &config.association_id,
        config.reapply_settings,
        wait,
        cancel.clone(),
    );

    let mut summary = RetrainSummary::default();
    for key in &series_keys {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let series_config = config.series_config(key);
        let previous = store.get(key);
        let result = async {
            let subset = dataset.series_subset(&config.series, key)?;
            let project = projects
                .provision(&series_config, &subset, &max_date, previous)
                .await?;
            let deployed = deployments.provision(&project.project, &series_config).await?;
            Ok::<_, PipelineError>((project, deployed))
        }
        .await;

        match result {
            Ok((project, deployed)) => {
                match project.outcome {
                    ProjectOutcome::Created => summary.created_projects.push(key.clone()),
                    ProjectOutcome::Reused { stale } => {
                        summary.reused_projects.push(key.clone());
                        if stale {
                            summary.stale_projects.push(key.clone());
                        }
                    }
                }
                tracing::info!(
                    series = %key,
                    project_id = %project.project.id,
                    deployment_id = %deployed.deployment.id,
                    error = ?deployed.error,
                    "Series provisioned",
                );
                summary.records.push(ReferenceRecord {
                    use_case: key.clone(),
                    latest_project: project.project.id,
                    deployment_id: deployed.deployment.id,
                    error: deployed.error,
                    content_key: project.content_key,
                });
            }
            Err(PipelineError::Cancelled) => {
                tracing::warn!(series = %key, "Retraining cancelled");
                summary.cancelled = true;
                break;
            }
            Err(e) => {
                tracing::error!(series = %key, error = %e, "Failed to provision series");
                summary.failures.push(SeriesFailure {
                    series: key.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    let (inserted, replaced) = store.merge(summary.records.iter().cloned());
    summary.inserted = inserted;
    summary.replaced = replaced;

    tracing::info!(
        processed = summary.records.len(),
        created = summary.created_projects.len(),
        reused = summary.reused_projects.len(),
        stale = summary.stale_projects.len(),
        failed = summary.failures.len(),
        "Retraining run finished",
    );
    Ok(summary)
}
