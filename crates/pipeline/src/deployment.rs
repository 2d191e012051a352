//! Create-or-reuse of one deployment per trained project.

use std::collections::HashMap;

use autocast_core::config::SeriesConfig;
use autocast_platform::models::{
    Deployment, DeploymentCreate, DeploymentSettings, Model, PredictionServer, Project,
};
use autocast_platform::{wait_for_job, Platform};
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::WaitConfig;

/// Result of looking up the parent of a possibly frozen model.
#[derive(Debug, Clone, PartialEq)]
pub enum ParentLookup {
    Found(Model),
    /// The model is not frozen.
    NoParent,
    /// The lookup itself failed.
    Failed(String),
}

/// Resolve the parent of `model` if it was retrained with frozen parameters.
pub async fn lookup_parent<P: Platform>(platform: &P, model: &Model) -> ParentLookup {
    let parent_id = match platform.frozen_parent_id(&model.project_id, &model.id).await {
        Ok(Some(id)) => id,
        Ok(None) => return ParentLookup::NoParent,
        Err(e) => return ParentLookup::Failed(e.to_string()),
    };
    match platform.get_model(&model.project_id, &parent_id).await {
        Ok(parent) => ParentLookup::Found(parent),
        Err(e) => ParentLookup::Failed(e.to_string()),
    }
}

/// Pick the first listed prediction server.
pub fn select_prediction_server(
    servers: Vec<PredictionServer>,
) -> Result<PredictionServer, PipelineError> {
    servers
        .into_iter()
        .next()
        .ok_or(PipelineError::NoPredictionServer)
}

/// A deployment serving a project's recommended model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionedDeployment {
    pub deployment: Deployment,
    pub created: bool,
    /// Model whose metrics were reported (the parent for frozen models).
    pub scored_model: Model,
    /// Cross-validation score of `scored_model` for the configured metric.
    pub error: Option<f64>,
}

/// Locates or creates deployments by label.
pub struct DeploymentProvisioner<'a, P> {
    platform: &'a P,
    by_label: HashMap<String, Deployment>,
    server: PredictionServer,
    association_column: String,
    reapply_settings: bool,
    wait: WaitConfig,
    cancel: CancellationToken,
}

impl<'a, P: Platform> DeploymentProvisioner<'a, P> {
    pub fn new(
        platform: &'a P,
        existing: Vec<Deployment>,
        server: PredictionServer,
        association_column: &str,
        reapply_settings: bool,
        wait: WaitConfig,
        cancel: CancellationToken,
    ) -> Self {
        let by_label = existing
            .into_iter()
            .map(|d| (d.label.clone(), d))
            .collect();
        Self {
            platform,
            by_label,
            server,
            association_column: association_column.to_string(),
            reapply_settings,
            wait,
            cancel,
        }
    }

    /// Deploy the recommended model of `project`, or reuse the deployment
    /// labelled with the project name.
    pub async fn provision(
        &mut self,
        project: &Project,
        config: &SeriesConfig,
    ) -> Result<ProvisionedDeployment, PipelineError> {
        let recommended = self
            .platform
            .recommended_model(&project.id)
            .await?
            .ok_or_else(|| PipelineError::NoRecommendedModel(project.id.clone()))?;
        let model = self
            .platform
            .get_model(&project.id, &recommended.model_id)
            .await?;

        let (deployment, created) = match self.by_label.get(&project.project_name) {
            Some(existing) => {
                tracing::info!(series = %config.series, deployment_id = %existing.id, "Reusing deployment");
                (existing.clone(), false)
            }
            None => (self.create(project, &model, config).await?, true),
        };

        if created || self.reapply_settings {
            self.apply_settings(&deployment.id).await?;
        }

        let scored_model = match lookup_parent(self.platform, &model).await {
            ParentLookup::Found(parent) => parent,
            ParentLookup::NoParent => model,
            ParentLookup::Failed(reason) => {
                tracing::warn!(
                    series = %config.series,
                    model_id = %model.id,
                    reason = %reason,
                    "Parent model lookup failed, reporting the deployed model's metric",
                );
                model
            }
        };
        let error = scored_model.cross_validation(&config.metric);

        Ok(ProvisionedDeployment {
            deployment,
            created,
            scored_model,
            error,
        })
    }

    async fn create(
        &mut self,
        project: &Project,
        model: &Model,
        config: &SeriesConfig,
    ) -> Result<Deployment, PipelineError> {
        let request = DeploymentCreate {
            model_id: model.id.clone(),
            label: project.project_name.clone(),
            description: config.description.clone(),
            default_prediction_server_id: self.server.id.clone(),
        };
        let accepted = self.platform.create_deployment(&request).await?;
        if let Some(job) = &accepted.job {
            wait_for_job(self.platform, job, "deployment creation", &self.wait.job, &self.cancel)
                .await?;
        }

        let deployment = accepted.value;
        tracing::info!(
            series = %config.series,
            deployment_id = %deployment.id,
            model_id = %model.id,
            "Created deployment",
        );
        self.by_label
            .insert(deployment.label.clone(), deployment.clone());
        Ok(deployment)
    }

    async fn apply_settings(&self, deployment_id: &str) -> Result<(), PipelineError> {
        let updates = [
            ("drift tracking settings", DeploymentSettings::drift_tracking()),
            (
                "association id settings",
                DeploymentSettings::required_association_id(&self.association_column),
            ),
        ];
        for (what, settings) in updates {
            let job = self
                .platform
                .update_deployment_settings(deployment_id, &settings)
                .await?;
            if let Some(job) = job {
                wait_for_job(self.platform, &job, what, &self.wait.settings, &self.cancel).await?;
            }
        }
        Ok(())
    }
}
