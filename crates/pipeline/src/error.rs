use std::time::Duration;

use autocast_core::error::CoreError;
use autocast_core::types::RemoteId;
use autocast_platform::{PlatformError, PredictionError};

/// Errors from the retraining, scoring and accuracy flows.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Platform(PlatformError),

    #[error(transparent)]
    Prediction(#[from] PredictionError),

    #[error("Training of project {project_id} did not finish within {}s", waited.as_secs())]
    TrainingTimedOut { project_id: RemoteId, waited: Duration },

    #[error("Project {0} exists but its target was never set")]
    TargetNotSet(RemoteId),

    #[error("Cancelled")]
    Cancelled,

    #[error("Project {0} has no recommended model")]
    NoRecommendedModel(RemoteId),

    #[error("No prediction server available")]
    NoPredictionServer,

    #[error("No model in project {project_id} has a cross-validation {metric} score")]
    NoRankableModel { project_id: RemoteId, metric: String },

    #[error("{what} finished without a resource URL")]
    MissingResource { what: &'static str },
}

// Waits interrupted by the cancellation token surface as `Cancelled`
// regardless of which job was being awaited.
impl From<PlatformError> for PipelineError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Cancelled(_) => Self::Cancelled,
            other => Self::Platform(other),
        }
    }
}
