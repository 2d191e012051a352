//! Orchestration of the retraining, scoring and accuracy flows.
//!
//! Every flow is generic over [`autocast_platform::Platform`] or
//! [`autocast_platform::PredictionService`] so it can run against a fake
//! in tests.

use std::time::Duration;

use autocast_platform::PollConfig;

pub mod accuracy;
pub mod deployment;
pub mod error;
pub mod project;
pub mod retrain;
pub mod scoring;

pub use error::PipelineError;

/// Bounded wait applied to deployment settings updates.
pub const SETTINGS_MAX_WAIT: Duration = Duration::from_secs(60);

/// Polling behaviour for each kind of remote wait.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    /// Short asynchronous jobs (uploads, target selection, deployment creation).
    pub job: PollConfig,
    /// Autopilot training.
    pub training: PollConfig,
    /// Deployment settings updates.
    pub settings: PollConfig,
}

impl Default for WaitConfig {
    fn default() -> Self {
        let job = PollConfig::default();
        Self {
            training: PollConfig {
                max_delay: Duration::from_secs(60),
                ..job.with_timeout(Duration::from_secs(6 * 60 * 60))
            },
            settings: job.with_timeout(SETTINGS_MAX_WAIT),
            job,
        }
    }
}

impl WaitConfig {
    /// Defaults with a custom training timeout.
    pub fn with_training_timeout(timeout: Duration) -> Self {
        let mut config = Self::default();
        config.training.timeout = Some(timeout);
        config
    }
}
