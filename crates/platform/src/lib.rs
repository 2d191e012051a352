//! Remote platform clients.
//!
//! - [`api`] talks to the management API (projects, models, deployments).
//! - [`prediction`] scores data against a deployment's prediction server.
//! - [`poll`] drives asynchronous jobs to completion.

pub mod api;
pub mod models;
pub mod poll;
pub mod prediction;

pub use api::{wait_for_job, Accepted, Platform, PlatformApi, PlatformError};
pub use poll::{PollConfig, PollError};
pub use prediction::{PredictionClient, PredictionError, PredictionService};
