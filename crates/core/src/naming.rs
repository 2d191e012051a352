//! Deterministic names shared between projects, deployments and
//! prediction rows.

/// Prefix of every project (and deployment label) created by a retrain run.
pub const PROJECT_NAME_PREFIX: &str = "auto retrain";

/// Project name for a series trained on data up to `max_date`.
///
/// The deployment serving the project carries the same string as its
/// label, so this is the only cross-reference between the two.
///
/// ```
/// use autocast_core::naming::project_name;
///
/// assert_eq!(
///     project_name("New South Wales", "2021-03-01"),
///     "auto retrain New South Wales 2021-03-01"
/// );
/// ```
pub fn project_name(series: &str, max_date: &str) -> String {
    format!("{PROJECT_NAME_PREFIX} {series} {max_date}")
}

/// Synthetic association id for one prediction row.
pub fn association_row_id(series: &str, date: &str) -> String {
    format!("{series} {date}")
}
