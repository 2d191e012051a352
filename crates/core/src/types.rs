/// Remote platform identifiers (projects, models, deployments) are opaque strings.
pub type RemoteId = String;

/// Calendar-day format used for dataset dates and generated forecast rows.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
