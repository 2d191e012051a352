//! SHA-256 digests and the content key that identifies a project's
//! exact training input.

use sha2::{Digest, Sha256};

use crate::config::PartitioningSpec;
use crate::dataset::Dataset;

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Content key for one series' training input.
///
/// Covers the series id, every header and cell of the data snapshot, and
/// the partitioning parameters. Fields are length-prefixed so that
/// shifting text between adjacent cells changes the digest.
pub fn content_key(series: &str, data: &Dataset, partitioning: &PartitioningSpec) -> String {
    let mut hasher = Sha256::new();

    feed(&mut hasher, series);
    for header in data.headers() {
        feed(&mut hasher, header);
    }
    for row in data.rows() {
        hasher.update((row.len() as u64).to_le_bytes());
        for cell in row {
            feed(&mut hasher, cell);
        }
    }
    feed(&mut hasher, &partitioning.fingerprint());

    format!("{:x}", hasher.finalize())
}

fn feed(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}
