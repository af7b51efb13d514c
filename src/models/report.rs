//! Summary of a finished tenant migration.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Serialize, Clone, Debug)]
pub struct MigrationReport {
    pub tenant: String,
    pub source_bucket: String,
    pub target_bucket: String,

    /// Number of objects enumerated at validation time.
    pub objects: usize,

    /// Objects confirmed present in the target bucket.
    pub copied: usize,

    /// Keys that vanished from the source bucket between enumeration and copy.
    pub missing: Vec<String>,

    /// Keys submitted for deletion from the source bucket.
    pub deleted: usize,

    /// Whether the target bucket had to be created.
    pub created_bucket: bool,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
