//! Represents a tenant (user account) whose home storage lives in a bucket.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tenant known to the host system.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Tenant {
    /// Opaque, stable tenant id.
    pub id: String,

    /// Numeric id of the tenant's home storage scope in the object catalog.
    pub storage_id: i64,

    /// Disabled tenants cannot use their storage; the migration command
    /// disables a tenant for the duration of a move.
    pub enabled: bool,
}
