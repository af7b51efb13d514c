//! Object-store abstraction used by the migration engine.
//!
//! Every backend answers the same small set of bucket and object operations
//! and classifies failures as either "not found" or a backend error.

use crate::config::BackendConfig;
use async_trait::async_trait;
use std::{io, sync::Arc};
use thiserror::Error;

pub mod local;
pub mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object store backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StoreError {
    /// True for the HTTP 404 class of failures: the object itself is gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Bucket and object operations of an S3-compatible store.
///
/// Deleting a key that is already absent succeeds, for both single and batch
/// deletes.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Short backend name for logs and readiness output.
    fn backend_name(&self) -> &'static str;

    async fn bucket_exists(&self, bucket: &str) -> StoreResult<bool>;

    /// Create a bucket. Callers check `bucket_exists` first.
    async fn create_bucket(&self, bucket: &str) -> StoreResult<()>;

    /// Server-side copy. Returns `NotFound` only when the source object is
    /// missing; a missing bucket is a backend error.
    async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StoreResult<()>;

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;

    /// Delete a batch of keys in one request where the backend allows it.
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StoreResult<()>;
}

/// Connect to the configured home storage backend.
///
/// Returns `None` when home storage is not an object store at all; callers
/// turn that into an unsupported-backend refusal.
pub async fn open(cfg: &BackendConfig) -> StoreResult<Option<Arc<dyn ObjectStoreClient>>> {
    match cfg {
        BackendConfig::S3(s3_cfg) => {
            let store = S3ObjectStore::connect(s3_cfg).await;
            tracing::info!(region = %s3_cfg.region, endpoint = ?s3_cfg.endpoint, "using S3 object store");
            Ok(Some(Arc::new(store)))
        }
        BackendConfig::Local { storage_dir } => {
            let store = LocalObjectStore::open(storage_dir).await?;
            tracing::info!("using local object store at {}", storage_dir.display());
            Ok(Some(Arc::new(store)))
        }
        BackendConfig::Filesystem => {
            tracing::warn!("home storage is not an object store; migrations are unavailable");
            Ok(None)
        }
    }
}
