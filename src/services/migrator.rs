//! src/services/migrator.rs
//!
//! Migrator: moves every object of one tenant from its current bucket to a
//! target bucket, then repoints the tenant and removes the source copies.
//!
//! Phases run strictly in order:
//! validating → creating bucket → copying → repointing → deleting → done.
//! The repoint is the only write that changes which bucket serves the tenant.
//! It happens after every copy resolved and before the first delete, so an
//! interrupted run leaves either the complete source authoritative or the
//! target authoritative with stale source copies, never a tenant missing data.

use crate::{
    models::{
        object::{ObjectId, object_key},
        progress::{ProgressEvent, ProgressSink},
        report::MigrationReport,
    },
    services::{
        metadata_store::MetadataStore,
        object_catalog::ObjectCatalog,
        object_store::{ObjectStoreClient, StoreError},
    },
};
use chrono::Utc;
use futures::future::try_join_all;
use std::{collections::BTreeSet, fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Keys per batch delete request.
pub const DELETE_BATCH_SIZE: usize = 500;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Validating,
    CreatingBucket,
    Copying,
    Repointing,
    Deleting,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Validating => "validating",
            Phase::CreatingBucket => "creating_bucket",
            Phase::Copying => "copying",
            Phase::Repointing => "repointing",
            Phase::Deleting => "deleting",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("multibucket object storage is not configured")]
    NotConfigured,
    #[error("tenant `{0}` not found")]
    TenantNotFound(String),
    #[error("tenant `{0}` has no bucket assignment")]
    Unassigned(String),
    #[error("tenant `{tenant}` already uses bucket `{bucket}`")]
    AlreadyOnTarget { tenant: String, bucket: String },
    #[error("tenant `{tenant}` has {count} objects, more than the {max} allowed to be migrated")]
    TooManyObjects {
        tenant: String,
        count: usize,
        max: usize,
    },
    #[error("migrating is only supported for object storage, home storage is {0}")]
    UnsupportedBackend(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object store failure while {phase}: {source}")]
    Backend {
        phase: Phase,
        #[source]
        source: StoreError,
    },
    #[error("failed to assign bucket `{bucket}` to tenant `{tenant}`: {source}")]
    MetadataWrite {
        tenant: String,
        bucket: String,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Metadata(#[from] sqlx::Error),
}

impl MigrationError {
    /// True when the tenant already resolves to the target bucket, so the
    /// source assignment must not be restored.
    pub fn is_after_repoint(&self) -> bool {
        matches!(
            self,
            MigrationError::Backend {
                phase: Phase::Deleting,
                ..
            }
        )
    }
}

/// Tuning knobs of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOptions {
    /// Copies in flight at once; 0 and 1 both copy serially.
    pub parallelism: usize,
    /// Refuse tenants with more objects than this.
    pub max_objects: Option<usize>,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            parallelism: 1,
            max_objects: None,
        }
    }
}

/// In-memory state of one `move_tenant` call.
struct MigrationRun<'a> {
    tenant: &'a str,
    source: String,
    target: &'a str,
    phase: Phase,
    ids: Vec<ObjectId>,
    created_bucket: bool,
    copied: usize,
    missing: Vec<String>,
    deleted: usize,
}

impl<'a> MigrationRun<'a> {
    fn advance(&mut self, phase: Phase) {
        debug!(tenant = self.tenant, from = %self.phase, to = %phase, "migration phase");
        self.phase = phase;
    }

    fn backend(&self, source: StoreError) -> MigrationError {
        MigrationError::Backend {
            phase: self.phase,
            source,
        }
    }
}

enum CopyOutcome {
    Copied,
    Missing(String),
}

/// Orchestrates tenant moves and the read-only inventory queries around them.
#[derive(Clone)]
pub struct Migrator {
    multibucket: bool,
    metadata: Arc<dyn MetadataStore>,
    catalog: Arc<dyn ObjectCatalog>,
    /// `None` when home storage is not an object store.
    store: Option<Arc<dyn ObjectStoreClient>>,
}

impl Migrator {
    pub fn new(
        multibucket: bool,
        metadata: Arc<dyn MetadataStore>,
        catalog: Arc<dyn ObjectCatalog>,
        store: Option<Arc<dyn ObjectStoreClient>>,
    ) -> Self {
        Self {
            multibucket,
            metadata,
            catalog,
            store,
        }
    }

    pub fn is_multi_bucket(&self) -> bool {
        self.multibucket
    }

    pub fn object_store(&self) -> Result<&Arc<dyn ObjectStoreClient>, MigrationError> {
        self.store
            .as_ref()
            .ok_or_else(|| MigrationError::UnsupportedBackend("not an object store".into()))
    }

    pub async fn current_bucket(&self, tenant: &str) -> Result<String, MigrationError> {
        if !self.multibucket {
            return Err(MigrationError::NotConfigured);
        }
        self.metadata
            .get_bucket(tenant)
            .await?
            .ok_or_else(|| MigrationError::Unassigned(tenant.to_string()))
    }

    /// Point the tenant back at `bucket`.
    ///
    /// Only valid for failures before the repoint: afterwards the source
    /// bucket may already be missing deleted objects.
    pub async fn restore_bucket(&self, tenant: &str, bucket: &str) -> Result<(), MigrationError> {
        self.metadata.set_bucket(tenant, bucket).await?;
        info!(tenant, bucket, "restored bucket assignment");
        Ok(())
    }

    pub async fn tenants_for_bucket(&self, bucket: &str) -> Result<Vec<String>, MigrationError> {
        let tenants: BTreeSet<String> = self
            .metadata
            .tenants_for_bucket(bucket)
            .await?
            .into_iter()
            .collect();
        Ok(tenants.into_iter().collect())
    }

    /// Keys of every object the tenant owns.
    pub async fn list_objects(&self, tenant: &str) -> Result<Vec<String>, MigrationError> {
        self.object_store()?;
        let storage_id = self.storage_id(tenant).await?;
        let ids = self.catalog.list_object_ids(storage_id).await?;
        Ok(ids.into_iter().map(object_key).collect())
    }

    pub async fn count_objects(&self, tenant: &str) -> Result<u64, MigrationError> {
        self.object_store()?;
        let storage_id = self.storage_id(tenant).await?;
        Ok(self.catalog.count_objects(storage_id).await?)
    }

    async fn storage_id(&self, tenant: &str) -> Result<i64, MigrationError> {
        self.catalog
            .storage_id(tenant)
            .await?
            .ok_or_else(|| MigrationError::TenantNotFound(tenant.to_string()))
    }

    /// Move every object of `tenant` into `target` and repoint the tenant.
    ///
    /// Validation failures happen before anything is mutated. Objects that
    /// vanish from the source between enumeration and copy are reported as
    /// `warn` events and skipped; any other copy failure aborts the run with
    /// the source still authoritative and complete.
    #[instrument(skip(self, options, sink), fields(parallelism = options.parallelism, max_objects = ?options.max_objects))]
    pub async fn move_tenant(
        &self,
        tenant: &str,
        target: &str,
        options: MoveOptions,
        sink: &mut dyn ProgressSink,
    ) -> Result<MigrationReport, MigrationError> {
        let started_at = Utc::now();
        let mut run = MigrationRun {
            tenant,
            source: String::new(),
            target,
            phase: Phase::Idle,
            ids: Vec::new(),
            created_bucket: false,
            copied: 0,
            missing: Vec::new(),
            deleted: 0,
        };

        match self.drive(&mut run, options, sink).await {
            Ok(()) => {
                run.advance(Phase::Done);
                info!(
                    tenant,
                    source = %run.source,
                    target,
                    copied = run.copied,
                    missing = run.missing.len(),
                    deleted = run.deleted,
                    "tenant moved"
                );
                Ok(MigrationReport {
                    tenant: tenant.to_string(),
                    source_bucket: run.source,
                    target_bucket: target.to_string(),
                    objects: run.ids.len(),
                    copied: run.copied,
                    missing: run.missing,
                    deleted: run.deleted,
                    created_bucket: run.created_bucket,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(err) => {
                warn!(tenant, target, phase = %run.phase, error = %err, "migration aborted");
                run.advance(Phase::Aborted);
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut MigrationRun<'_>,
        options: MoveOptions,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), MigrationError> {
        run.advance(Phase::Validating);
        run.source = self.current_bucket(run.tenant).await?;
        if run.source == run.target {
            return Err(MigrationError::AlreadyOnTarget {
                tenant: run.tenant.to_string(),
                bucket: run.target.to_string(),
            });
        }
        let store = self.object_store()?.clone();
        let storage_id = self.storage_id(run.tenant).await?;
        run.ids = self.catalog.list_object_ids(storage_id).await?;

        if let Some(max) = options.max_objects {
            if run.ids.len() > max {
                sink.emit(ProgressEvent::MaxFilesReached);
                return Err(MigrationError::TooManyObjects {
                    tenant: run.tenant.to_string(),
                    count: run.ids.len(),
                    max,
                });
            }
        }
        sink.emit(ProgressEvent::Count(run.ids.len()));

        run.advance(Phase::CreatingBucket);
        let exists = store
            .bucket_exists(run.target)
            .await
            .map_err(|err| run.backend(err))?;
        if !exists {
            sink.emit(ProgressEvent::Create);
            store
                .create_bucket(run.target)
                .await
                .map_err(|err| run.backend(err))?;
            run.created_bucket = true;
            info!(bucket = run.target, "created target bucket");
        }

        run.advance(Phase::Copying);
        self.copy_objects(store.as_ref(), run, options.parallelism, sink)
            .await?;
        sink.emit(ProgressEvent::Config);

        run.advance(Phase::Repointing);
        self.repoint(run.tenant, run.target).await?;

        run.advance(Phase::Deleting);
        self.delete_sources(store.as_ref(), run, sink).await?;
        sink.emit(ProgressEvent::Done);
        Ok(())
    }

    /// Copy in waves of `parallelism`; a wave finishes entirely before the
    /// next one starts.
    async fn copy_objects(
        &self,
        store: &dyn ObjectStoreClient,
        run: &mut MigrationRun<'_>,
        parallelism: usize,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), MigrationError> {
        let wave = parallelism.max(1);
        for chunk in run.ids.chunks(wave) {
            sink.emit(ProgressEvent::Copy(chunk.len()));
            // dropping the joined future on the first hard error cancels
            // the copies still in flight
            let outcomes = try_join_all(
                chunk
                    .iter()
                    .map(|id| copy_one(store, &run.source, run.target, object_key(*id))),
            )
            .await
            .map_err(|err| run.backend(err))?;

            for outcome in outcomes {
                match outcome {
                    CopyOutcome::Copied => run.copied += 1,
                    CopyOutcome::Missing(key) => {
                        let skipped = MigrationError::ObjectNotFound {
                            bucket: run.source.clone(),
                            key: key.clone(),
                        };
                        warn!(error = %skipped, "skipping object");
                        sink.emit(ProgressEvent::Warn(format!("{}, skipping", skipped)));
                        run.missing.push(key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Write the new assignment. Copies can run for hours, so a connection
    /// may have died meanwhile: a transient failure gets one reconnect and
    /// one more attempt.
    async fn repoint(&self, tenant: &str, bucket: &str) -> Result<(), MigrationError> {
        let write_error = |source| MigrationError::MetadataWrite {
            tenant: tenant.to_string(),
            bucket: bucket.to_string(),
            source,
        };

        match self.metadata.set_bucket(tenant, bucket).await {
            Ok(()) => {}
            Err(err) if is_transient(&err) => {
                warn!(tenant, bucket, error = %err, "bucket assignment failed, reconnecting");
                self.metadata.reconnect().await.map_err(write_error)?;
                self.metadata
                    .set_bucket(tenant, bucket)
                    .await
                    .map_err(write_error)?;
            }
            Err(err) => return Err(write_error(err)),
        }
        info!(tenant, bucket, "tenant repointed");
        Ok(())
    }

    async fn delete_sources(
        &self,
        store: &dyn ObjectStoreClient,
        run: &mut MigrationRun<'_>,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), MigrationError> {
        for chunk in run.ids.chunks(DELETE_BATCH_SIZE) {
            sink.emit(ProgressEvent::Delete(chunk.len()));
            let keys: Vec<String> = chunk.iter().map(|id| object_key(*id)).collect();
            let deleted = match keys.as_slice() {
                [key] => store.delete_object(&run.source, key).await,
                _ => store.delete_objects(&run.source, &keys).await,
            };
            deleted.map_err(|err| MigrationError::Backend {
                phase: run.phase,
                source: err,
            })?;
            run.deleted += keys.len();
        }
        Ok(())
    }
}

async fn copy_one(
    store: &dyn ObjectStoreClient,
    source: &str,
    target: &str,
    key: String,
) -> Result<CopyOutcome, StoreError> {
    match store.copy_object(source, &key, target, &key).await {
        Ok(()) => Ok(CopyOutcome::Copied),
        Err(err) if err.is_not_found() => Ok(CopyOutcome::Missing(key)),
        Err(err) => Err(err),
    }
}

/// Connectivity faults that a fresh connection may cure.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
