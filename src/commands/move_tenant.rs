//! Moving a tenant: refuse what cannot be moved, keep the tenant disabled
//! while its objects are in motion, and decide what to do on failure.

use crate::{
    config::MoveTenantArgs,
    models::{
        progress::{ProgressEvent, ProgressSink},
        report::MigrationReport,
    },
    services::migrator::{MigrationError, MoveOptions},
    state::AppState,
};
use anyhow::Result;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub tenant: String,
    pub target_bucket: String,
    pub options: MoveOptions,
    /// Point the tenant back at its source bucket and re-enable it when the
    /// move fails before the repoint.
    pub restore_on_failure: bool,
}

impl From<&MoveTenantArgs> for MoveRequest {
    fn from(args: &MoveTenantArgs) -> Self {
        Self {
            tenant: args.tenant.clone(),
            target_bucket: args.target_bucket.clone(),
            options: MoveOptions {
                parallelism: args.parallel,
                max_objects: args.max_objects(),
            },
            restore_on_failure: args.restore_on_failure,
        }
    }
}

/// Run a move with the tenant disabled for its duration.
///
/// Refusals that happen before anything was mutated re-enable the tenant.
/// Other failures leave it disabled unless `restore_on_failure` is set and
/// the tenant was not repointed yet.
pub async fn execute(
    state: &AppState,
    req: &MoveRequest,
    sink: &mut dyn ProgressSink,
) -> Result<MigrationReport, MigrationError> {
    let migrator = &state.migrator;
    let tenant = req.tenant.as_str();

    if !migrator.is_multi_bucket() {
        return Err(MigrationError::NotConfigured);
    }
    if state.tenants.get(tenant).await?.is_none() {
        return Err(MigrationError::TenantNotFound(tenant.to_string()));
    }
    let source = migrator.current_bucket(tenant).await?;
    if source == req.target_bucket {
        return Err(MigrationError::AlreadyOnTarget {
            tenant: tenant.to_string(),
            bucket: source,
        });
    }

    info!(tenant, "disabling tenant");
    state.tenants.set_enabled(tenant, false).await?;

    match migrator
        .move_tenant(tenant, &req.target_bucket, req.options, sink)
        .await
    {
        Ok(report) => {
            info!(tenant, "re-enabling tenant");
            state.tenants.set_enabled(tenant, true).await?;
            Ok(report)
        }
        Err(err @ (MigrationError::TooManyObjects { .. } | MigrationError::UnsupportedBackend(_))) => {
            error!(tenant, error = %err, "migration refused, enabling tenant");
            reenable(state, tenant).await;
            Err(err)
        }
        Err(err) if req.restore_on_failure && !err.is_after_repoint() => {
            error!(tenant, error = %err, "error while migrating, restoring tenant");
            match migrator.restore_bucket(tenant, &source).await {
                Ok(()) => reenable(state, tenant).await,
                Err(restore_err) => {
                    error!(tenant, error = %restore_err, "restoring bucket failed, tenant left disabled")
                }
            }
            Err(err)
        }
        Err(err) => {
            if err.is_after_repoint() {
                error!(
                    tenant,
                    error = %err,
                    "error after switching buckets, stale objects remain in `{}`; tenant has been left disabled",
                    source
                );
            } else {
                error!(tenant, error = %err, "error while migrating, tenant has been left disabled");
            }
            Err(err)
        }
    }
}

async fn reenable(state: &AppState, tenant: &str) {
    if let Err(err) = state.tenants.set_enabled(tenant, true).await {
        error!(tenant, error = %err, "failed to re-enable tenant");
    }
}

/// Renders progress as log lines for the console.
#[derive(Debug, Default)]
struct CommandProgress {
    total: usize,
    copied: usize,
    deleted: usize,
    step: Option<&'static str>,
}

impl CommandProgress {
    fn enter(&mut self, step: &'static str) -> bool {
        let entered = self.step != Some(step);
        self.step = Some(step);
        entered
    }
}

impl ProgressSink for CommandProgress {
    fn emit(&mut self, event: ProgressEvent) {
        let step = event.step();
        match event {
            ProgressEvent::Create => info!("Creating target bucket"),
            ProgressEvent::Count(total) => self.total = total,
            ProgressEvent::MaxFilesReached => {
                warn!("Tenant has more objects than allowed to be migrated")
            }
            ProgressEvent::Copy(n) => {
                if self.enter(step) {
                    info!("Copying {} objects to target bucket", self.total);
                }
                self.copied += n;
                debug!("copy {}/{}", self.copied, self.total);
            }
            ProgressEvent::Warn(message) => warn!("{}", message),
            ProgressEvent::Config => {
                self.enter(step);
                info!("Setting tenant to use new bucket");
            }
            ProgressEvent::Delete(n) => {
                if self.enter(step) {
                    info!("Deleting objects in old bucket");
                }
                self.deleted += n;
                debug!("delete {}/{}", self.deleted, self.total);
            }
            ProgressEvent::Done => info!("Done"),
        }
    }
}

/// `move-tenant` console command.
pub async fn run(state: &AppState, args: &MoveTenantArgs) -> Result<ExitCode> {
    let req = MoveRequest::from(args);
    let mut progress = CommandProgress::default();

    match execute(state, &req, &mut progress).await {
        Ok(report) => {
            info!(
                copied = report.copied,
                skipped = report.missing.len(),
                deleted = report.deleted,
                "Tenant {} moved from {} to {}",
                report.tenant,
                report.source_bucket,
                report.target_bucket
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(
            err @ (MigrationError::NotConfigured
            | MigrationError::TenantNotFound(_)
            | MigrationError::Unassigned(_)
            | MigrationError::AlreadyOnTarget { .. }
            | MigrationError::TooManyObjects { .. }
            | MigrationError::UnsupportedBackend(_)),
        ) => {
            error!("{}", err);
            Ok(ExitCode::FAILURE)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{object::DIRECTORY_MIMETYPE, progress::RecordingSink},
        services::object_store::{LocalObjectStore, ObjectStoreClient},
        test_support::{memory_pool, seed_object, seed_tenant, temp_dir},
    };
    use std::sync::Arc;

    struct Setup {
        state: AppState,
        store: LocalObjectStore,
    }

    /// Tenant `alice` in `bucket-one` with two files and one folder.
    async fn setup() -> Setup {
        let db = memory_pool().await;
        seed_tenant(&db, "alice", 1, "bucket-one").await;
        seed_object(&db, 1, 1, "files", DIRECTORY_MIMETYPE).await;
        seed_object(&db, 2, 1, "files/a.txt", "text/plain").await;
        seed_object(&db, 3, 1, "files/b.txt", "text/plain").await;

        let store = LocalObjectStore::open(temp_dir()).await.unwrap();
        store.create_bucket("bucket-one").await.unwrap();
        store.put_object("bucket-one", "urn:oid:2", b"a").await.unwrap();
        store.put_object("bucket-one", "urn:oid:3", b"b").await.unwrap();

        let state = AppState::new(db, true, Some(Arc::new(store.clone())));
        Setup { state, store }
    }

    fn request(target: &str) -> MoveRequest {
        MoveRequest {
            tenant: "alice".into(),
            target_bucket: target.into(),
            options: MoveOptions::default(),
            restore_on_failure: false,
        }
    }

    async fn enabled(state: &AppState) -> bool {
        state.tenants.get("alice").await.unwrap().unwrap().enabled
    }

    #[tokio::test]
    async fn moves_tenant_between_local_buckets() {
        let Setup { state, store } = setup().await;
        let mut sink = RecordingSink::default();

        let report = execute(&state, &request("bucket-two"), &mut sink)
            .await
            .unwrap();

        assert!(report.created_bucket);
        assert_eq!(report.copied, 2);
        assert_eq!(
            state.migrator.current_bucket("alice").await.unwrap(),
            "bucket-two"
        );
        assert_eq!(
            store.read_object("bucket-two", "urn:oid:2").await.as_deref(),
            Some(&b"a"[..])
        );
        assert!(store.read_object("bucket-one", "urn:oid:2").await.is_none());
        assert!(store.read_object("bucket-one", "urn:oid:3").await.is_none());
        assert!(enabled(&state).await);
        assert_eq!(sink.events.first(), Some(&ProgressEvent::Count(2)));
        assert_eq!(sink.events.last(), Some(&ProgressEvent::Done));
    }

    #[tokio::test]
    async fn cap_refusal_reenables_tenant() {
        let Setup { state, store } = setup().await;
        let mut req = request("bucket-two");
        req.options.max_objects = Some(1);
        let mut sink = RecordingSink::default();

        let err = execute(&state, &req, &mut sink).await.unwrap_err();

        assert!(matches!(err, MigrationError::TooManyObjects { .. }));
        assert!(enabled(&state).await);
        assert_eq!(
            state.migrator.current_bucket("alice").await.unwrap(),
            "bucket-one"
        );
        assert!(store.read_object("bucket-one", "urn:oid:2").await.is_some());
    }

    #[tokio::test]
    async fn failure_leaves_tenant_disabled_by_default() {
        let Setup { state, .. } = setup().await;
        let mut sink = RecordingSink::default();

        // invalid name: the backend rejects the bucket
        let err = execute(&state, &request("Not_A_Bucket"), &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, MigrationError::Backend { .. }));
        assert!(!enabled(&state).await);
        assert_eq!(
            state.migrator.current_bucket("alice").await.unwrap(),
            "bucket-one"
        );
    }

    #[tokio::test]
    async fn restore_on_failure_reenables_tenant() {
        let Setup { state, .. } = setup().await;
        let mut req = request("Not_A_Bucket");
        req.restore_on_failure = true;
        let mut sink = RecordingSink::default();

        execute(&state, &req, &mut sink).await.unwrap_err();

        assert!(enabled(&state).await);
        assert_eq!(
            state.migrator.current_bucket("alice").await.unwrap(),
            "bucket-one"
        );
    }

    #[tokio::test]
    async fn refusals_do_not_touch_the_tenant() {
        let Setup { state, .. } = setup().await;
        let mut sink = RecordingSink::default();

        let err = execute(&state, &request("bucket-one"), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyOnTarget { .. }));
        assert!(enabled(&state).await);

        let mut req = request("bucket-two");
        req.tenant = "mallory".into();
        let err = execute(&state, &req, &mut sink).await.unwrap_err();
        assert!(matches!(err, MigrationError::TenantNotFound(_)));
        assert!(sink.events.is_empty());
    }

    #[tokio::test]
    async fn refuses_single_bucket_deployments() {
        let db = memory_pool().await;
        seed_tenant(&db, "alice", 1, "bucket-one").await;
        let state = AppState::new(db, false, None);
        let mut sink = RecordingSink::default();

        let err = execute(&state, &request("bucket-two"), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::NotConfigured));
        assert!(enabled(&state).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn parallel_move_never_loses_present_objects() {
        for _ in 0..50 {
            let db = memory_pool().await;
            seed_tenant(&db, "alice", 1, "source").await;
            seed_object(&db, 25, 1, "files/kept.txt", "text/plain").await;
            seed_object(&db, 33, 1, "files/gone.txt", "text/plain").await;

            let store = LocalObjectStore::open(temp_dir()).await.unwrap();
            store.create_bucket("source").await.unwrap();
            store.put_object("source", "urn:oid:25", b"kept").await.unwrap();
            let state = AppState::new(db, true, Some(Arc::new(store.clone())));

            let mut req = request("target");
            req.options.parallelism = 2;
            let mut sink = RecordingSink::default();
            let report = execute(&state, &req, &mut sink).await.unwrap();

            assert_eq!(report.copied, 1);
            assert_eq!(report.missing, vec!["urn:oid:33".to_string()]);
            assert_eq!(
                store.read_object("target", "urn:oid:25").await.as_deref(),
                Some(&b"kept"[..])
            );
        }
    }

    #[test]
    fn console_progress_tracks_counts() {
        let mut progress = CommandProgress::default();
        for event in [
            ProgressEvent::Count(3),
            ProgressEvent::Copy(2),
            ProgressEvent::Copy(1),
            ProgressEvent::Config,
            ProgressEvent::Delete(3),
            ProgressEvent::Done,
        ] {
            progress.emit(event);
        }
        assert_eq!(progress.total, 3);
        assert_eq!(progress.copied, 3);
        assert_eq!(progress.deleted, 3);
        assert_eq!(progress.step, Some("delete"));
    }
}
