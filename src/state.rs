//! Shared handles used by the CLI commands and the admin API.

use crate::services::{
    metadata_store::SqliteMetadataStore, migrator::Migrator, object_catalog::SqliteObjectCatalog,
    object_store::ObjectStoreClient, tenant_directory::TenantDirectory,
};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,
    pub migrator: Migrator,
    pub tenants: TenantDirectory,
}

impl AppState {
    pub fn new(
        db: Arc<SqlitePool>,
        multibucket: bool,
        store: Option<Arc<dyn ObjectStoreClient>>,
    ) -> Self {
        let migrator = Migrator::new(
            multibucket,
            Arc::new(SqliteMetadataStore::new(db.clone())),
            Arc::new(SqliteObjectCatalog::new(db.clone())),
            store,
        );
        Self {
            tenants: TenantDirectory::new(db.clone()),
            db,
            migrator,
        }
    }
}
