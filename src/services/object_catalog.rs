//! Read-only view of the file catalog: which objects a tenant owns.

use crate::models::object::{DIRECTORY_MIMETYPE, ObjectId};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;

#[async_trait]
pub trait ObjectCatalog: Send + Sync {
    /// Home storage scope of a tenant, `None` for unknown tenants.
    async fn storage_id(&self, tenant: &str) -> Result<Option<i64>, sqlx::Error>;

    /// Ids of all non-directory entries in the storage scope, in storage order.
    async fn list_object_ids(&self, storage_id: i64) -> Result<Vec<ObjectId>, sqlx::Error>;

    /// Same filter as `list_object_ids`, count only.
    async fn count_objects(&self, storage_id: i64) -> Result<u64, sqlx::Error>;
}

#[derive(Clone)]
pub struct SqliteObjectCatalog {
    pub db: Arc<SqlitePool>,
}

impl SqliteObjectCatalog {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ObjectCatalog for SqliteObjectCatalog {
    async fn storage_id(&self, tenant: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT storage_id FROM tenants WHERE id = ?")
            .bind(tenant)
            .fetch_optional(&*self.db)
            .await
    }

    async fn list_object_ids(&self, storage_id: i64) -> Result<Vec<ObjectId>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM objects WHERE storage_id = ? AND mimetype != ? ORDER BY id",
        )
        .bind(storage_id)
        .bind(DIRECTORY_MIMETYPE)
        .fetch_all(&*self.db)
        .await
    }

    async fn count_objects(&self, storage_id: i64) -> Result<u64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(id) FROM objects WHERE storage_id = ? AND mimetype != ?",
        )
        .bind(storage_id)
        .bind(DIRECTORY_MIMETYPE)
        .fetch_one(&*self.db)
        .await?;
        Ok(count as u64)
    }
}
