//! Tenant → bucket assignments.
//!
//! The assignment row is the single fact deciding which bucket serves a
//! tenant. A migration rewrites it exactly once, after every object copy
//! has been confirmed.

use async_trait::async_trait;
use sqlx::{Connection, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Current bucket of the tenant, `None` when it was never assigned.
    async fn get_bucket(&self, tenant: &str) -> Result<Option<String>, sqlx::Error>;

    /// Overwrite the tenant's bucket. Idempotent.
    async fn set_bucket(&self, tenant: &str, bucket: &str) -> Result<(), sqlx::Error>;

    /// Existing tenants assigned to `bucket`, deduplicated and sorted.
    async fn tenants_for_bucket(&self, bucket: &str) -> Result<Vec<String>, sqlx::Error>;

    /// Re-establish connectivity after a transient failure.
    async fn reconnect(&self) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub struct SqliteMetadataStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_bucket(&self, tenant: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT bucket FROM tenant_buckets WHERE tenant_id = ?")
            .bind(tenant)
            .fetch_optional(&*self.db)
            .await
    }

    async fn set_bucket(&self, tenant: &str, bucket: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tenant_buckets (tenant_id, bucket) VALUES (?, ?)
             ON CONFLICT(tenant_id) DO UPDATE SET bucket = excluded.bucket",
        )
        .bind(tenant)
        .bind(bucket)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Assignments left behind by deleted tenants are skipped.
    async fn tenants_for_bucket(&self, bucket: &str) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT b.tenant_id
             FROM tenant_buckets b
             JOIN tenants t ON t.id = b.tenant_id
             WHERE b.bucket = ?
             ORDER BY b.tenant_id",
        )
        .bind(bucket)
        .fetch_all(&*self.db)
        .await
    }

    /// The pool drops broken connections on acquire, so acquiring and pinging
    /// one is enough to get a live connection back.
    async fn reconnect(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.db.acquire().await?;
        conn.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_pool, seed_tenant};

    #[tokio::test]
    async fn set_then_get_bucket() {
        let db = memory_pool().await;
        let store = SqliteMetadataStore::new(db.clone());

        assert_eq!(store.get_bucket("alice").await.unwrap(), None);
        store.set_bucket("alice", "b1").await.unwrap();
        assert_eq!(store.get_bucket("alice").await.unwrap().as_deref(), Some("b1"));

        store.set_bucket("alice", "b2").await.unwrap();
        store.set_bucket("alice", "b2").await.unwrap();
        assert_eq!(store.get_bucket("alice").await.unwrap().as_deref(), Some("b2"));
    }

    #[tokio::test]
    async fn tenants_for_bucket_skips_unknown_tenants() {
        let db = memory_pool().await;
        let store = SqliteMetadataStore::new(db.clone());
        seed_tenant(&db, "carol", 3, "shared").await;
        seed_tenant(&db, "alice", 1, "shared").await;
        seed_tenant(&db, "bob", 2, "other").await;
        // assignment of a tenant that was deleted from the host system
        store.set_bucket("ghost", "shared").await.unwrap();

        let tenants = store.tenants_for_bucket("shared").await.unwrap();
        assert_eq!(tenants, vec!["alice", "carol"]);
        assert!(store.tenants_for_bucket("empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reconnect_on_live_pool_succeeds() {
        let db = memory_pool().await;
        let store = SqliteMetadataStore::new(db);
        store.reconnect().await.unwrap();
    }
}
