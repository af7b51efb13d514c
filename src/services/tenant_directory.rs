//! Tenant lookup and enable/disable switch used around a migration.

use crate::models::tenant::Tenant;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct TenantDirectory {
    pub db: Arc<SqlitePool>,
}

impl TenantDirectory {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    pub async fn get(&self, tenant: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT id, storage_id, enabled FROM tenants WHERE id = ?")
            .bind(tenant)
            .fetch_optional(&*self.db)
            .await
    }

    pub async fn set_enabled(&self, tenant: &str, enabled: bool) -> Result<(), sqlx::Error> {
        let result = sqlx::query("UPDATE tenants SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(tenant)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }
        tracing::debug!(tenant, enabled, "tenant state updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_pool, seed_tenant};

    #[tokio::test]
    async fn toggles_enabled_flag() {
        let db = memory_pool().await;
        let tenants = TenantDirectory::new(db.clone());
        seed_tenant(&db, "alice", 1, "b1").await;

        let tenant = tenants.get("alice").await.unwrap().unwrap();
        assert!(tenant.enabled);
        assert_eq!(tenant.storage_id, 1);

        tenants.set_enabled("alice", false).await.unwrap();
        assert!(!tenants.get("alice").await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn unknown_tenant() {
        let db = memory_pool().await;
        let tenants = TenantDirectory::new(db);
        assert!(tenants.get("nobody").await.unwrap().is_none());
        assert!(matches!(
            tenants.set_enabled("nobody", true).await,
            Err(sqlx::Error::RowNotFound)
        ));
    }
}
