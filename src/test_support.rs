//! Shared fixtures for unit tests.

use crate::db::run_migrations;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{path::PathBuf, sync::Arc};
use uuid::Uuid;

/// In-memory database with the schema applied. A single connection keeps
/// every query on the same in-memory database.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(pool)
}

/// Insert a tenant and its bucket assignment.
pub async fn seed_tenant(db: &SqlitePool, tenant: &str, storage_id: i64, bucket: &str) {
    sqlx::query("INSERT INTO tenants (id, storage_id, enabled) VALUES (?, ?, 1)")
        .bind(tenant)
        .bind(storage_id)
        .execute(db)
        .await
        .unwrap();
    sqlx::query("INSERT INTO tenant_buckets (tenant_id, bucket) VALUES (?, ?)")
        .bind(tenant)
        .bind(bucket)
        .execute(db)
        .await
        .unwrap();
}

pub async fn seed_object(db: &SqlitePool, id: i64, storage_id: i64, path: &str, mimetype: &str) {
    sqlx::query("INSERT INTO objects (id, storage_id, path, mimetype) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(storage_id)
        .bind(path)
        .bind(mimetype)
        .execute(db)
        .await
        .unwrap();
}

/// Fresh, unique directory path under the OS temp dir (not created).
pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("bucket-mover-test-{}", Uuid::new_v4()))
}
