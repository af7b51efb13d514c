//! Defines routes of the admin API.
//!
//! ## Structure
//! - **Health endpoints**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Tenant endpoints**
//!   - `GET  /tenants/{tenant}/bucket`  current bucket assignment
//!   - `GET  /tenants/{tenant}/objects` object keys (`?count=true` for the count)
//!   - `POST /tenants/{tenant}/move`    move the tenant to another bucket
//!
//! - **Bucket endpoints**
//!   - `GET  /buckets/{bucket}/tenants` tenants assigned to the bucket

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        tenant_handlers::{get_bucket, list_objects, move_tenant, tenants_for_bucket},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router; handlers share `AppState`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/tenants/{tenant}/bucket", get(get_bucket))
        .route("/tenants/{tenant}/objects", get(list_objects))
        .route("/tenants/{tenant}/move", post(move_tenant))
        .route("/buckets/{bucket}/tenants", get(tenants_for_bucket))
}
