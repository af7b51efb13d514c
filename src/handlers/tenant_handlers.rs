//! HTTP handlers for tenant inventory and tenant moves.

use crate::{
    commands::move_tenant::{self, MoveRequest},
    errors::AppError,
    models::{
        progress::{ProgressEvent, RecordingSink},
        report::MigrationReport,
    },
    services::migrator::MoveOptions,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ObjectsQuery {
    /// Only return the number of objects.
    #[serde(default)]
    pub count: bool,
}

/// Body of `POST /tenants/{tenant}/move`.
#[derive(Debug, Deserialize)]
pub struct MoveTenantReq {
    pub target_bucket: String,
    pub parallel: Option<usize>,
    pub max_objects: Option<usize>,
    #[serde(default)]
    pub restore_on_failure: bool,
}

#[derive(Debug, Serialize)]
pub struct BucketResponse {
    pub tenant: String,
    pub bucket: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ObjectsResponse {
    Keys { tenant: String, keys: Vec<String> },
    Count { tenant: String, count: u64 },
}

#[derive(Debug, Serialize)]
pub struct TenantsResponse {
    pub bucket: String,
    pub tenants: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct MoveResponse {
    pub report: MigrationReport,
    pub events: Vec<ProgressEvent>,
}

/// `GET /tenants/{tenant}/bucket`
pub async fn get_bucket(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
) -> Result<Json<BucketResponse>, AppError> {
    let bucket = state.migrator.current_bucket(&tenant).await?;
    Ok(Json(BucketResponse { tenant, bucket }))
}

/// `GET /tenants/{tenant}/objects[?count=true]`
pub async fn list_objects(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<ObjectsQuery>,
) -> Result<Json<ObjectsResponse>, AppError> {
    let response = if query.count {
        let count = state.migrator.count_objects(&tenant).await?;
        ObjectsResponse::Count { tenant, count }
    } else {
        let keys = state.migrator.list_objects(&tenant).await?;
        ObjectsResponse::Keys { tenant, keys }
    };
    Ok(Json(response))
}

/// `GET /buckets/{bucket}/tenants`
pub async fn tenants_for_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Json<TenantsResponse>, AppError> {
    let tenants = state.migrator.tenants_for_bucket(&bucket).await?;
    Ok(Json(TenantsResponse { bucket, tenants }))
}

/// `POST /tenants/{tenant}/move`, runs the whole move before responding.
pub async fn move_tenant(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(body): Json<MoveTenantReq>,
) -> Result<Json<MoveResponse>, AppError> {
    let req = MoveRequest {
        tenant,
        target_bucket: body.target_bucket,
        options: MoveOptions {
            parallelism: body.parallel.unwrap_or(1),
            max_objects: body.max_objects,
        },
        restore_on_failure: body.restore_on_failure,
    };

    let mut sink = RecordingSink::default();
    let report = move_tenant::execute(&state, &req, &mut sink).await?;
    Ok(Json(MoveResponse {
        report,
        events: sink.events,
    }))
}
