//! Core data models for tenant bucket migration.
//!
//! Tenants and catalog rows map to database tables via `sqlx::FromRow`;
//! progress events and reports serialize as JSON via `serde` for the
//! admin API.

pub mod object;
pub mod progress;
pub mod report;
pub mod tenant;
