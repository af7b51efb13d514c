//! Command layer: the policy around a migration (who may be moved, tenant
//! disable/enable, restore on failure) and the console commands.

pub mod by_bucket;
pub mod list_objects;
pub mod move_tenant;
