pub mod health_handlers;
pub mod tenant_handlers;
