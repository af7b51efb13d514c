pub mod metadata_store;
pub mod migrator;
pub mod object_catalog;
pub mod object_store;
pub mod tenant_directory;
