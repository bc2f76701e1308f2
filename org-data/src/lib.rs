//! org-data library interface
//!
//! Exposes the command implementations for integration testing.

pub mod db;
pub mod export;
pub mod fixes;
pub mod hierarchy;
pub mod import;
pub mod ingest;
pub mod normalize;
pub mod quality;
pub mod rollback;
