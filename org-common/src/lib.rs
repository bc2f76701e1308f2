//! # Org Common Library
//!
//! Shared code for the org-data tooling including:
//! - Process exit codes and the error type they map from
//! - Configuration loading
//! - Bitemporal date handling (open-end sentinel, as-of parsing)
//! - Canonical subject identity derivation
//! - Versioned JSON documents (quality report, fix plan, fix manifest,
//!   import manifest)
//! - Remote Org API client

pub mod api;
pub mod config;
pub mod docs;
pub mod error;
pub mod subject;
pub mod time;

pub use error::{Error, Result};
