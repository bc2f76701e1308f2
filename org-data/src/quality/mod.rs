//! Quality checks over the org hierarchy
//!
//! `check` materializes the tenant's state from the database or the API
//! snapshot, evaluates the eight rules, and writes `org_quality_report.v1`.

pub mod check;
pub mod rules;
pub mod source;
pub mod state;

pub use check::{run_quality_check, QualityBackend, QualityCheckOptions};
pub use rules::evaluate;
pub use source::{state_from_api, state_from_db, state_from_snapshot};
pub use state::HierarchyState;
