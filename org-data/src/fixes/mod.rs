//! Fix plan generation, apply, and rollback for quality findings

pub mod apply;
pub mod plan;
pub mod rollback;

pub use apply::{run_quality_apply, BeforeBackend, QualityApplyOptions};
pub use plan::{generate_fix_plan, run_quality_plan, QualityPlanOptions};
pub use rollback::{run_quality_rollback, QualityRollbackOptions};
