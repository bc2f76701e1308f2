//! Canonical subject identity for assignments
//!
//! `org_assignments.subject_id` is not free-form: it is derived
//! deterministically from `(tenant, subject_type, pernr)` so every system
//! that knows the personnel number arrives at the same UUID.

use uuid::Uuid;

use crate::error::{Error, Result};

/// Namespace for version-1 subject ids
pub const SUBJECT_ID_NAMESPACE_V1: Uuid = Uuid::from_u128(0xce7c5394_3959_40ff_9d92_a1c2684d94cc);

/// Subject type supported by primary assignments
pub const SUBJECT_TYPE_PERSON: &str = "person";

/// Derive the canonical subject_id for an assignment.
///
/// The pernr is trimmed before hashing; only the `person` subject type is
/// supported.
pub fn normalized_subject_id(tenant_id: Uuid, subject_type: &str, pernr: &str) -> Result<Uuid> {
    if tenant_id.is_nil() {
        return Err(Error::validation("tenant_id is required"));
    }
    let subject_type = subject_type.trim();
    if subject_type.is_empty() {
        return Err(Error::validation("subject_type is required"));
    }
    if subject_type != SUBJECT_TYPE_PERSON {
        return Err(Error::validation(format!(
            "unsupported subject_type: {subject_type}"
        )));
    }
    let pernr = pernr.trim();
    if pernr.is_empty() {
        return Err(Error::validation("pernr is required"));
    }

    let payload = format!("{tenant_id}:{subject_type}:{pernr}");
    Ok(Uuid::new_v5(&SUBJECT_ID_NAMESPACE_V1, payload.as_bytes()))
}
