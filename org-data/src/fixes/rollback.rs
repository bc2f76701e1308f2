//! `quality rollback`: re-apply the before-state captured in a fix manifest

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use org_common::api::OrgApiClient;
use org_common::config::Config;
use org_common::docs::{
    read_json_file, write_json_line, AssignmentCorrectPayload, BatchCommand, BatchRequest,
    FixKind, FixManifest,
};
use org_common::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct QualityRollbackOptions {
    pub manifest_path: PathBuf,
    pub dry_run: bool,
    pub apply: bool,
    pub yes: bool,
    pub base_url: Option<String>,
    pub auth_token: String,
}

/// Builds one `assignment.correct` command per captured before-state row.
pub fn inverse_commands(manifest: &FixManifest) -> Vec<BatchCommand> {
    manifest
        .before
        .assignments
        .iter()
        .map(|before| BatchCommand {
            kind: FixKind::AssignmentCorrect,
            payload: serde_json::json!(AssignmentCorrectPayload {
                id: before.id,
                pernr: Some(before.pernr.clone()),
                subject_id: Some(before.subject_id),
                position_id: Some(before.position_id),
            }),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct RollbackSummaryLine<'a> {
    status: &'a str,
    tenant_id: Uuid,
    as_of: String,
    dry_run: bool,
    commands: usize,
    events_enqueued: u64,
    source_manifest: String,
}

pub async fn run_quality_rollback(config: &Config, opts: QualityRollbackOptions) -> Result<()> {
    if !config.quality_enabled {
        return Err(Error::usage(
            "ORG_DATA_QUALITY_ENABLED=false: quality rollback is disabled",
        ));
    }
    if opts.dry_run && opts.apply {
        return Err(Error::usage("--dry-run and --apply are mutually exclusive"));
    }
    let apply = opts.apply && !opts.dry_run;
    if apply && !opts.yes {
        return Err(Error::usage("--apply requires --yes"));
    }

    let manifest: FixManifest = read_json_file(&opts.manifest_path)?;
    manifest.validate()?;
    if manifest.before.assignments.is_empty() {
        return Err(Error::validation("manifest.before.assignments is empty"));
    }

    let client = OrgApiClient::new(
        opts.base_url.as_deref().unwrap_or(&config.origin),
        &opts.auth_token,
        config.request_id_header.as_deref(),
    )?;
    client.require_authorization("--auth-token")?;

    let batch = BatchRequest {
        dry_run: !apply,
        effective_date: manifest.as_of.to_string(),
        commands: inverse_commands(&manifest),
    };
    let results = client.post_batch(&batch).await?;
    if !results.ok {
        return Err(match &results.error {
            None => Error::db_write("batch failed"),
            Some(e) => Error::db_write(format!("batch failed: {} ({})", e.message, e.code)),
        });
    }

    write_json_line(&RollbackSummaryLine {
        status: "ok",
        tenant_id: manifest.tenant_id,
        as_of: manifest.as_of.to_string(),
        dry_run: batch.dry_run,
        commands: batch.commands.len(),
        events_enqueued: results.events_enqueued,
        source_manifest: opts.manifest_path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use org_common::docs::{BeforeAssignment, FixBefore, FixResults, FIX_MANIFEST_SCHEMA_VERSION};

    fn manifest_with_before(assignments: Vec<BeforeAssignment>) -> FixManifest {
        FixManifest {
            schema_version: FIX_MANIFEST_SCHEMA_VERSION,
            run_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            as_of: "2025-06-01".parse().unwrap(),
            applied_at: Utc::now(),
            source_fix_plan_run_id: Uuid::new_v4(),
            change_request_id: None,
            batch_request: BatchRequest {
                dry_run: false,
                effective_date: "2025-06-01".to_string(),
                commands: vec![BatchCommand {
                    kind: FixKind::AssignmentCorrect,
                    payload: serde_json::json!({"id": Uuid::new_v4()}),
                }],
            },
            before: FixBefore { assignments },
            results: FixResults::default(),
            preflight_response: None,
        }
    }

    #[test]
    fn inverse_commands_restore_captured_state() {
        let before = BeforeAssignment {
            id: Uuid::new_v4(),
            pernr: "1001".to_string(),
            subject_id: Uuid::new_v4(),
            position_id: Uuid::new_v4(),
        };
        let manifest = manifest_with_before(vec![before.clone()]);
        let commands = inverse_commands(&manifest);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, FixKind::AssignmentCorrect);
        assert_eq!(commands[0].payload["id"], serde_json::json!(before.id));
        assert_eq!(commands[0].payload["pernr"], serde_json::json!("1001"));
        assert_eq!(
            commands[0].payload["subject_id"],
            serde_json::json!(before.subject_id)
        );
        assert_eq!(
            commands[0].payload["position_id"],
            serde_json::json!(before.position_id)
        );
    }

    #[test]
    fn empty_before_state_produces_no_commands() {
        let manifest = manifest_with_before(vec![]);
        assert!(inverse_commands(&manifest).is_empty());
    }
}
