//! `quality apply`: submit a fix plan through the batch API
//!
//! The manifest is written before the batch outcome is inspected, so a
//! rejected batch still leaves the captured before-state on disk for
//! rollback and audit.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use org_common::api::OrgApiClient;
use org_common::config::Config;
use org_common::docs::{
    fix_manifest_file_name, read_json_file, write_json_file, write_json_line,
    AssignmentCorrectPayload, BatchRequest, BeforeAssignment, FixBefore, FixKind, FixManifest,
    FixPlan, FixResults, FIX_MANIFEST_SCHEMA_VERSION,
};
use org_common::error::{Error, Result};

use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeforeBackend {
    Api,
    Db,
}

impl BeforeBackend {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "api" => Ok(BeforeBackend::Api),
            "db" => Ok(BeforeBackend::Db),
            other => Err(Error::usage(format!(
                "unsupported --before-backend {other:?} (expected api|db)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityApplyOptions {
    pub fix_plan_path: PathBuf,
    pub output_dir: PathBuf,
    pub dry_run: bool,
    pub apply: bool,
    pub yes: bool,
    pub change_request_id: Option<Uuid>,
    pub before_backend: BeforeBackend,
    pub base_url: Option<String>,
    pub auth_token: String,
}

/// Compares the change-request payload with the plan's batch request,
/// ignoring the `dry_run` flag on both sides.
pub fn ensure_change_request_matches(payload: &Value, batch: &BatchRequest) -> Result<()> {
    let strip_dry_run = |v: &Value| -> Value {
        let mut v = v.clone();
        if let Some(obj) = v.as_object_mut() {
            obj.remove("dry_run");
        }
        v
    };
    let plan_value = serde_json::to_value(batch)
        .map_err(|e| Error::validation(format!("encode fix plan batch_request: {e}")))?;
    if strip_dry_run(payload) != strip_dry_run(&plan_value) {
        return Err(Error::validation(
            "change request payload does not match fix plan batch_request (ignoring dry_run)",
        ));
    }
    Ok(())
}

fn command_assignment_ids(plan: &FixPlan) -> Result<Vec<Uuid>> {
    let mut ids = Vec::with_capacity(plan.batch_request.commands.len());
    for (i, cmd) in plan.batch_request.commands.iter().enumerate() {
        if cmd.kind != FixKind::AssignmentCorrect {
            return Err(Error::validation(format!(
                "fix_plan.commands[{i}].type is unsupported"
            )));
        }
        let payload: AssignmentCorrectPayload = serde_json::from_value(cmd.payload.clone())
            .map_err(|e| Error::validation(format!("fix_plan.commands[{i}].payload invalid: {e}")))?;
        if payload.id.is_nil() {
            return Err(Error::validation(format!(
                "fix_plan.commands[{i}].payload.id is required"
            )));
        }
        ids.push(payload.id);
    }
    Ok(ids)
}

async fn before_assignments_api(
    client: &OrgApiClient,
    plan: &FixPlan,
    ids: &[Uuid],
) -> Result<Vec<BeforeAssignment>> {
    let snapshot = client.get_snapshot_all(plan.as_of, &["assignments"]).await?;
    if let Some(snapshot_tenant) = snapshot.tenant_id {
        if snapshot_tenant != plan.tenant_id {
            return Err(Error::validation(format!(
                "snapshot tenant_id={snapshot_tenant} does not match fix plan tenant_id={}",
                plan.tenant_id
            )));
        }
    }

    #[derive(serde::Deserialize)]
    struct AssignmentValues {
        org_assignment_id: Uuid,
        position_id: Uuid,
        subject_id: Uuid,
        pernr: String,
    }

    let mut by_id: HashMap<Uuid, AssignmentValues> = HashMap::new();
    for item in &snapshot.items {
        if item.entity_type != "org_assignment" {
            continue;
        }
        let v: AssignmentValues = serde_json::from_value(item.new_values.clone())
            .map_err(|e| Error::validation(format!("snapshot decode org_assignment: {e}")))?;
        by_id.insert(v.org_assignment_id, v);
    }

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let v = by_id.get(id).ok_or_else(|| {
            Error::validation(format!(
                "cannot read before-state for assignment {id} via api snapshot at as-of"
            ))
        })?;
        out.push(BeforeAssignment {
            id: *id,
            pernr: v.pernr.clone(),
            subject_id: v.subject_id,
            position_id: v.position_id,
        });
    }
    Ok(out)
}

async fn before_assignments_db(config: &Config, ids: &[Uuid]) -> Result<Vec<BeforeAssignment>> {
    let pool = db::connect(&config.database_url).await?;
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let row = db::assignment_before(&pool, *id)
            .await?
            .ok_or_else(|| Error::validation(format!("read org_assignments(id={id}): not found")))?;
        out.push(BeforeAssignment {
            id: *id,
            pernr: row.pernr,
            subject_id: Uuid::parse_str(&row.subject_id)
                .map_err(|e| Error::validation(format!("org_assignments.subject_id: {e}")))?,
            position_id: row
                .position_id
                .as_deref()
                .map(Uuid::parse_str)
                .transpose()
                .map_err(|e| Error::validation(format!("org_assignments.position_id: {e}")))?
                .unwrap_or_else(Uuid::nil),
        });
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
struct ApplySummaryLine<'a> {
    status: &'a str,
    run_id: Uuid,
    tenant_id: Uuid,
    as_of: String,
    dry_run: bool,
    commands: usize,
    events_enqueued: u64,
    manifest: String,
}

pub async fn run_quality_apply(config: &Config, opts: QualityApplyOptions) -> Result<()> {
    if !config.quality_enabled {
        return Err(Error::usage(
            "ORG_DATA_QUALITY_ENABLED=false: quality apply is disabled",
        ));
    }
    if opts.dry_run && opts.apply {
        return Err(Error::usage("--dry-run and --apply are mutually exclusive"));
    }
    let apply = opts.apply && !opts.dry_run;
    if apply && !opts.yes {
        return Err(Error::usage("--apply requires --yes"));
    }

    let plan: FixPlan = read_json_file(&opts.fix_plan_path)?;
    plan.validate()?;
    if config.fixes_max_commands > 0
        && plan.batch_request.commands.len() > config.fixes_max_commands
    {
        return Err(Error::validation(format!(
            "fix plan too large: {} commands > ORG_DATA_FIXES_MAX_COMMANDS={}",
            plan.batch_request.commands.len(),
            config.fixes_max_commands
        )));
    }

    let client = OrgApiClient::new(
        opts.base_url.as_deref().unwrap_or(&config.origin),
        &opts.auth_token,
        config.request_id_header.as_deref(),
    )?;
    client.require_authorization("--auth-token")?;

    let mut manifest = FixManifest {
        schema_version: FIX_MANIFEST_SCHEMA_VERSION,
        run_id: Uuid::new_v4(),
        tenant_id: plan.tenant_id,
        as_of: plan.as_of,
        applied_at: Utc::now(),
        source_fix_plan_run_id: plan.run_id,
        change_request_id: None,
        batch_request: BatchRequest {
            dry_run: !apply,
            effective_date: plan.batch_request.effective_date.clone(),
            commands: plan.batch_request.commands.clone(),
        },
        before: FixBefore::default(),
        results: FixResults::default(),
        preflight_response: None,
    };

    if let Some(change_request_id) = opts.change_request_id {
        manifest.change_request_id = Some(change_request_id);
        let payload = client.get_change_request(change_request_id).await?;
        ensure_change_request_matches(&payload, &plan.batch_request)?;
        manifest.preflight_response = Some(client.post_preflight(&plan.batch_request).await?);
    }

    let ids = command_assignment_ids(&plan)?;
    manifest.before.assignments = match opts.before_backend {
        BeforeBackend::Api => before_assignments_api(&client, &plan, &ids).await?,
        BeforeBackend::Db => before_assignments_db(config, &ids).await?,
    };

    manifest.results = client.post_batch(&manifest.batch_request).await?;

    let out_path = opts.output_dir.join(fix_manifest_file_name(
        manifest.tenant_id,
        manifest.as_of,
        manifest.run_id,
    ));
    write_json_file(&out_path, &manifest)?;
    info!(path = %out_path.display(), ok = manifest.results.ok, "wrote fix manifest");

    if !manifest.results.ok {
        return Err(match &manifest.results.error {
            None => Error::db_write("batch failed"),
            Some(e) => Error::db_write(format!("batch failed: {} ({})", e.message, e.code)),
        });
    }

    write_json_line(&ApplySummaryLine {
        status: "ok",
        run_id: manifest.run_id,
        tenant_id: manifest.tenant_id,
        as_of: manifest.as_of.to_string(),
        dry_run: manifest.batch_request.dry_run,
        commands: manifest.batch_request.commands.len(),
        events_enqueued: manifest.results.events_enqueued,
        manifest: out_path.display().to_string(),
    })
}
