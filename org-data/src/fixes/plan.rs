//! `quality plan`: derive a batch of corrections from a quality report
//!
//! Only issues carrying a supported `assignment.correct` autofix produce
//! commands. The plan records which command indexes came from which issue
//! so an operator can trace every correction back to its finding.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use org_common::config::Config;
use org_common::docs::{
    fix_plan_file_name, read_json_file, resolve_output_file_path, write_json_file,
    write_json_line, AssignmentCorrectPayload, BatchCommand, BatchRequest, FixKind, FixPlan,
    FixPlanMaps, QualityReport, RuleId, FIX_PLAN_SCHEMA_VERSION,
};
use org_common::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct QualityPlanOptions {
    pub report_path: PathBuf,
    pub output_path: PathBuf,
    pub max_commands: usize,
}

fn detail_str<'a>(issue_id: Uuid, details: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a str> {
    match details.get(key).and_then(Value::as_str) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::validation(format!(
            "issue {issue_id} missing details.{key}"
        ))),
    }
}

fn detail_uuid(issue_id: Uuid, details: &serde_json::Map<String, Value>, key: &str) -> Result<Uuid> {
    let raw = detail_str(issue_id, details, key)?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| Error::validation(format!("issue {issue_id} invalid details.{key}")))
}

/// Returns the plan and whether it carries any commands. A plan with zero
/// commands is a valid noop, not an error.
pub fn generate_fix_plan(report: &QualityReport, max_commands: usize) -> Result<FixPlan> {
    report.validate()?;
    if max_commands == 0 {
        return Err(Error::validation("max_commands must be positive"));
    }

    let mut plan = FixPlan {
        schema_version: FIX_PLAN_SCHEMA_VERSION,
        run_id: Uuid::new_v4(),
        tenant_id: report.tenant_id,
        as_of: report.as_of,
        source_report_run_id: report.run_id,
        created_at: Utc::now(),
        batch_request: BatchRequest {
            dry_run: true,
            effective_date: report.as_of.to_string(),
            commands: Vec::new(),
        },
        maps: FixPlanMaps::default(),
    };

    for iss in &report.issues {
        let autofix = match &iss.autofix {
            Some(a) if a.supported => a,
            _ => continue,
        };
        if autofix.fix_kind != FixKind::AssignmentCorrect
            || iss.rule_id != RuleId::AssignmentSubjectMapping
        {
            continue;
        }

        let details: serde_json::Map<String, Value> =
            iss.details.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let pernr_trim = detail_str(iss.issue_id, &details, "pernr_trim")?.trim().to_string();
        let expected_subject_id = detail_uuid(iss.issue_id, &details, "expected_subject_id")?;
        let position_id = detail_uuid(iss.issue_id, &details, "position_id")?;

        let payload = AssignmentCorrectPayload {
            id: iss.entity.id,
            pernr: Some(pernr_trim),
            subject_id: Some(expected_subject_id),
            position_id: Some(position_id),
        };
        let idx = plan.batch_request.commands.len();
        plan.batch_request.commands.push(BatchCommand {
            kind: FixKind::AssignmentCorrect,
            payload: serde_json::to_value(&payload)
                .map_err(|e| Error::validation(format!("encode payload: {e}")))?,
        });
        plan.maps
            .issue_to_command_indexes
            .entry(iss.issue_id.to_string())
            .or_default()
            .push(idx);

        if plan.batch_request.commands.len() > max_commands {
            return Err(Error::validation(format!(
                "fix plan too large: {} commands > max_commands={max_commands}",
                plan.batch_request.commands.len()
            )));
        }
    }

    if !plan.batch_request.commands.is_empty() {
        plan.validate()?;
    }
    Ok(plan)
}

#[derive(Debug, Serialize)]
struct PlanSummaryLine<'a> {
    status: &'a str,
    run_id: Uuid,
    tenant_id: Uuid,
    as_of: String,
    source_report_run_id: Uuid,
    commands: usize,
    output: String,
    max_commands: usize,
}

pub fn run_quality_plan(config: &Config, opts: QualityPlanOptions) -> Result<()> {
    let max_commands = if opts.max_commands == 0 {
        config.fixes_max_commands
    } else {
        opts.max_commands
    };
    if max_commands == 0 {
        return Err(Error::usage("max_commands must be positive"));
    }

    let report: QualityReport = read_json_file(&opts.report_path)?;
    let plan = generate_fix_plan(&report, max_commands)?;

    if plan.batch_request.commands.is_empty() {
        return write_json_line(&PlanSummaryLine {
            status: "noop",
            run_id: plan.run_id,
            tenant_id: plan.tenant_id,
            as_of: plan.as_of.to_string(),
            source_report_run_id: plan.source_report_run_id,
            commands: 0,
            output: String::new(),
            max_commands,
        });
    }

    let suggested = fix_plan_file_name(plan.tenant_id, plan.as_of, plan.run_id);
    let out_path = resolve_output_file_path(&opts.output_path.display().to_string(), &suggested)?;
    write_json_file(&out_path, &plan)?;

    write_json_line(&PlanSummaryLine {
        status: "ok",
        run_id: plan.run_id,
        tenant_id: plan.tenant_id,
        as_of: plan.as_of.to_string(),
        source_report_run_id: plan.source_report_run_id,
        commands: plan.batch_request.commands.len(),
        output: out_path.display().to_string(),
        max_commands,
    })
}
