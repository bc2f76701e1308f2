//! Versioned JSON documents shared by the quality workflow
//!
//! Three documents chain by run id: a quality *report* is generated from
//! hierarchy state, a fix *plan* is generated from a report, and a fix
//! *manifest* records a plan's execution (including captured before-state).
//! A fourth document, the seed import manifest, captures what a seed import
//! inserted so it can be rolled back exactly.
//!
//! Documents are immutable value types: constructed once, validated, written,
//! and only ever read thereafter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::time;

pub const RULESET_NAME: &str = "org-quality";
pub const RULESET_VERSION: &str = "v1";

pub const QUALITY_REPORT_SCHEMA_VERSION: u32 = 1;
pub const FIX_PLAN_SCHEMA_VERSION: u32 = 1;
pub const FIX_MANIFEST_SCHEMA_VERSION: u32 = 1;
pub const IMPORT_MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Default cap on issues kept in a report
pub const MAX_ISSUES_DEFAULT: usize = 10_000;

/// Closed set of quality rules; serialized as the stable wire identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RuleId {
    #[serde(rename = "ORG_Q_001_NODE_CODE_FORMAT")]
    NodeCodeFormat,
    #[serde(rename = "ORG_Q_002_POSITION_CODE_FORMAT")]
    PositionCodeFormat,
    #[serde(rename = "ORG_Q_003_ROOT_INVARIANTS")]
    RootInvariants,
    #[serde(rename = "ORG_Q_004_NODE_MISSING_SLICE_ASOF")]
    NodeMissingSliceAsOf,
    #[serde(rename = "ORG_Q_005_NODE_MISSING_EDGE_ASOF")]
    NodeMissingEdgeAsOf,
    #[serde(rename = "ORG_Q_006_EDGE_PARENT_NULL_FOR_NON_ROOT")]
    EdgeParentNullForNonRoot,
    #[serde(rename = "ORG_Q_007_LEAF_REQUIRES_POSITION_ASOF")]
    LeafRequiresPositionAsOf,
    #[serde(rename = "ORG_Q_008_ASSIGNMENT_SUBJECT_MAPPING")]
    AssignmentSubjectMapping,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::NodeCodeFormat => "ORG_Q_001_NODE_CODE_FORMAT",
            RuleId::PositionCodeFormat => "ORG_Q_002_POSITION_CODE_FORMAT",
            RuleId::RootInvariants => "ORG_Q_003_ROOT_INVARIANTS",
            RuleId::NodeMissingSliceAsOf => "ORG_Q_004_NODE_MISSING_SLICE_ASOF",
            RuleId::NodeMissingEdgeAsOf => "ORG_Q_005_NODE_MISSING_EDGE_ASOF",
            RuleId::EdgeParentNullForNonRoot => "ORG_Q_006_EDGE_PARENT_NULL_FOR_NON_ROOT",
            RuleId::LeafRequiresPositionAsOf => "ORG_Q_007_LEAF_REQUIRES_POSITION_ASOF",
            RuleId::AssignmentSubjectMapping => "ORG_Q_008_ASSIGNMENT_SUBJECT_MAPPING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// Closed set of correction command kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixKind {
    #[serde(rename = "assignment.correct")]
    AssignmentCorrect,
}

impl FixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixKind::AssignmentCorrect => "assignment.correct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    OrgNode,
    OrgNodeSlice,
    OrgEdge,
    OrgPosition,
    OrgAssignment,
    Tenant,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::OrgNode => "org_node",
            EntityType::OrgNodeSlice => "org_node_slice",
            EntityType::OrgEdge => "org_edge",
            EntityType::OrgPosition => "org_position",
            EntityType::OrgAssignment => "org_assignment",
            EntityType::Tenant => "tenant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ruleset {
    pub name: String,
    pub version: String,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self {
            name: RULESET_NAME.to_string(),
            version: RULESET_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Summary {
    pub errors: usize,
    pub warnings: usize,
    pub issues_total: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EffectiveWindow {
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Autofix {
    pub supported: bool,
    pub fix_kind: FixKind,
    pub risk: String,
}

impl Autofix {
    pub fn low_risk(fix_kind: FixKind) -> Self {
        Self {
            supported: true,
            fix_kind,
            risk: "low".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Issue {
    pub issue_id: Uuid,
    pub rule_id: RuleId,
    pub severity: Severity,
    pub entity: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_window: Option<EffectiveWindow>,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autofix: Option<Autofix>,
}

/// `org_quality_report.v1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QualityReport {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub tenant_id: Uuid,
    pub as_of: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub ruleset: Ruleset,
    pub summary: Summary,
    pub issues: Vec<Issue>,
}

impl QualityReport {
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != QUALITY_REPORT_SCHEMA_VERSION {
            return Err(Error::validation(format!(
                "report schema_version={} is unsupported",
                self.schema_version
            )));
        }
        if self.run_id.is_nil() {
            return Err(Error::validation("report.run_id is required"));
        }
        if self.tenant_id.is_nil() {
            return Err(Error::validation("report.tenant_id is required"));
        }
        if self.ruleset.name != RULESET_NAME || self.ruleset.version != RULESET_VERSION {
            return Err(Error::validation(format!(
                "report.ruleset must be {RULESET_NAME}/{RULESET_VERSION}"
            )));
        }
        for (i, issue) in self.issues.iter().enumerate() {
            if issue.issue_id.is_nil() {
                return Err(Error::validation(format!(
                    "report.issues[{i}].issue_id is required"
                )));
            }
            if issue.entity.id.is_nil() {
                return Err(Error::validation(format!(
                    "report.issues[{i}].entity is required"
                )));
            }
            if issue.message.trim().is_empty() {
                return Err(Error::validation(format!(
                    "report.issues[{i}].message is required"
                )));
            }
        }
        Ok(())
    }
}

/// Deterministic issue order: `(rule_id, severity, entity.type, entity.id)`
pub fn sort_issues(issues: &mut [Issue]) {
    issues.sort_by(|a, b| {
        a.rule_id
            .as_str()
            .cmp(b.rule_id.as_str())
            .then_with(|| a.severity.as_str().cmp(b.severity.as_str()))
            .then_with(|| a.entity.entity_type.as_str().cmp(b.entity.entity_type.as_str()))
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchCommand {
    #[serde(rename = "type")]
    pub kind: FixKind,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    pub dry_run: bool,
    pub effective_date: String,
    pub commands: Vec<BatchCommand>,
}

/// Payload of an `assignment.correct` command; also the shape of rollback
/// commands rebuilt from captured before-state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentCorrectPayload {
    pub id: Uuid,
    pub pernr: Option<String>,
    pub subject_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixPlanMaps {
    pub issue_to_command_indexes: BTreeMap<String, Vec<usize>>,
}

/// `org_quality_fix_plan.v1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixPlan {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub tenant_id: Uuid,
    pub as_of: NaiveDate,
    pub source_report_run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub batch_request: BatchRequest,
    pub maps: FixPlanMaps,
}

impl FixPlan {
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != FIX_PLAN_SCHEMA_VERSION {
            return Err(Error::validation(format!(
                "fix_plan schema_version={} is unsupported",
                self.schema_version
            )));
        }
        if self.run_id.is_nil() {
            return Err(Error::validation("fix_plan.run_id is required"));
        }
        if self.tenant_id.is_nil() {
            return Err(Error::validation("fix_plan.tenant_id is required"));
        }
        if self.source_report_run_id.is_nil() {
            return Err(Error::validation("fix_plan.source_report_run_id is required"));
        }
        if self.batch_request.effective_date.trim().is_empty() {
            return Err(Error::validation(
                "fix_plan.batch_request.effective_date is required",
            ));
        }
        if self.batch_request.commands.is_empty() {
            return Err(Error::validation("fix_plan.batch_request.commands is required"));
        }
        for (i, cmd) in self.batch_request.commands.iter().enumerate() {
            if cmd.payload.is_null() {
                return Err(Error::validation(format!(
                    "fix_plan.batch_request.commands[{i}].payload is required"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BeforeAssignment {
    pub id: Uuid,
    pub pernr: String,
    pub subject_id: Uuid,
    pub position_id: Uuid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixBefore {
    pub assignments: Vec<BeforeAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchCommandResult {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Structured error body returned by the Org API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixResults {
    pub ok: bool,
    pub events_enqueued: u64,
    #[serde(default)]
    pub batch_results: Option<Vec<BatchCommandResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

/// `org_quality_fix_manifest.v1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub tenant_id: Uuid,
    pub as_of: NaiveDate,
    pub applied_at: DateTime<Utc>,
    pub source_fix_plan_run_id: Uuid,
    pub change_request_id: Option<Uuid>,
    pub batch_request: BatchRequest,
    pub before: FixBefore,
    pub results: FixResults,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preflight_response: Option<serde_json::Value>,
}

impl FixManifest {
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != FIX_MANIFEST_SCHEMA_VERSION {
            return Err(Error::validation(format!(
                "manifest schema_version={} is unsupported",
                self.schema_version
            )));
        }
        if self.run_id.is_nil() {
            return Err(Error::validation("manifest.run_id is required"));
        }
        if self.tenant_id.is_nil() {
            return Err(Error::validation("manifest.tenant_id is required"));
        }
        if self.source_fix_plan_run_id.is_nil() {
            return Err(Error::validation("manifest.source_fix_plan_run_id is required"));
        }
        if self.batch_request.effective_date.trim().is_empty() {
            return Err(Error::validation(
                "manifest.batch_request.effective_date is required",
            ));
        }
        if self.batch_request.commands.is_empty() {
            return Err(Error::validation("manifest.batch_request.commands is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportInput {
    pub dir: String,
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportInserted {
    pub org_nodes: Vec<Uuid>,
    pub org_node_slices: Vec<Uuid>,
    pub org_edges: Vec<Uuid>,
    pub org_positions: Vec<Uuid>,
    pub org_assignments: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectMapping {
    pub pernr: String,
    pub subject_id: Uuid,
}

/// `import_manifest.v1`, the exact undo record for one seed import run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub tenant_id: Uuid,
    pub mode: String,
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: ImportInput,
    pub inserted: ImportInserted,
    pub subject_mappings: Vec<SubjectMapping>,
    pub summary: BTreeMap<String, serde_json::Value>,
}

impl ImportManifest {
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != IMPORT_MANIFEST_SCHEMA_VERSION {
            return Err(Error::validation(format!(
                "unsupported manifest schema_version: {}",
                self.schema_version
            )));
        }
        if self.backend != "db" || self.mode != "seed" {
            return Err(Error::validation(format!(
                "unsupported manifest backend/mode: {}/{}",
                self.backend, self.mode
            )));
        }
        Ok(())
    }
}

pub fn quality_report_file_name(tenant_id: Uuid, as_of: NaiveDate, run_id: Uuid) -> String {
    format!(
        "org_quality_report_{tenant_id}_{}_{run_id}.json",
        time::file_token(as_of)
    )
}

pub fn fix_plan_file_name(tenant_id: Uuid, as_of: NaiveDate, run_id: Uuid) -> String {
    format!(
        "org_quality_fix_plan_{tenant_id}_{}_{run_id}.json",
        time::file_token(as_of)
    )
}

pub fn fix_manifest_file_name(tenant_id: Uuid, as_of: NaiveDate, run_id: Uuid) -> String {
    format!(
        "org_quality_fix_manifest_{tenant_id}_{}_{run_id}.json",
        time::file_token(as_of)
    )
}

pub fn import_manifest_file_name(generated_at: DateTime<Utc>, run_id: Uuid) -> String {
    format!(
        "import_manifest_{}_{run_id}.json",
        generated_at.format("%Y%m%dT%H%M%SZ")
    )
}

/// Write a document as pretty-printed JSON, creating parent directories.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::validation(format!("json marshal: {e}")))?;
    std::fs::write(path, body)?;
    Ok(())
}

/// Read and strictly decode a document (unknown fields rejected by the
/// document types themselves).
pub fn read_json_file<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let body = std::fs::read(path).map_err(|e| Error::usage(format!("read {}: {e}", path.display())))?;
    serde_json::from_slice(&body)
        .map_err(|e| Error::validation(format!("decode {}: {e}", path.display())))
}

/// Print a one-line JSON summary to stdout.
pub fn write_json_line<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)
        .map_err(|e| Error::validation(format!("json marshal: {e}")))?;
    println!("{line}");
    Ok(())
}

/// `--output` may name a file or a directory; directories get the
/// suggested file name appended.
pub fn resolve_output_file_path(output: &str, suggested_name: &str) -> Result<PathBuf> {
    let output = output.trim();
    if output.is_empty() {
        return Err(Error::usage("--output is required"));
    }
    let path = Path::new(output);
    if path.is_dir() || output.ends_with(std::path::MAIN_SEPARATOR) {
        return Ok(path.join(suggested_name));
    }
    Ok(path.to_path_buf())
}
