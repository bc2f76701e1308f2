//! Seed import pipeline
//!
//! Parses the CSV bundle, normalizes time slices, validates the hierarchy,
//! resolves managers and persons against the database, and applies all
//! inserts in a single transaction. The manifest that captures every
//! inserted id is written only after the transaction commits.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use org_common::config::Config;
use org_common::docs::{
    import_manifest_file_name, write_json_file, write_json_line, ImportInserted, ImportManifest,
    SubjectMapping, IMPORT_MANIFEST_SCHEMA_VERSION,
};
use org_common::error::{Error, Result};
use org_common::time::covers;

use crate::db;
use crate::hierarchy;
use crate::ingest::{
    parse_assignments_csv_if_exists, parse_nodes_csv, parse_positions_csv_if_exists,
    AssignmentRow, NodeRow, PositionRow,
};
use crate::normalize::normalize_slices;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub tenant_id: Uuid,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub apply: bool,
    pub skip_assignments: bool,
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct EdgeSeed {
    pub id: Uuid,
    pub child_code: String,
    pub parent_code: Option<String>,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct PositionSeed {
    pub id: Uuid,
    pub line: u64,
    pub code: String,
    pub org_node_id: Uuid,
    pub title: Option<String>,
    pub status: String,
    pub is_auto_created: bool,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct AssignmentSeed {
    pub id: Uuid,
    pub line: u64,
    pub position_id: Uuid,
    pub assignment_type: String,
    pub pernr: String,
    /// `Uuid::nil()` until person resolution fills it in.
    pub subject_id: Uuid,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug)]
pub struct NormalizedData {
    pub run_id: Uuid,
    pub tenant_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub nodes_by_code: BTreeMap<String, Uuid>,
    pub node_slices: Vec<NodeRow>,
    pub edges: Vec<EdgeSeed>,
    pub positions: Vec<PositionSeed>,
    pub assignments: Vec<AssignmentSeed>,
    pub subject_mappings: BTreeMap<String, Uuid>,
}

pub fn normalize_and_validate(
    run_id: Uuid,
    tenant_id: Uuid,
    started_at: DateTime<Utc>,
    mut nodes: Vec<NodeRow>,
    positions: Vec<PositionRow>,
    assignments: Vec<AssignmentRow>,
    strict: bool,
) -> Result<NormalizedData> {
    if tenant_id.is_nil() {
        return Err(Error::validation("tenant_id is required"));
    }

    for r in &nodes {
        if r.node_type != "OrgUnit" {
            return Err(Error::at_line(
                r.line,
                format!("type must be OrgUnit, got {:?}", r.node_type),
            ));
        }
        match r.status.as_str() {
            "active" | "retired" | "rescinded" => {}
            other => {
                return Err(Error::at_line(r.line, format!("invalid status: {other:?}")));
            }
        }
    }

    let mut nodes_by_code: BTreeMap<String, Uuid> = BTreeMap::new();
    for r in &nodes {
        nodes_by_code
            .entry(r.code.clone())
            .or_insert_with(Uuid::new_v4);
    }

    let root_code = hierarchy::validate_roots(&nodes)?;
    normalize_slices(&mut nodes, |r| r.code.clone(), "code")?;
    let edges = derive_edges(&nodes);
    hierarchy::validate_parent_references(&nodes, &root_code)?;
    hierarchy::validate_cycles(&nodes, strict)?;

    let positions = normalize_positions(positions, &nodes_by_code)?;
    let (assignments, subject_mappings) = normalize_assignments(assignments, &positions)?;

    Ok(NormalizedData {
        run_id,
        tenant_id,
        started_at,
        nodes_by_code,
        node_slices: nodes,
        edges,
        positions,
        assignments,
        subject_mappings,
    })
}

fn derive_edges(nodes: &[NodeRow]) -> Vec<EdgeSeed> {
    nodes
        .iter()
        .map(|r| EdgeSeed {
            id: Uuid::new_v4(),
            child_code: r.code.clone(),
            parent_code: r.parent_code_trimmed().map(str::to_string),
            effective_date: r.effective_date,
            end_date: r.end_date,
        })
        .collect()
}

fn normalize_positions(
    mut rows: Vec<PositionRow>,
    nodes_by_code: &BTreeMap<String, Uuid>,
) -> Result<Vec<PositionSeed>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    for r in &rows {
        match r.status.as_str() {
            "active" | "retired" | "rescinded" => {}
            other => {
                return Err(Error::at_line(r.line, format!("invalid status: {other:?}")));
            }
        }
        if !nodes_by_code.contains_key(&r.org_node_code) {
            return Err(Error::at_line(
                r.line,
                format!("unknown org_node_code: {:?}", r.org_node_code),
            ));
        }
    }

    normalize_slices(&mut rows, |r| r.code.clone(), "position code")?;

    Ok(rows
        .into_iter()
        .map(|r| PositionSeed {
            id: Uuid::new_v4(),
            line: r.line,
            org_node_id: nodes_by_code[&r.org_node_code],
            code: r.code,
            title: r.title,
            status: r.status,
            is_auto_created: r.is_auto_created,
            effective_date: r.effective_date,
            end_date: r.end_date,
        })
        .collect())
}

fn normalize_assignments(
    mut rows: Vec<AssignmentRow>,
    positions: &[PositionSeed],
) -> Result<(Vec<AssignmentSeed>, BTreeMap<String, Uuid>)> {
    if rows.is_empty() {
        return Ok((Vec::new(), BTreeMap::new()));
    }

    let mut positions_by_code: HashMap<&str, Vec<&PositionSeed>> = HashMap::new();
    for p in positions {
        positions_by_code.entry(&p.code).or_default().push(p);
    }

    for r in &rows {
        if r.assignment_type != "primary" {
            return Err(Error::at_line(
                r.line,
                "only primary assignment_type is supported",
            ));
        }
        if !positions_by_code.contains_key(r.position_code.as_str()) {
            return Err(Error::at_line(
                r.line,
                format!("unknown position_code: {:?}", r.position_code),
            ));
        }
    }

    normalize_slices(
        &mut rows,
        |r| format!("{}|{}", r.pernr, r.assignment_type),
        "pernr",
    )?;

    let mut out = Vec::with_capacity(rows.len());
    let mut subject_mappings = BTreeMap::new();
    for r in rows {
        let position_id = positions_by_code[r.position_code.as_str()]
            .iter()
            .find(|p| covers(p.effective_date, p.end_date, r.effective_date))
            .map(|p| p.id)
            .ok_or_else(|| {
                Error::at_line(
                    r.line,
                    format!(
                        "no position slice for {:?} covering {}",
                        r.position_code, r.effective_date
                    ),
                )
            })?;

        let subject_id = r.subject_id.unwrap_or_else(Uuid::nil);
        subject_mappings.insert(r.pernr.clone(), subject_id);
        out.push(AssignmentSeed {
            id: Uuid::new_v4(),
            line: r.line,
            position_id,
            assignment_type: r.assignment_type,
            pernr: r.pernr,
            subject_id,
            effective_date: r.effective_date,
            end_date: r.end_date,
        });
    }
    Ok((out, subject_mappings))
}

async fn precheck_seed(pool: &SqlitePool, tenant_id: Uuid) -> Result<()> {
    if !db::tenant_exists(pool, tenant_id).await? {
        return Err(Error::validation(format!("unknown tenant: {tenant_id}")));
    }
    if !db::persons_table_exists(pool).await? {
        return Err(Error::validation(
            "persons table not found; run database migrations first",
        ));
    }
    if db::tenant_has_org_nodes(pool, tenant_id).await? {
        return Err(Error::validation("seed import requires an empty tenant"));
    }
    Ok(())
}

async fn resolve_managers(pool: &SqlitePool, tenant_id: Uuid, data: &mut NormalizedData) -> Result<()> {
    for row in &mut data.node_slices {
        let email = row.manager_email.as_deref().map(str::trim).unwrap_or("");
        if row.manager_user_id.is_none() && email.is_empty() {
            continue;
        }

        if row.manager_user_id.is_none() {
            match db::user_id_by_email(pool, tenant_id, email).await? {
                Some(id) => row.manager_user_id = Some(id),
                None => {
                    return Err(Error::at_line(
                        row.line,
                        format!("manager_email not found: {email}"),
                    ));
                }
            }
        }

        if let Some(id) = row.manager_user_id {
            if !db::user_exists(pool, tenant_id, id).await? {
                return Err(Error::at_line(
                    row.line,
                    format!("manager_user_id not found: {id}"),
                ));
            }
        }
    }
    Ok(())
}

/// Resolves every pernr against the persons table and overwrites both the
/// subject mapping and assignment subject ids with the resolved values.
async fn resolve_persons(pool: &SqlitePool, data: &mut NormalizedData) -> Result<()> {
    let mut resolved: BTreeMap<String, Uuid> = BTreeMap::new();
    for (pernr, subject_id) in &data.subject_mappings {
        let pernr_trim = pernr.trim();
        if pernr_trim.is_empty() {
            continue;
        }
        let person = db::person_subject_id(pool, data.tenant_id, pernr_trim)
            .await?
            .ok_or_else(|| {
                Error::validation(format!("pernr not found in persons: {pernr_trim}"))
            })?;
        if !subject_id.is_nil() && *subject_id != person {
            return Err(Error::validation(format!(
                "subject_id mismatch for pernr={pernr_trim}"
            )));
        }
        resolved.insert(pernr_trim.to_string(), person);
    }

    for a in &mut data.assignments {
        let pernr_trim = a.pernr.trim().to_string();
        if let Some(subject) = resolved.get(&pernr_trim) {
            a.pernr = pernr_trim;
            a.subject_id = *subject;
        }
    }
    data.subject_mappings = resolved;
    Ok(())
}

async fn apply_seed_import(
    pool: &SqlitePool,
    data: &NormalizedData,
    opts: &ImportOptions,
) -> Result<ImportManifest> {
    let mut tx = pool.begin().await?;
    let created_at = Utc::now();

    let mut manifest = ImportManifest {
        schema_version: IMPORT_MANIFEST_SCHEMA_VERSION,
        run_id: data.run_id,
        tenant_id: data.tenant_id,
        mode: "seed".to_string(),
        backend: "db".to_string(),
        started_at: data.started_at,
        finished_at: data.started_at,
        input: Default::default(),
        inserted: ImportInserted::default(),
        subject_mappings: Vec::new(),
        summary: BTreeMap::new(),
    };
    manifest.input.dir = opts.input_dir.display().to_string();
    manifest
        .input
        .files
        .insert("nodes".to_string(), "nodes.csv".to_string());
    if opts.input_dir.join("positions.csv").exists() {
        manifest
            .input
            .files
            .insert("positions".to_string(), "positions.csv".to_string());
    }
    if !opts.skip_assignments && opts.input_dir.join("assignments.csv").exists() {
        manifest
            .input
            .files
            .insert("assignments".to_string(), "assignments.csv".to_string());
    }

    let root_code = data
        .node_slices
        .iter()
        .find(|r| r.parent_code_trimmed().is_none())
        .map(|r| r.code.clone())
        .unwrap_or_default();

    for (code, node_id) in &data.nodes_by_code {
        db::insert_org_node(
            &mut *tx,
            &db::NewOrgNode {
                id: *node_id,
                tenant_id: data.tenant_id,
                code,
                node_type: "OrgUnit",
                is_root: *code == root_code,
                created_at,
            },
        )
        .await
        .map_err(|e| Error::db_write(format!("insert org_nodes({code}): {e}")))?;
        manifest.inserted.org_nodes.push(*node_id);
    }

    for r in &data.node_slices {
        let slice_id = Uuid::new_v4();
        db::insert_node_slice(
            &mut *tx,
            &db::NewNodeSlice {
                id: slice_id,
                tenant_id: data.tenant_id,
                org_node_id: data.nodes_by_code[&r.code],
                name: &r.name,
                i18n_names: r.i18n_names.as_ref(),
                status: &r.status,
                legal_entity_id: r.legal_entity_id,
                company_code: r.company_code.as_deref(),
                location_id: r.location_id,
                display_order: r.display_order,
                manager_user_id: r.manager_user_id,
                effective_date: r.effective_date,
                end_date: r.end_date,
                created_at,
            },
        )
        .await
        .map_err(|e| {
            Error::db_write(format!("line {}: insert org_node_slices({}): {e}", r.line, r.code))
        })?;
        manifest.inserted.org_node_slices.push(slice_id);
    }

    insert_edges(&mut tx, data, created_at).await?;
    manifest.inserted.org_edges = data.edges.iter().map(|e| e.id).collect();

    for p in &data.positions {
        db::insert_position(
            &mut *tx,
            &db::NewPosition {
                id: p.id,
                tenant_id: data.tenant_id,
                org_node_id: p.org_node_id,
                code: &p.code,
                title: p.title.as_deref(),
                status: &p.status,
                is_auto_created: p.is_auto_created,
                effective_date: p.effective_date,
                end_date: p.end_date,
                created_at,
            },
        )
        .await
        .map_err(|e| {
            Error::db_write(format!("line {}: insert org_positions({}): {e}", p.line, p.code))
        })?;
        manifest.inserted.org_positions.push(p.id);
    }

    for a in &data.assignments {
        db::insert_assignment(
            &mut *tx,
            &db::NewAssignment {
                id: a.id,
                tenant_id: data.tenant_id,
                position_id: a.position_id,
                subject_type: "person",
                subject_id: a.subject_id,
                pernr: &a.pernr,
                assignment_type: &a.assignment_type,
                effective_date: a.effective_date,
                end_date: a.end_date,
                created_at,
            },
        )
        .await
        .map_err(|e| {
            Error::db_write(format!("line {}: insert org_assignments(pernr={}): {e}", a.line, a.pernr))
        })?;
        manifest.inserted.org_assignments.push(a.id);
    }

    manifest.subject_mappings = data
        .subject_mappings
        .iter()
        .map(|(pernr, subject_id)| SubjectMapping {
            pernr: pernr.clone(),
            subject_id: *subject_id,
        })
        .collect();

    manifest
        .summary
        .insert("nodes_rows".to_string(), data.node_slices.len().into());
    manifest
        .summary
        .insert("positions_rows".to_string(), data.positions.len().into());
    manifest
        .summary
        .insert("assignments_rows".to_string(), data.assignments.len().into());

    tx.commit().await?;
    manifest.finished_at = Utc::now();
    Ok(manifest)
}

/// Inserts edges grouped by effective date, parents before children.
async fn insert_edges(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    data: &NormalizedData,
    created_at: DateTime<Utc>,
) -> Result<()> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&EdgeSeed>> = BTreeMap::new();
    for e in &data.edges {
        by_date.entry(e.effective_date).or_default().push(e);
    }

    for (at, mut edges) in by_date {
        let mut depths: HashMap<&str, usize> = HashMap::new();
        for e in &edges {
            edge_depth(&data.edges, &e.child_code, at, &mut depths);
        }
        edges.sort_by(|a, b| {
            let da = depths.get(a.child_code.as_str()).copied().unwrap_or(0);
            let db = depths.get(b.child_code.as_str()).copied().unwrap_or(0);
            da.cmp(&db).then_with(|| a.child_code.cmp(&b.child_code))
        });

        for e in edges {
            let parent_node_id = e
                .parent_code
                .as_deref()
                .and_then(|p| data.nodes_by_code.get(p).copied());
            db::insert_edge(
                &mut **tx,
                &db::NewEdge {
                    id: e.id,
                    tenant_id: data.tenant_id,
                    parent_node_id,
                    child_node_id: data.nodes_by_code[&e.child_code],
                    effective_date: e.effective_date,
                    end_date: e.end_date,
                    created_at,
                },
            )
            .await
            .map_err(|e2| {
                Error::db_write(format!("insert org_edges(child={}): {e2}", e.child_code))
            })?;
        }
    }
    Ok(())
}

fn edge_depth<'a>(
    edges: &'a [EdgeSeed],
    code: &'a str,
    at: NaiveDate,
    memo: &mut HashMap<&'a str, usize>,
) -> usize {
    if let Some(d) = memo.get(code) {
        return *d;
    }
    // Mark before recursing so a malformed chain cannot loop forever.
    memo.insert(code, 0);
    let parent = edges
        .iter()
        .find(|e| e.child_code == code && covers(e.effective_date, e.end_date, at))
        .and_then(|e| e.parent_code.as_deref());
    let depth = match parent {
        Some(p) => edge_depth(edges, p, at, memo) + 1,
        None => 0,
    };
    memo.insert(code, depth);
    depth
}

#[derive(Debug, Serialize)]
struct ImportCounts {
    nodes_rows: usize,
    positions_rows: usize,
    assignments_rows: usize,
}

#[derive(Debug, Serialize)]
struct ImportSummaryLine<'a> {
    status: &'a str,
    run_id: Uuid,
    tenant_id: Uuid,
    backend: &'a str,
    mode: &'a str,
    apply: bool,
    input_dir: String,
    output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    manifest_version: Option<u32>,
    counts: ImportCounts,
}

fn print_import_summary(
    data: &NormalizedData,
    opts: &ImportOptions,
    status: &str,
    manifest: Option<&ImportManifest>,
) -> Result<()> {
    write_json_line(&ImportSummaryLine {
        status,
        run_id: data.run_id,
        tenant_id: data.tenant_id,
        backend: "db",
        mode: "seed",
        apply: opts.apply,
        input_dir: opts.input_dir.display().to_string(),
        output_dir: opts.output_dir.display().to_string(),
        manifest_version: manifest.map(|m| m.schema_version),
        counts: ImportCounts {
            nodes_rows: data.node_slices.len(),
            positions_rows: data.positions.len(),
            assignments_rows: data.assignments.len(),
        },
    })
}

pub async fn run_import(config: &Config, opts: ImportOptions) -> Result<()> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let nodes = parse_nodes_csv(&opts.input_dir.join("nodes.csv"))
        .map_err(|e| Error::validation(format!("nodes.csv: {e}")))?;
    let positions = parse_positions_csv_if_exists(&opts.input_dir.join("positions.csv"))
        .map_err(|e| Error::validation(format!("positions.csv: {e}")))?;
    let assignments = if opts.skip_assignments {
        Vec::new()
    } else {
        parse_assignments_csv_if_exists(&opts.input_dir.join("assignments.csv"))
            .map_err(|e| Error::validation(format!("assignments.csv: {e}")))?
    };

    let mut data = normalize_and_validate(
        run_id,
        opts.tenant_id,
        started_at,
        nodes,
        positions,
        assignments,
        opts.strict,
    )?;

    let pool = db::connect(&config.database_url).await?;
    precheck_seed(&pool, opts.tenant_id).await?;
    resolve_managers(&pool, opts.tenant_id, &mut data).await?;
    if !opts.skip_assignments {
        resolve_persons(&pool, &mut data).await?;
    }

    if !opts.apply {
        return print_import_summary(&data, &opts, "dry_run", None);
    }

    let manifest = apply_seed_import(&pool, &data, &opts).await?;
    let path = opts
        .output_dir
        .join(import_manifest_file_name(Utc::now(), manifest.run_id));
    write_json_file(&path, &manifest)?;
    info!(path = %path.display(), "wrote import manifest");

    print_import_summary(&data, &opts, "applied", Some(&manifest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{AssignmentRow, NodeRow, PositionRow};
    use org_common::time::OPEN_END;

    fn node(line: u64, code: &str, parent: &str, eff: &str) -> NodeRow {
        NodeRow {
            line,
            code: code.to_string(),
            node_type: "OrgUnit".to_string(),
            name: code.to_string(),
            i18n_names: None,
            status: "active".to_string(),
            legal_entity_id: None,
            company_code: None,
            location_id: None,
            display_order: 0,
            parent_code: (!parent.is_empty()).then(|| parent.to_string()),
            manager_user_id: None,
            manager_email: None,
            effective_date: eff.parse().unwrap(),
            end_date: OPEN_END,
            end_date_provided: false,
        }
    }

    fn position(line: u64, code: &str, node: &str, eff: &str) -> PositionRow {
        PositionRow {
            line,
            code: code.to_string(),
            org_node_code: node.to_string(),
            title: None,
            status: "active".to_string(),
            is_auto_created: false,
            effective_date: eff.parse().unwrap(),
            end_date: OPEN_END,
            end_date_provided: false,
        }
    }

    fn assignment(line: u64, position: &str, pernr: &str, eff: &str) -> AssignmentRow {
        AssignmentRow {
            line,
            position_code: position.to_string(),
            assignment_type: "primary".to_string(),
            pernr: pernr.to_string(),
            subject_id: None,
            effective_date: eff.parse().unwrap(),
            end_date: OPEN_END,
            end_date_provided: false,
        }
    }

    fn normalize(
        nodes: Vec<NodeRow>,
        positions: Vec<PositionRow>,
        assignments: Vec<AssignmentRow>,
    ) -> Result<NormalizedData> {
        normalize_and_validate(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now(),
            nodes,
            positions,
            assignments,
            false,
        )
    }

    #[test]
    fn full_bundle_normalizes() {
        let data = normalize(
            vec![
                node(2, "ROOT", "", "2025-01-01"),
                node(3, "SALES", "ROOT", "2025-01-01"),
            ],
            vec![position(2, "P-1", "SALES", "2025-01-01")],
            vec![assignment(2, "P-1", "1001", "2025-02-01")],
        )
        .unwrap();

        assert_eq!(data.nodes_by_code.len(), 2);
        assert_eq!(data.edges.len(), 2);
        assert_eq!(data.positions.len(), 1);
        assert_eq!(data.assignments.len(), 1);
        assert_eq!(data.assignments[0].position_id, data.positions[0].id);
        assert!(data.subject_mappings["1001"].is_nil());
    }

    #[test]
    fn node_type_other_than_org_unit_is_rejected() {
        let mut n = node(2, "ROOT", "", "2025-01-01");
        n.node_type = "Team".to_string();
        let err = normalize(vec![n], vec![], vec![]).unwrap_err();
        assert!(err.to_string().contains("type must be OrgUnit"));
    }

    #[test]
    fn invalid_node_status_is_rejected() {
        let mut n = node(2, "ROOT", "", "2025-01-01");
        n.status = "dormant".to_string();
        let err = normalize(vec![n], vec![], vec![]).unwrap_err();
        assert_eq!(err.to_string(), "line 2: invalid status: \"dormant\"");
    }

    #[test]
    fn position_with_unknown_node_is_rejected() {
        let err = normalize(
            vec![node(2, "ROOT", "", "2025-01-01")],
            vec![position(2, "P-1", "GHOST", "2025-01-01")],
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown org_node_code"));
    }

    #[test]
    fn secondary_assignment_type_is_rejected() {
        let mut a = assignment(2, "P-1", "1001", "2025-01-01");
        a.assignment_type = "secondary".to_string();
        let err = normalize(
            vec![node(2, "ROOT", "", "2025-01-01")],
            vec![position(2, "P-1", "ROOT", "2025-01-01")],
            vec![a],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "line 2: only primary assignment_type is supported"
        );
    }

    #[test]
    fn assignment_outside_position_window_is_rejected() {
        let mut p = position(2, "P-1", "ROOT", "2025-01-01");
        p.end_date = "2025-06-30".parse().unwrap();
        p.end_date_provided = true;
        let err = normalize(
            vec![node(2, "ROOT", "", "2025-01-01")],
            vec![p],
            vec![assignment(2, "P-1", "1001", "2025-08-01")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("no position slice"));
    }

    #[test]
    fn explicit_subject_id_lands_in_mapping() {
        let sid = Uuid::new_v4();
        let mut a = assignment(2, "P-1", "1001", "2025-01-01");
        a.subject_id = Some(sid);
        let data = normalize(
            vec![node(2, "ROOT", "", "2025-01-01")],
            vec![position(2, "P-1", "ROOT", "2025-01-01")],
            vec![a],
        )
        .unwrap();
        assert_eq!(data.subject_mappings["1001"], sid);
    }

    #[test]
    fn edge_depths_order_parents_first() {
        let data = normalize(
            vec![
                node(2, "ROOT", "", "2025-01-01"),
                node(3, "B", "A", "2025-01-01"),
                node(4, "A", "ROOT", "2025-01-01"),
            ],
            vec![],
            vec![],
        )
        .unwrap();
        let at: NaiveDate = "2025-01-01".parse().unwrap();
        let mut memo = HashMap::new();
        assert_eq!(edge_depth(&data.edges, "ROOT", at, &mut memo), 0);
        assert_eq!(edge_depth(&data.edges, "A", at, &mut memo), 1);
        assert_eq!(edge_depth(&data.edges, "B", at, &mut memo), 2);
    }
}
