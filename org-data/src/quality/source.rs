//! Builds the hierarchy state from the database or an API snapshot

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use org_common::api::{OrgApiClient, SnapshotItem};
use org_common::error::{Error, Result};

use crate::db;

use super::state::{
    AssignmentRec, EdgeRec, HierarchyState, NodeRec, NodeSliceRec, PositionCatalogRec, PositionRec,
};

fn parse_id(context: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::validation(format!("{context}: {e}")))
}

pub async fn state_from_db(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: NaiveDate,
) -> Result<HierarchyState> {
    let nodes_all = db::list_org_nodes(pool, tenant_id).await?;
    let positions_all = db::list_org_positions(pool, tenant_id).await?;
    let node_slices = db::node_slices_as_of(pool, tenant_id, as_of).await?;
    let edges = db::edges_as_of(pool, tenant_id, as_of).await?;
    let positions_as_of = db::positions_as_of(pool, tenant_id, as_of).await?;
    let assignments_as_of = db::assignments_as_of(pool, tenant_id, as_of).await?;

    let mut nodes = Vec::with_capacity(nodes_all.len());
    for n in nodes_all {
        nodes.push(NodeRec {
            id: parse_id("org_nodes.id", &n.id)?,
            code: n.code,
            is_root: n.is_root,
        });
    }

    let mut slices = HashMap::with_capacity(node_slices.len());
    for s in node_slices {
        slices.insert(
            parse_id("org_node_slices.org_node_id", &s.org_node_id)?,
            NodeSliceRec {
                status: s.status,
                effective_date: s.effective_date,
                end_date: s.end_date,
            },
        );
    }

    let mut edge_recs = Vec::with_capacity(edges.len());
    for e in edges {
        edge_recs.push(EdgeRec {
            id: parse_id("org_edges.id", &e.id)?,
            parent_node_id: e
                .parent_node_id
                .as_deref()
                .map(|p| parse_id("org_edges.parent_node_id", p))
                .transpose()?,
            child_node_id: parse_id("org_edges.child_node_id", &e.child_node_id)?,
        });
    }

    let mut catalog = Vec::with_capacity(positions_all.len());
    for p in positions_all {
        catalog.push(PositionCatalogRec {
            id: parse_id("org_positions.id", &p.id)?,
            code: p.code,
            is_auto_created: p.is_auto_created,
        });
    }

    let mut positions = Vec::with_capacity(positions_as_of.len());
    for p in positions_as_of {
        positions.push(PositionRec {
            id: parse_id("org_positions.id", &p.id)?,
            org_node_id: parse_id("org_positions.org_node_id", &p.org_node_id)?,
            status: p.status,
        });
    }

    let mut assignments = Vec::with_capacity(assignments_as_of.len());
    for a in assignments_as_of {
        assignments.push(AssignmentRec {
            id: parse_id("org_assignments.id", &a.id)?,
            position_id: a
                .position_id
                .as_deref()
                .map(|p| parse_id("org_assignments.position_id", p))
                .transpose()?,
            subject_type: a.subject_type,
            subject_id: parse_id("org_assignments.subject_id", &a.subject_id)?,
            pernr: a.pernr,
            assignment_type: a.assignment_type,
            effective_date: a.effective_date,
            end_date: a.end_date,
        });
    }

    Ok(HierarchyState {
        tenant_id,
        nodes,
        slices,
        edges: edge_recs,
        positions_catalog: catalog,
        positions,
        assignments,
        referenced_node_ids: HashSet::new(),
        slice_inventory_complete: true,
    })
}

#[derive(Debug, Deserialize)]
struct SnapshotNodeValues {
    org_node_id: Uuid,
    is_root: bool,
    code: String,
    status: String,
    effective_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct SnapshotEdgeValues {
    edge_id: Uuid,
    parent_node_id: Option<Uuid>,
    child_node_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct SnapshotPositionValues {
    org_position_id: Uuid,
    org_node_id: Uuid,
    code: String,
    status: String,
    is_auto_created: bool,
}

#[derive(Debug, Deserialize)]
struct SnapshotAssignmentValues {
    org_assignment_id: Uuid,
    position_id: Uuid,
    subject_type: String,
    subject_id: Uuid,
    pernr: String,
    assignment_type: String,
    effective_date: NaiveDate,
    end_date: NaiveDate,
}

/// Constructs state from snapshot items, without any network access.
pub fn state_from_snapshot(tenant_id: Uuid, items: &[SnapshotItem]) -> Result<HierarchyState> {
    let mut nodes = Vec::new();
    let mut slices = HashMap::new();
    let mut edges = Vec::new();
    let mut catalog = Vec::new();
    let mut positions = Vec::new();
    let mut assignments = Vec::new();
    let mut referenced: HashSet<Uuid> = HashSet::new();

    for item in items {
        match item.entity_type.as_str() {
            "org_node" => {
                let v: SnapshotNodeValues = serde_json::from_value(item.new_values.clone())
                    .map_err(|e| Error::validation(format!("snapshot decode org_node: {e}")))?;
                slices.insert(
                    v.org_node_id,
                    NodeSliceRec {
                        status: v.status,
                        effective_date: v.effective_date,
                        end_date: v.end_date,
                    },
                );
                nodes.push(NodeRec {
                    id: v.org_node_id,
                    code: v.code,
                    is_root: v.is_root,
                });
            }
            "org_edge" => {
                let v: SnapshotEdgeValues = serde_json::from_value(item.new_values.clone())
                    .map_err(|e| Error::validation(format!("snapshot decode org_edge: {e}")))?;
                referenced.insert(v.child_node_id);
                if let Some(parent) = v.parent_node_id {
                    referenced.insert(parent);
                }
                edges.push(EdgeRec {
                    id: v.edge_id,
                    parent_node_id: v.parent_node_id,
                    child_node_id: v.child_node_id,
                });
            }
            "org_position" => {
                let v: SnapshotPositionValues = serde_json::from_value(item.new_values.clone())
                    .map_err(|e| Error::validation(format!("snapshot decode org_position: {e}")))?;
                referenced.insert(v.org_node_id);
                catalog.push(PositionCatalogRec {
                    id: v.org_position_id,
                    code: v.code.clone(),
                    is_auto_created: v.is_auto_created,
                });
                positions.push(PositionRec {
                    id: v.org_position_id,
                    org_node_id: v.org_node_id,
                    status: v.status,
                });
            }
            "org_assignment" => {
                let v: SnapshotAssignmentValues = serde_json::from_value(item.new_values.clone())
                    .map_err(|e| {
                        Error::validation(format!("snapshot decode org_assignment: {e}"))
                    })?;
                assignments.push(AssignmentRec {
                    id: v.org_assignment_id,
                    position_id: (!v.position_id.is_nil()).then_some(v.position_id),
                    subject_type: v.subject_type,
                    subject_id: v.subject_id,
                    pernr: v.pernr,
                    assignment_type: v.assignment_type,
                    effective_date: v.effective_date,
                    end_date: v.end_date,
                });
            }
            _ => {}
        }
    }

    Ok(HierarchyState {
        tenant_id,
        nodes,
        slices,
        edges,
        positions_catalog: catalog,
        positions,
        assignments,
        referenced_node_ids: referenced,
        slice_inventory_complete: false,
    })
}

pub async fn state_from_api(
    client: &OrgApiClient,
    tenant_id: Uuid,
    as_of: NaiveDate,
) -> Result<HierarchyState> {
    let snapshot = client
        .get_snapshot_all(as_of, &["nodes", "edges", "positions", "assignments"])
        .await?;
    if let Some(snapshot_tenant) = snapshot.tenant_id {
        if snapshot_tenant != tenant_id {
            return Err(Error::validation(format!(
                "snapshot tenant_id={snapshot_tenant} does not match --tenant={tenant_id}"
            )));
        }
    }
    state_from_snapshot(tenant_id, &snapshot.items)
}
