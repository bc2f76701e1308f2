//! Materialized hierarchy state evaluated by the quality rules
//!
//! Both backends produce the same shape. The database backend carries the
//! full node and position catalogs; the snapshot backend only sees entities
//! effective at the as-of instant, so `slice_inventory_complete` is false
//! and missing slices are inferred from `referenced_node_ids`.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NodeRec {
    pub id: Uuid,
    pub code: String,
    pub is_root: bool,
}

#[derive(Debug, Clone)]
pub struct NodeSliceRec {
    pub status: String,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct EdgeRec {
    pub id: Uuid,
    pub parent_node_id: Option<Uuid>,
    pub child_node_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct PositionCatalogRec {
    pub id: Uuid,
    pub code: String,
    pub is_auto_created: bool,
}

#[derive(Debug, Clone)]
pub struct PositionRec {
    pub id: Uuid,
    pub org_node_id: Uuid,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct AssignmentRec {
    pub id: Uuid,
    pub position_id: Option<Uuid>,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub pernr: String,
    pub assignment_type: String,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct HierarchyState {
    pub tenant_id: Uuid,
    pub nodes: Vec<NodeRec>,
    /// Node slices effective at the as-of instant, keyed by node id.
    pub slices: HashMap<Uuid, NodeSliceRec>,
    pub edges: Vec<EdgeRec>,
    pub positions_catalog: Vec<PositionCatalogRec>,
    pub positions: Vec<PositionRec>,
    pub assignments: Vec<AssignmentRec>,
    /// Node ids referenced by edges or positions; used to infer missing
    /// slices when the inventory is incomplete.
    pub referenced_node_ids: HashSet<Uuid>,
    pub slice_inventory_complete: bool,
}

impl HierarchyState {
    pub fn root_ids(&self) -> Vec<Uuid> {
        self.nodes.iter().filter(|n| n.is_root).map(|n| n.id).collect()
    }
}
