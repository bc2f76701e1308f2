//! Rule evaluation over a materialized hierarchy state
//!
//! The eight rules are pure functions of `HierarchyState`, so both backends
//! share one evaluator and a snapshot captured from either can be replayed
//! offline.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use uuid::Uuid;

use org_common::docs::{
    Autofix, EffectiveWindow, EntityRef, EntityType, FixKind, Issue, RuleId, Severity,
};
use org_common::subject::normalized_subject_id;

use super::state::{EdgeRec, HierarchyState};

pub static NODE_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9][A-Z0-9_-]{0,63}$").unwrap_or_else(|e| panic!("node code regex: {e}"))
});
pub static POSITION_CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z0-9][A-Z0-9_-]{0,63}$").unwrap_or_else(|e| panic!("position code regex: {e}"))
});
pub static AUTO_POSITION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^AUTO-[0-9A-F]{16}$").unwrap_or_else(|e| panic!("auto position regex: {e}"))
});

fn issue(
    rule_id: RuleId,
    severity: Severity,
    entity_type: EntityType,
    id: Uuid,
    message: impl Into<String>,
) -> Issue {
    Issue {
        issue_id: Uuid::new_v4(),
        rule_id,
        severity,
        entity: EntityRef { entity_type, id },
        effective_window: None,
        message: message.into(),
        details: BTreeMap::new(),
        autofix: None,
    }
}

pub fn evaluate(state: &HierarchyState) -> Vec<Issue> {
    let mut issues = Vec::new();

    check_node_code_format(state, &mut issues);
    check_position_code_format(state, &mut issues);

    let edge_by_child: HashMap<Uuid, &EdgeRec> =
        state.edges.iter().map(|e| (e.child_node_id, e)).collect();
    let root_ids = state.root_ids();

    check_root_invariants(state, &edge_by_child, &root_ids, &mut issues);
    check_missing_slices(state, &mut issues);
    check_missing_edges(state, &edge_by_child, &mut issues);
    check_orphan_null_parents(state, &root_ids, &mut issues);
    check_leaf_positions(state, &mut issues);
    check_assignment_subjects(state, &mut issues);

    issues
}

fn check_node_code_format(state: &HierarchyState, issues: &mut Vec<Issue>) {
    for n in &state.nodes {
        if NODE_CODE_REGEX.is_match(&n.code) {
            continue;
        }
        let mut iss = issue(
            RuleId::NodeCodeFormat,
            Severity::Warning,
            EntityType::OrgNode,
            n.id,
            "node code does not match required format",
        );
        iss.details.insert("code".into(), json!(n.code));
        iss.details
            .insert("regex".into(), json!(NODE_CODE_REGEX.as_str()));
        issues.push(iss);
    }
}

fn check_position_code_format(state: &HierarchyState, issues: &mut Vec<Issue>) {
    for p in &state.positions_catalog {
        let ok = if p.is_auto_created {
            AUTO_POSITION_REGEX.is_match(&p.code)
        } else {
            POSITION_CODE_REGEX.is_match(&p.code)
        };
        if ok {
            continue;
        }
        let mut iss = issue(
            RuleId::PositionCodeFormat,
            Severity::Warning,
            EntityType::OrgPosition,
            p.id,
            "position code does not match required format",
        );
        iss.details.insert("code".into(), json!(p.code));
        iss.details
            .insert("is_auto_created".into(), json!(p.is_auto_created));
        iss.details
            .insert("regex_auto".into(), json!(AUTO_POSITION_REGEX.as_str()));
        iss.details
            .insert("regex_general".into(), json!(POSITION_CODE_REGEX.as_str()));
        issues.push(iss);
    }
}

fn check_root_invariants(
    state: &HierarchyState,
    edge_by_child: &HashMap<Uuid, &EdgeRec>,
    root_ids: &[Uuid],
    issues: &mut Vec<Issue>,
) {
    if root_ids.len() != 1 {
        let message = if state.slice_inventory_complete {
            "root node count must be exactly 1"
        } else {
            "root node count must be exactly 1 (as-of snapshot)"
        };
        let mut iss = issue(
            RuleId::RootInvariants,
            Severity::Error,
            EntityType::Tenant,
            state.tenant_id,
            message,
        );
        iss.details.insert("root_count".into(), json!(root_ids.len()));
        issues.push(iss);
        return;
    }

    let root_id = root_ids[0];
    if !state.slices.contains_key(&root_id) && state.slice_inventory_complete {
        issues.push(issue(
            RuleId::RootInvariants,
            Severity::Error,
            EntityType::OrgNode,
            root_id,
            "root node is missing node slice at as-of",
        ));
    }
    match edge_by_child.get(&root_id) {
        None => {
            issues.push(issue(
                RuleId::RootInvariants,
                Severity::Error,
                EntityType::OrgNode,
                root_id,
                "root node is missing edge slice at as-of",
            ));
        }
        Some(edge) => {
            if let Some(parent) = edge.parent_node_id {
                let mut iss = issue(
                    RuleId::RootInvariants,
                    Severity::Error,
                    EntityType::OrgEdge,
                    edge.id,
                    "root edge must have parent_node_id=null",
                );
                iss.details
                    .insert("child_node_id".into(), json!(edge.child_node_id.to_string()));
                iss.details
                    .insert("parent_node_id".into(), json!(parent.to_string()));
                issues.push(iss);
            }
        }
    }
}

fn check_missing_slices(state: &HierarchyState, issues: &mut Vec<Issue>) {
    if state.slice_inventory_complete {
        for n in &state.nodes {
            if state.slices.contains_key(&n.id) {
                continue;
            }
            issues.push(issue(
                RuleId::NodeMissingSliceAsOf,
                Severity::Error,
                EntityType::OrgNode,
                n.id,
                "node is missing node slice at as-of",
            ));
        }
        return;
    }

    // The snapshot only contains effective entities, so absence can only be
    // inferred for nodes something else points at.
    let known: HashMap<Uuid, ()> = state.nodes.iter().map(|n| (n.id, ())).collect();
    let mut missing: Vec<Uuid> = state
        .referenced_node_ids
        .iter()
        .filter(|id| !known.contains_key(id))
        .copied()
        .collect();
    missing.sort();
    for id in missing {
        issues.push(issue(
            RuleId::NodeMissingSliceAsOf,
            Severity::Error,
            EntityType::OrgNode,
            id,
            "node is missing node slice at as-of (inferred from snapshot references)",
        ));
    }
}

fn check_missing_edges(
    state: &HierarchyState,
    edge_by_child: &HashMap<Uuid, &EdgeRec>,
    issues: &mut Vec<Issue>,
) {
    for n in &state.nodes {
        if n.is_root || edge_by_child.contains_key(&n.id) {
            continue;
        }
        issues.push(issue(
            RuleId::NodeMissingEdgeAsOf,
            Severity::Error,
            EntityType::OrgNode,
            n.id,
            "non-root node is missing edge slice at as-of",
        ));
    }
}

fn check_orphan_null_parents(state: &HierarchyState, root_ids: &[Uuid], issues: &mut Vec<Issue>) {
    for e in &state.edges {
        if e.parent_node_id.is_some() || root_ids.contains(&e.child_node_id) {
            continue;
        }
        let mut iss = issue(
            RuleId::EdgeParentNullForNonRoot,
            Severity::Error,
            EntityType::OrgEdge,
            e.id,
            "edge has parent_node_id=null but child is not root",
        );
        iss.details
            .insert("child_node_id".into(), json!(e.child_node_id.to_string()));
        issues.push(iss);
    }
}

fn check_leaf_positions(state: &HierarchyState, issues: &mut Vec<Issue>) {
    let mut children_by_parent: HashMap<Uuid, usize> = HashMap::new();
    for e in &state.edges {
        if let Some(parent) = e.parent_node_id {
            *children_by_parent.entry(parent).or_default() += 1;
        }
    }
    let mut active_positions_by_node: HashMap<Uuid, usize> = HashMap::new();
    for p in &state.positions {
        if p.status == "active" {
            *active_positions_by_node.entry(p.org_node_id).or_default() += 1;
        }
    }

    for n in &state.nodes {
        let slice = match state.slices.get(&n.id) {
            Some(s) => s,
            None => continue,
        };
        if slice.status.trim() != "active" {
            continue;
        }
        if children_by_parent.get(&n.id).copied().unwrap_or(0) > 0 {
            continue;
        }
        if active_positions_by_node.get(&n.id).copied().unwrap_or(0) > 0 {
            continue;
        }
        let mut iss = issue(
            RuleId::LeafRequiresPositionAsOf,
            Severity::Warning,
            EntityType::OrgNode,
            n.id,
            "leaf active node requires at least one active position at as-of",
        );
        iss.effective_window = Some(EffectiveWindow {
            effective_date: slice.effective_date,
            end_date: slice.end_date,
        });
        issues.push(iss);
    }
}

fn check_assignment_subjects(state: &HierarchyState, issues: &mut Vec<Issue>) {
    for a in &state.assignments {
        let pernr_trim = a.pernr.trim();
        let window = EffectiveWindow {
            effective_date: a.effective_date,
            end_date: a.end_date,
        };

        let expected = match normalized_subject_id(state.tenant_id, &a.subject_type, pernr_trim) {
            Ok(id) => id,
            Err(e) => {
                let mut iss = issue(
                    RuleId::AssignmentSubjectMapping,
                    Severity::Error,
                    EntityType::OrgAssignment,
                    a.id,
                    "subject_id mapping failed",
                );
                iss.effective_window = Some(window);
                iss.details.insert("pernr".into(), json!(a.pernr));
                iss.details.insert("err".into(), json!(e.to_string()));
                issues.push(iss);
                continue;
            }
        };
        if a.subject_id == expected && a.pernr == pernr_trim {
            continue;
        }

        let mut iss = issue(
            RuleId::AssignmentSubjectMapping,
            Severity::Error,
            EntityType::OrgAssignment,
            a.id,
            "subject_id mismatch with SSOT mapping",
        );
        iss.effective_window = Some(window);
        iss.details.insert("pernr".into(), json!(a.pernr));
        iss.details.insert("pernr_trim".into(), json!(pernr_trim));
        iss.details
            .insert("expected_subject_id".into(), json!(expected.to_string()));
        iss.details
            .insert("actual_subject_id".into(), json!(a.subject_id.to_string()));
        iss.details.insert(
            "position_id".into(),
            json!(a.position_id.unwrap_or_else(Uuid::nil).to_string()),
        );
        iss.details
            .insert("assignment_type".into(), json!(a.assignment_type));
        if a.assignment_type == "primary" && a.position_id.is_some() {
            iss.autofix = Some(Autofix::low_risk(FixKind::AssignmentCorrect));
        }
        issues.push(iss);
    }
}
