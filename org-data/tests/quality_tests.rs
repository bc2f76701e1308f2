//! Quality check integration tests against the db backend

mod helpers;

use helpers::{as_of, create_test_db, seed_person, seed_person_with_subject, seed_tenant, write_seed_bundle};
use org_common::api::SnapshotItem;
use org_common::docs::{sort_issues, FixKind, RuleId, Severity};
use org_common::subject::{normalized_subject_id, SUBJECT_TYPE_PERSON};
use org_data::fixes::generate_fix_plan;
use org_data::import::{run_import, ImportOptions};
use org_data::quality::{evaluate, state_from_db, state_from_snapshot};
use serde_json::json;
use tempfile::TempDir;
use uuid::Uuid;

async fn import_bundle(
    pool: &sqlx::SqlitePool,
    config: &org_common::config::Config,
    tenant_id: Uuid,
) {
    let input = TempDir::new().unwrap();
    write_seed_bundle(input.path());
    run_import(
        config,
        ImportOptions {
            tenant_id,
            input_dir: input.path().to_path_buf(),
            output_dir: input.path().to_path_buf(),
            apply: true,
            skip_assignments: false,
            strict: false,
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn clean_seed_produces_no_issues() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = seed_tenant(&pool).await;
    seed_person(&pool, tenant_id, "1001").await;
    import_bundle(&pool, &config, tenant_id).await;

    let state = state_from_db(&pool, tenant_id, as_of(2025, 6, 1)).await.unwrap();
    let issues = evaluate(&state);
    assert!(issues.is_empty(), "unexpected issues: {issues:?}");
}

#[tokio::test]
async fn mismatched_subject_id_is_flagged_with_autofix() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = seed_tenant(&pool).await;
    // Person carries a legacy random subject id instead of the derived one.
    let legacy = Uuid::new_v4();
    seed_person_with_subject(&pool, tenant_id, "1001", legacy).await;
    import_bundle(&pool, &config, tenant_id).await;

    let state = state_from_db(&pool, tenant_id, as_of(2025, 6, 1)).await.unwrap();
    let mut issues = evaluate(&state);
    sort_issues(&mut issues);

    assert_eq!(issues.len(), 1);
    let issue = &issues[0];
    assert_eq!(issue.rule_id, RuleId::AssignmentSubjectMapping);
    assert_eq!(issue.severity, Severity::Error);
    assert_eq!(issue.message, "subject_id mismatch with SSOT mapping");

    let expected = normalized_subject_id(tenant_id, SUBJECT_TYPE_PERSON, "1001").unwrap();
    assert_eq!(
        issue.details.get("expected_subject_id"),
        Some(&json!(expected))
    );
    assert_eq!(issue.details.get("actual_subject_id"), Some(&json!(legacy)));
    let autofix = issue.autofix.as_ref().expect("autofix");
    assert!(autofix.supported);
    assert_eq!(autofix.fix_kind, FixKind::AssignmentCorrect);
}

#[tokio::test]
async fn fix_plan_is_generated_from_mismatch_report() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = seed_tenant(&pool).await;
    seed_person_with_subject(&pool, tenant_id, "1001", Uuid::new_v4()).await;
    import_bundle(&pool, &config, tenant_id).await;

    let opts = org_data::quality::QualityCheckOptions {
        tenant_id,
        as_of: as_of(2025, 6, 1),
        backend: org_data::quality::QualityBackend::Db,
        output_dir: std::env::temp_dir(),
        base_url: None,
        auth_token: String::new(),
        max_issues: 0,
    };
    let report = org_data::quality::check::build_report(&config, &opts).await.unwrap();
    assert_eq!(report.summary.errors, 1);

    let plan = generate_fix_plan(&report, 100).unwrap();
    assert_eq!(plan.batch_request.commands.len(), 1);
    let expected = normalized_subject_id(tenant_id, SUBJECT_TYPE_PERSON, "1001").unwrap();
    assert_eq!(
        plan.batch_request.commands[0].payload["subject_id"],
        json!(expected)
    );
    assert_eq!(plan.batch_request.commands[0].payload["pernr"], json!("1001"));
}

#[tokio::test]
async fn node_without_active_edge_is_flagged() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = seed_tenant(&pool).await;
    seed_person(&pool, tenant_id, "1001").await;
    import_bundle(&pool, &config, tenant_id).await;

    // Cut the OPS edge so the node dangles at the probe date.
    sqlx::query("DELETE FROM org_edges WHERE tenant_id = ? AND parent_node_id IS NOT NULL")
        .bind(tenant_id.to_string())
        .execute(&pool)
        .await
        .unwrap();

    let state = state_from_db(&pool, tenant_id, as_of(2025, 6, 1)).await.unwrap();
    let issues = evaluate(&state);
    assert!(issues
        .iter()
        .any(|i| i.rule_id == RuleId::NodeMissingEdgeAsOf),
        "missing-edge issue not raised: {issues:?}");
}

#[tokio::test]
async fn db_and_snapshot_backends_agree_on_equivalent_state() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = seed_tenant(&pool).await;
    // A legacy subject id guarantees the issue sets are non-empty.
    seed_person_with_subject(&pool, tenant_id, "1001", Uuid::new_v4()).await;
    import_bundle(&pool, &config, tenant_id).await;

    let db_state = state_from_db(&pool, tenant_id, as_of(2025, 6, 1)).await.unwrap();

    // Rebuild the same tenant as snapshot items, entity by entity.
    let mut items = Vec::new();
    for n in &db_state.nodes {
        let slice = &db_state.slices[&n.id];
        items.push(SnapshotItem {
            entity_type: "org_node".to_string(),
            entity_id: n.id,
            new_values: json!({
                "org_node_id": n.id,
                "is_root": n.is_root,
                "code": n.code,
                "status": slice.status,
                "effective_date": slice.effective_date,
                "end_date": slice.end_date,
            }),
        });
    }
    for e in &db_state.edges {
        items.push(SnapshotItem {
            entity_type: "org_edge".to_string(),
            entity_id: e.id,
            new_values: json!({
                "edge_id": e.id,
                "parent_node_id": e.parent_node_id,
                "child_node_id": e.child_node_id,
            }),
        });
    }
    for p in &db_state.positions {
        let cat = db_state
            .positions_catalog
            .iter()
            .find(|c| c.id == p.id)
            .expect("catalog entry");
        items.push(SnapshotItem {
            entity_type: "org_position".to_string(),
            entity_id: p.id,
            new_values: json!({
                "org_position_id": p.id,
                "org_node_id": p.org_node_id,
                "code": cat.code,
                "status": p.status,
                "is_auto_created": cat.is_auto_created,
            }),
        });
    }
    for a in &db_state.assignments {
        items.push(SnapshotItem {
            entity_type: "org_assignment".to_string(),
            entity_id: a.id,
            new_values: json!({
                "org_assignment_id": a.id,
                "position_id": a.position_id.unwrap_or_else(Uuid::nil),
                "subject_type": a.subject_type,
                "subject_id": a.subject_id,
                "pernr": a.pernr,
                "assignment_type": a.assignment_type,
                "effective_date": a.effective_date,
                "end_date": a.end_date,
            }),
        });
    }
    let snapshot_state = state_from_snapshot(tenant_id, &items).unwrap();

    let mut from_db = evaluate(&db_state);
    let mut from_snapshot = evaluate(&snapshot_state);
    sort_issues(&mut from_db);
    sort_issues(&mut from_snapshot);
    for issue in from_db.iter_mut().chain(from_snapshot.iter_mut()) {
        issue.issue_id = Uuid::nil();
    }

    assert_eq!(from_db.len(), 1);
    assert_eq!(from_db[0].rule_id, RuleId::AssignmentSubjectMapping);
    assert_eq!(from_db, from_snapshot);
}

fn snapshot_node(id: Uuid, code: &str, is_root: bool) -> SnapshotItem {
    SnapshotItem {
        entity_type: "org_node".to_string(),
        entity_id: id,
        new_values: json!({
            "org_node_id": id,
            "is_root": is_root,
            "code": code,
            "status": "active",
            "effective_date": "2025-01-01",
            "end_date": "9999-12-31",
        }),
    }
}

#[test]
fn snapshot_state_marks_root_count_as_snapshot_scoped() {
    let tenant_id = Uuid::new_v4();
    let items = vec![
        snapshot_node(Uuid::new_v4(), "A", true),
        snapshot_node(Uuid::new_v4(), "B", true),
    ];
    let state = state_from_snapshot(tenant_id, &items).unwrap();
    assert!(!state.slice_inventory_complete);

    let issues = evaluate(&state);
    let root_issue = issues
        .iter()
        .find(|i| i.rule_id == RuleId::RootInvariants)
        .expect("root invariant issue");
    assert!(
        root_issue.message.ends_with("(as-of snapshot)"),
        "message: {}",
        root_issue.message
    );
}

#[test]
fn snapshot_missing_slice_inference_uses_referenced_nodes() {
    let tenant_id = Uuid::new_v4();
    let root = Uuid::new_v4();
    let orphan_child = Uuid::new_v4();
    let mut items = vec![snapshot_node(root, "ROOT", true)];
    // An edge references a child node that has no slice in the snapshot.
    items.push(SnapshotItem {
        entity_type: "org_edge".to_string(),
        entity_id: Uuid::new_v4(),
        new_values: json!({
            "edge_id": Uuid::new_v4(),
            "parent_node_id": root,
            "child_node_id": orphan_child,
        }),
    });

    let state = state_from_snapshot(tenant_id, &items).unwrap();
    let issues = evaluate(&state);
    let missing = issues
        .iter()
        .find(|i| i.rule_id == RuleId::NodeMissingSliceAsOf)
        .expect("missing slice issue");
    assert!(missing.message.contains("(inferred from snapshot references)"));
    assert_eq!(missing.entity.id, orphan_child);
}
