//! CSV export integration tests

mod helpers;

use helpers::{as_of, count_rows, create_test_db, seed_person, seed_tenant, write_seed_bundle};
use org_data::export::{run_export, ExportOptions};
use org_data::import::{run_import, ImportOptions};
use tempfile::TempDir;
use uuid::Uuid;

async fn imported_tenant(
    pool: &sqlx::SqlitePool,
    config: &org_common::config::Config,
) -> Uuid {
    let tenant_id = seed_tenant(pool).await;
    seed_person(pool, tenant_id, "1001").await;
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
    tenant_id
}

fn read_csv(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn export_writes_all_three_files() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = imported_tenant(&pool, &config).await;

    let out = TempDir::new().unwrap();
    run_export(
        &config,
        ExportOptions {
            tenant_id,
            output_dir: out.path().to_path_buf(),
            as_of: None,
        },
    )
    .await
    .unwrap();

    let nodes = read_csv(&out.path().join("nodes.csv"));
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0][0], "code");
    // Rows ordered by code: OPS before ROOT.
    assert_eq!(nodes[1][0], "OPS");
    assert_eq!(nodes[2][0], "ROOT");
    let parent_idx = nodes[0].iter().position(|h| h == "parent_code").unwrap();
    assert_eq!(nodes[1][parent_idx], "ROOT");
    assert_eq!(nodes[2][parent_idx], "");
    let end_idx = nodes[0].iter().position(|h| h == "end_date").unwrap();
    assert_eq!(nodes[1][end_idx], "", "open-ended slice must export empty end_date");

    let positions = read_csv(&out.path().join("positions.csv"));
    assert_eq!(positions.len(), 2);
    assert_eq!(positions[1][0], "P-OPS-1");
    assert_eq!(positions[1][1], "OPS");

    let assignments = read_csv(&out.path().join("assignments.csv"));
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[1][0], "P-OPS-1");
    assert_eq!(assignments[1][2], "1001");
}

#[tokio::test]
async fn as_of_filter_excludes_future_slices() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = imported_tenant(&pool, &config).await;

    let out = TempDir::new().unwrap();
    run_export(
        &config,
        ExportOptions {
            tenant_id,
            output_dir: out.path().to_path_buf(),
            as_of: Some(as_of(2024, 12, 31)),
        },
    )
    .await
    .unwrap();

    // Everything starts 2025-01-01, so the day before yields headers only.
    assert_eq!(read_csv(&out.path().join("nodes.csv")).len(), 1);
    assert_eq!(read_csv(&out.path().join("positions.csv")).len(), 1);
    assert_eq!(read_csv(&out.path().join("assignments.csv")).len(), 1);
}

#[tokio::test]
async fn export_output_seeds_a_fresh_tenant() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = imported_tenant(&pool, &config).await;

    let out = TempDir::new().unwrap();
    run_export(
        &config,
        ExportOptions {
            tenant_id,
            output_dir: out.path().to_path_buf(),
            as_of: None,
        },
    )
    .await
    .unwrap();

    // The exported assignments carry the first tenant's subject ids, so the
    // target tenant's persons row must agree with them.
    let exported_subject =
        org_common::subject::normalized_subject_id(tenant_id, org_common::subject::SUBJECT_TYPE_PERSON, "1001")
            .unwrap();
    let second_tenant = seed_tenant(&pool).await;
    helpers::seed_person_with_subject(&pool, second_tenant, "1001", exported_subject).await;
    run_import(
        &config,
        ImportOptions {
            tenant_id: second_tenant,
            input_dir: out.path().to_path_buf(),
            output_dir: out.path().to_path_buf(),
            apply: true,
            skip_assignments: false,
            strict: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(count_rows(&pool, "org_nodes", second_tenant).await, 2);
    assert_eq!(count_rows(&pool, "org_positions", second_tenant).await, 1);
    assert_eq!(count_rows(&pool, "org_assignments", second_tenant).await, 1);
}

#[tokio::test]
async fn export_rejects_unknown_tenant() {
    let (_guard, _pool, config) = create_test_db().await;
    let out = TempDir::new().unwrap();
    let tenant_id = Uuid::new_v4();
    let err = run_export(
        &config,
        ExportOptions {
            tenant_id,
            output_dir: out.path().to_path_buf(),
            as_of: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), format!("unknown tenant: {tenant_id}"));
}
