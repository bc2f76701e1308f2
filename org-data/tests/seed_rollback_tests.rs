//! Seed import rollback integration tests

mod helpers;

use chrono::{Duration, Utc};
use helpers::{count_rows, create_test_db, find_import_manifest, seed_person, seed_tenant, write_seed_bundle};
use org_common::error::exit;
use org_data::import::{run_import, ImportOptions};
use org_data::rollback::{run_rollback, RollbackOptions};
use tempfile::TempDir;
use uuid::Uuid;

async fn seeded_tenant(
    pool: &sqlx::SqlitePool,
    config: &org_common::config::Config,
) -> (Uuid, TempDir) {
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
    (tenant_id, input)
}

#[tokio::test]
async fn rollback_by_manifest_restores_empty_tenant() {
    let (_guard, pool, config) = create_test_db().await;
    let (tenant_id, input) = seeded_tenant(&pool, &config).await;
    assert_eq!(count_rows(&pool, "org_nodes", tenant_id).await, 2);

    run_rollback(
        &config,
        RollbackOptions {
            tenant_id,
            manifest_path: Some(find_import_manifest(input.path())),
            since: None,
            apply: true,
            yes: true,
        },
    )
    .await
    .unwrap();

    for table in [
        "org_assignments",
        "org_positions",
        "org_edges",
        "org_node_slices",
        "org_nodes",
    ] {
        assert_eq!(count_rows(&pool, table, tenant_id).await, 0, "{table} not empty");
    }
}

#[tokio::test]
async fn rollback_dry_run_deletes_nothing() {
    let (_guard, pool, config) = create_test_db().await;
    let (tenant_id, input) = seeded_tenant(&pool, &config).await;

    run_rollback(
        &config,
        RollbackOptions {
            tenant_id,
            manifest_path: Some(find_import_manifest(input.path())),
            since: None,
            apply: false,
            yes: false,
        },
    )
    .await
    .unwrap();

    assert_eq!(count_rows(&pool, "org_nodes", tenant_id).await, 2);
}

#[tokio::test]
async fn apply_without_yes_is_refused() {
    let (_guard, pool, config) = create_test_db().await;
    let (tenant_id, input) = seeded_tenant(&pool, &config).await;

    let err = run_rollback(
        &config,
        RollbackOptions {
            tenant_id,
            manifest_path: Some(find_import_manifest(input.path())),
            since: None,
            apply: true,
            yes: false,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "refusing to rollback without --yes");
    assert_eq!(err.exit_code(), exit::SAFETY_NET);
    assert_eq!(count_rows(&pool, "org_nodes", tenant_id).await, 2);
}

#[tokio::test]
async fn manifest_and_since_are_mutually_exclusive() {
    let (_guard, pool, config) = create_test_db().await;
    let tenant_id = seed_tenant(&pool).await;

    let err = run_rollback(
        &config,
        RollbackOptions {
            tenant_id,
            manifest_path: None,
            since: None,
            apply: false,
            yes: false,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "exactly one of --manifest or --since is required"
    );
    assert_eq!(err.exit_code(), exit::USAGE);
}

#[tokio::test]
async fn manifest_tenant_mismatch_is_rejected() {
    let (_guard, pool, config) = create_test_db().await;
    let (_tenant_id, input) = seeded_tenant(&pool, &config).await;
    let other_tenant = seed_tenant(&pool).await;

    let err = run_rollback(
        &config,
        RollbackOptions {
            tenant_id: other_tenant,
            manifest_path: Some(find_import_manifest(input.path())),
            since: None,
            apply: false,
            yes: false,
        },
    )
    .await
    .unwrap_err();
    assert!(err.to_string().starts_with("manifest tenant_id mismatch: "));
}

#[tokio::test]
async fn since_rollback_removes_rows_created_after_cutoff() {
    let (_guard, pool, config) = create_test_db().await;
    let cutoff = Utc::now() - Duration::minutes(5);
    let (tenant_id, _input) = seeded_tenant(&pool, &config).await;

    run_rollback(
        &config,
        RollbackOptions {
            tenant_id,
            manifest_path: None,
            since: Some(cutoff),
            apply: true,
            yes: true,
        },
    )
    .await
    .unwrap();

    assert_eq!(count_rows(&pool, "org_nodes", tenant_id).await, 0);
    assert_eq!(count_rows(&pool, "org_assignments", tenant_id).await, 0);
}

#[tokio::test]
async fn since_rollback_refuses_when_older_rows_exist() {
    let (_guard, pool, config) = create_test_db().await;
    let (tenant_id, _input) = seeded_tenant(&pool, &config).await;

    // A node created well before the cutoff makes --since unsafe.
    sqlx::query(
        "INSERT INTO org_nodes (id, tenant_id, code, node_type, is_root, created_at)
         VALUES (?, ?, 'OLD', 'OrgUnit', 0, '2000-01-01 00:00:00')",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id.to_string())
    .execute(&pool)
    .await
    .unwrap();

    let err = run_rollback(
        &config,
        RollbackOptions {
            tenant_id,
            manifest_path: None,
            since: Some(Utc::now() - Duration::minutes(5)),
            apply: true,
            yes: true,
        },
    )
    .await
    .unwrap_err();
    assert!(err
        .to_string()
        .starts_with("refusing rollback --since: org_nodes has rows created before "));
    assert_eq!(err.exit_code(), exit::SAFETY_NET);
    assert_eq!(count_rows(&pool, "org_nodes", tenant_id).await, 3);
}
