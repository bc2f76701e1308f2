//! Shared fixtures for org-data integration tests

use std::path::Path;

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tempfile::TempDir;
use uuid::Uuid;

use org_common::config::Config;
use org_common::subject::{normalized_subject_id, SUBJECT_TYPE_PERSON};

/// Create a temporary database with the Org schema applied.
///
/// Returns (TempDir, SqlitePool, Config); the TempDir must outlive the test.
pub async fn create_test_db() -> (TempDir, SqlitePool, Config) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("org_test.db");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    let pool = SqlitePool::connect(&db_url).await.unwrap();

    for ddl in SCHEMA {
        sqlx::query(ddl).execute(&pool).await.unwrap();
    }

    let config = Config {
        database_url: db_url,
        ..Config::default()
    };
    (temp_dir, pool, config)
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE tenants (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        email TEXT NOT NULL
    )",
    "CREATE TABLE persons (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        pernr TEXT NOT NULL,
        subject_id TEXT NOT NULL
    )",
    "CREATE TABLE org_nodes (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        code TEXT NOT NULL,
        node_type TEXT NOT NULL,
        is_root INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE org_node_slices (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        org_node_id TEXT NOT NULL,
        name TEXT NOT NULL,
        i18n_names TEXT,
        status TEXT NOT NULL,
        legal_entity_id TEXT,
        company_code TEXT,
        location_id TEXT,
        display_order INTEGER NOT NULL DEFAULT 0,
        manager_user_id INTEGER,
        effective_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE org_edges (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        parent_node_id TEXT,
        child_node_id TEXT NOT NULL,
        effective_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE org_positions (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        org_node_id TEXT NOT NULL,
        code TEXT NOT NULL,
        title TEXT,
        status TEXT NOT NULL,
        is_auto_created INTEGER NOT NULL DEFAULT 0,
        effective_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE org_assignments (
        id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        position_id TEXT NOT NULL,
        subject_type TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        pernr TEXT NOT NULL,
        assignment_type TEXT NOT NULL,
        effective_date TEXT NOT NULL,
        end_date TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
];

pub async fn seed_tenant(pool: &SqlitePool) -> Uuid {
    let tenant_id = Uuid::new_v4();
    sqlx::query("INSERT INTO tenants (id, name) VALUES (?, 'test tenant')")
        .bind(tenant_id.to_string())
        .execute(pool)
        .await
        .unwrap();
    tenant_id
}

pub async fn seed_user(pool: &SqlitePool, tenant_id: Uuid, id: i64, email: &str) {
    sqlx::query("INSERT INTO users (id, tenant_id, email) VALUES (?, ?, ?)")
        .bind(id)
        .bind(tenant_id.to_string())
        .bind(email)
        .execute(pool)
        .await
        .unwrap();
}

/// Seed a person with the canonical derived subject id.
pub async fn seed_person(pool: &SqlitePool, tenant_id: Uuid, pernr: &str) -> Uuid {
    let subject_id = normalized_subject_id(tenant_id, SUBJECT_TYPE_PERSON, pernr).unwrap();
    seed_person_with_subject(pool, tenant_id, pernr, subject_id).await;
    subject_id
}

pub async fn seed_person_with_subject(
    pool: &SqlitePool,
    tenant_id: Uuid,
    pernr: &str,
    subject_id: Uuid,
) {
    sqlx::query("INSERT INTO persons (id, tenant_id, pernr, subject_id) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(tenant_id.to_string())
        .bind(pernr)
        .bind(subject_id.to_string())
        .execute(pool)
        .await
        .unwrap();
}

/// Write the standard two-node seed bundle into `dir`.
pub fn write_seed_bundle(dir: &Path) {
    std::fs::write(
        dir.join("nodes.csv"),
        "code,name,parent_code,effective_date,end_date\n\
         ROOT,Root,,2025-01-01,\n\
         OPS,Operations,ROOT,2025-01-01,\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("positions.csv"),
        "code,org_node_code,title,effective_date\n\
         P-OPS-1,OPS,Operations Lead,2025-01-01\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("assignments.csv"),
        "position_code,pernr,effective_date\n\
         P-OPS-1,1001,2025-01-01\n",
    )
    .unwrap();
}

pub async fn count_rows(pool: &SqlitePool, table: &str, tenant_id: Uuid) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE tenant_id = ?");
    sqlx::query_scalar(&sql)
        .bind(tenant_id.to_string())
        .fetch_one(pool)
        .await
        .unwrap()
}

pub fn as_of(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Find the single import manifest written into `dir`.
pub fn find_import_manifest(dir: &Path) -> std::path::PathBuf {
    let mut matches: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("import_manifest_") && n.ends_with(".json"))
        })
        .collect();
    assert_eq!(matches.len(), 1, "expected exactly one import manifest in {dir:?}");
    matches.pop().unwrap()
}
