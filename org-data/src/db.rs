//! SQLite access for the org-data tool
//!
//! All identifiers are stored as TEXT; dates are ISO-8601 TEXT, so the
//! as-of predicate `effective_date <= ? AND end_date > ?` compares
//! correctly under SQLite's lexicographic ordering.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use org_common::error::{Error, Result};

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    Ok(pool)
}

pub async fn tenant_exists(pool: &SqlitePool, tenant_id: Uuid) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenants WHERE id = ?)")
            .bind(tenant_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

pub async fn persons_table_exists(pool: &SqlitePool) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'persons')",
    )
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn tenant_has_org_nodes(pool: &SqlitePool, tenant_id: Uuid) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM org_nodes WHERE tenant_id = ?)")
            .bind(tenant_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

/// Case-insensitive lookup of a tenant's user id by email.
pub async fn user_id_by_email(
    pool: &SqlitePool,
    tenant_id: Uuid,
    email: &str,
) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM users WHERE tenant_id = ? AND lower(email) = lower(?)",
    )
    .bind(tenant_id.to_string())
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

pub async fn user_exists(pool: &SqlitePool, tenant_id: Uuid, user_id: i64) -> Result<bool> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE tenant_id = ? AND id = ?)")
            .bind(tenant_id.to_string())
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(exists)
}

pub async fn person_subject_id(
    pool: &SqlitePool,
    tenant_id: Uuid,
    pernr: &str,
) -> Result<Option<Uuid>> {
    let raw: Option<String> =
        sqlx::query_scalar("SELECT subject_id FROM persons WHERE tenant_id = ? AND pernr = ?")
            .bind(tenant_id.to_string())
            .bind(pernr)
            .fetch_optional(pool)
            .await?;
    match raw {
        None => Ok(None),
        Some(s) => Uuid::parse_str(&s)
            .map(Some)
            .map_err(|e| Error::validation(format!("persons.subject_id for pernr={pernr}: {e}"))),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OrgNodeRow {
    pub id: String,
    pub code: String,
    pub is_root: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NodeSliceRow {
    pub id: String,
    pub org_node_id: String,
    pub status: String,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EdgeRow {
    pub id: String,
    pub parent_node_id: Option<String>,
    pub child_node_id: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionCatalogRow {
    pub id: String,
    pub code: String,
    pub is_auto_created: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PositionRow {
    pub id: String,
    pub org_node_id: String,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignmentRow {
    pub id: String,
    pub position_id: Option<String>,
    pub subject_type: String,
    pub subject_id: String,
    pub pernr: String,
    pub assignment_type: String,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub async fn list_org_nodes(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<OrgNodeRow>> {
    let rows = sqlx::query_as::<_, OrgNodeRow>(
        "SELECT id, code, is_root FROM org_nodes WHERE tenant_id = ? ORDER BY code",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn node_slices_as_of(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<NodeSliceRow>> {
    let rows = sqlx::query_as::<_, NodeSliceRow>(
        "SELECT id, org_node_id, status, effective_date, end_date
         FROM org_node_slices
         WHERE tenant_id = ? AND effective_date <= ? AND end_date > ?",
    )
    .bind(tenant_id.to_string())
    .bind(as_of)
    .bind(as_of)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn edges_as_of(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<EdgeRow>> {
    let rows = sqlx::query_as::<_, EdgeRow>(
        "SELECT id, parent_node_id, child_node_id
         FROM org_edges
         WHERE tenant_id = ? AND effective_date <= ? AND end_date > ?",
    )
    .bind(tenant_id.to_string())
    .bind(as_of)
    .bind(as_of)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_org_positions(
    pool: &SqlitePool,
    tenant_id: Uuid,
) -> Result<Vec<PositionCatalogRow>> {
    let rows = sqlx::query_as::<_, PositionCatalogRow>(
        "SELECT id, code, is_auto_created FROM org_positions WHERE tenant_id = ? ORDER BY code",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn positions_as_of(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<PositionRow>> {
    let rows = sqlx::query_as::<_, PositionRow>(
        "SELECT id, org_node_id, status
         FROM org_positions
         WHERE tenant_id = ? AND effective_date <= ? AND end_date > ?",
    )
    .bind(tenant_id.to_string())
    .bind(as_of)
    .bind(as_of)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn assignments_as_of(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: NaiveDate,
) -> Result<Vec<AssignmentRow>> {
    let rows = sqlx::query_as::<_, AssignmentRow>(
        "SELECT id, position_id, subject_type, subject_id, pernr, assignment_type,
                effective_date, end_date
         FROM org_assignments
         WHERE tenant_id = ? AND effective_date <= ? AND end_date > ?",
    )
    .bind(tenant_id.to_string())
    .bind(as_of)
    .bind(as_of)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignmentBeforeRow {
    pub pernr: String,
    pub subject_id: String,
    pub position_id: Option<String>,
}

pub async fn assignment_before(
    pool: &SqlitePool,
    assignment_id: Uuid,
) -> Result<Option<AssignmentBeforeRow>> {
    let row = sqlx::query_as::<_, AssignmentBeforeRow>(
        "SELECT pernr, subject_id, position_id FROM org_assignments WHERE id = ?",
    )
    .bind(assignment_id.to_string())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// Seed import inserts (called inside a single transaction)
// ---------------------------------------------------------------------------

pub struct NewOrgNode<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: &'a str,
    pub node_type: &'a str,
    pub is_root: bool,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_org_node(conn: &mut SqliteConnection, n: &NewOrgNode<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO org_nodes (id, tenant_id, code, node_type, is_root, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(n.id.to_string())
    .bind(n.tenant_id.to_string())
    .bind(n.code)
    .bind(n.node_type)
    .bind(n.is_root)
    .bind(n.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub struct NewNodeSlice<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub org_node_id: Uuid,
    pub name: &'a str,
    pub i18n_names: Option<&'a serde_json::Value>,
    pub status: &'a str,
    pub legal_entity_id: Option<Uuid>,
    pub company_code: Option<&'a str>,
    pub location_id: Option<Uuid>,
    pub display_order: i64,
    pub manager_user_id: Option<i64>,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_node_slice(conn: &mut SqliteConnection, s: &NewNodeSlice<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO org_node_slices (id, tenant_id, org_node_id, name, i18n_names, status,
             legal_entity_id, company_code, location_id, display_order, manager_user_id,
             effective_date, end_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(s.id.to_string())
    .bind(s.tenant_id.to_string())
    .bind(s.org_node_id.to_string())
    .bind(s.name)
    .bind(s.i18n_names.map(|v| v.to_string()))
    .bind(s.status)
    .bind(s.legal_entity_id.map(|u| u.to_string()))
    .bind(s.company_code)
    .bind(s.location_id.map(|u| u.to_string()))
    .bind(s.display_order)
    .bind(s.manager_user_id)
    .bind(s.effective_date)
    .bind(s.end_date)
    .bind(s.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub struct NewEdge {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub parent_node_id: Option<Uuid>,
    pub child_node_id: Uuid,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_edge(conn: &mut SqliteConnection, e: &NewEdge) -> Result<()> {
    sqlx::query(
        "INSERT INTO org_edges (id, tenant_id, parent_node_id, child_node_id,
             effective_date, end_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(e.id.to_string())
    .bind(e.tenant_id.to_string())
    .bind(e.parent_node_id.map(|u| u.to_string()))
    .bind(e.child_node_id.to_string())
    .bind(e.effective_date)
    .bind(e.end_date)
    .bind(e.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub struct NewPosition<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub org_node_id: Uuid,
    pub code: &'a str,
    pub title: Option<&'a str>,
    pub status: &'a str,
    pub is_auto_created: bool,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_position(conn: &mut SqliteConnection, p: &NewPosition<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO org_positions (id, tenant_id, org_node_id, code, title, status,
             is_auto_created, effective_date, end_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(p.id.to_string())
    .bind(p.tenant_id.to_string())
    .bind(p.org_node_id.to_string())
    .bind(p.code)
    .bind(p.title)
    .bind(p.status)
    .bind(p.is_auto_created)
    .bind(p.effective_date)
    .bind(p.end_date)
    .bind(p.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

pub struct NewAssignment<'a> {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub position_id: Uuid,
    pub subject_type: &'a str,
    pub subject_id: Uuid,
    pub pernr: &'a str,
    pub assignment_type: &'a str,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_assignment(conn: &mut SqliteConnection, a: &NewAssignment<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO org_assignments (id, tenant_id, position_id, subject_type, subject_id,
             pernr, assignment_type, effective_date, end_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(a.id.to_string())
    .bind(a.tenant_id.to_string())
    .bind(a.position_id.to_string())
    .bind(a.subject_type)
    .bind(a.subject_id.to_string())
    .bind(a.pernr)
    .bind(a.assignment_type)
    .bind(a.effective_date)
    .bind(a.end_date)
    .bind(a.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Seed rollback deletes (called inside a single transaction)
// ---------------------------------------------------------------------------

/// Deletes rows by id from one table; returns the number removed.
pub async fn delete_by_ids(
    conn: &mut SqliteConnection,
    table: &str,
    tenant_id: Uuid,
    ids: &[Uuid],
) -> Result<u64> {
    let sql = match table {
        "org_assignments" => "DELETE FROM org_assignments WHERE tenant_id = ? AND id = ?",
        "org_positions" => "DELETE FROM org_positions WHERE tenant_id = ? AND id = ?",
        "org_edges" => "DELETE FROM org_edges WHERE tenant_id = ? AND id = ?",
        "org_node_slices" => "DELETE FROM org_node_slices WHERE tenant_id = ? AND id = ?",
        "org_nodes" => "DELETE FROM org_nodes WHERE tenant_id = ? AND id = ?",
        other => return Err(Error::validation(format!("unknown table: {other}"))),
    };
    let mut removed = 0;
    for id in ids {
        let res = sqlx::query(sql)
            .bind(tenant_id.to_string())
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;
        removed += res.rows_affected();
    }
    Ok(removed)
}

/// True when the tenant has org_nodes rows created before the cutoff.
pub async fn has_org_nodes_before(
    pool: &SqlitePool,
    tenant_id: Uuid,
    since: DateTime<Utc>,
) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM org_nodes WHERE tenant_id = ? AND created_at < ?)",
    )
    .bind(tenant_id.to_string())
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn delete_created_since(
    conn: &mut SqliteConnection,
    table: &str,
    tenant_id: Uuid,
    since: DateTime<Utc>,
) -> Result<u64> {
    let sql = match table {
        "org_assignments" => "DELETE FROM org_assignments WHERE tenant_id = ? AND created_at >= ?",
        "org_positions" => "DELETE FROM org_positions WHERE tenant_id = ? AND created_at >= ?",
        "org_edges" => "DELETE FROM org_edges WHERE tenant_id = ? AND created_at >= ?",
        "org_node_slices" => "DELETE FROM org_node_slices WHERE tenant_id = ? AND created_at >= ?",
        "org_nodes" => "DELETE FROM org_nodes WHERE tenant_id = ? AND created_at >= ?",
        other => return Err(Error::validation(format!("unknown table: {other}"))),
    };
    let res = sqlx::query(sql)
        .bind(tenant_id.to_string())
        .bind(since)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Export reads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportNodeRow {
    pub code: String,
    pub node_type: String,
    pub name: String,
    pub i18n_names: Option<String>,
    pub status: String,
    pub legal_entity_id: Option<String>,
    pub company_code: Option<String>,
    pub location_id: Option<String>,
    pub display_order: i64,
    pub parent_code: Option<String>,
    pub manager_user_id: Option<i64>,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub async fn export_nodes(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Vec<ExportNodeRow>> {
    let base = "SELECT n.code, n.node_type, s.name, s.i18n_names, s.status, s.legal_entity_id,
                       s.company_code, s.location_id, s.display_order,
                       pn.code AS parent_code, s.manager_user_id, s.effective_date, s.end_date
                FROM org_node_slices s
                JOIN org_nodes n ON n.id = s.org_node_id
                LEFT JOIN org_edges e ON e.child_node_id = n.id
                     AND e.effective_date <= s.effective_date AND e.end_date > s.effective_date
                LEFT JOIN org_nodes pn ON pn.id = e.parent_node_id
                WHERE s.tenant_id = ?";
    let rows = match as_of {
        Some(t) => {
            let sql = format!(
                "{base} AND s.effective_date <= ? AND s.end_date > ? ORDER BY n.code, s.effective_date"
            );
            sqlx::query_as::<_, ExportNodeRow>(&sql)
                .bind(tenant_id.to_string())
                .bind(t)
                .bind(t)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{base} ORDER BY n.code, s.effective_date");
            sqlx::query_as::<_, ExportNodeRow>(&sql)
                .bind(tenant_id.to_string())
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportPositionRow {
    pub code: String,
    pub org_node_code: String,
    pub title: Option<String>,
    pub status: String,
    pub is_auto_created: bool,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub async fn export_positions(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Vec<ExportPositionRow>> {
    let base = "SELECT p.code, n.code AS org_node_code, p.title, p.status, p.is_auto_created,
                       p.effective_date, p.end_date
                FROM org_positions p
                JOIN org_nodes n ON n.id = p.org_node_id
                WHERE p.tenant_id = ?";
    let rows = match as_of {
        Some(t) => {
            let sql = format!(
                "{base} AND p.effective_date <= ? AND p.end_date > ? ORDER BY p.code, p.effective_date"
            );
            sqlx::query_as::<_, ExportPositionRow>(&sql)
                .bind(tenant_id.to_string())
                .bind(t)
                .bind(t)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{base} ORDER BY p.code, p.effective_date");
            sqlx::query_as::<_, ExportPositionRow>(&sql)
                .bind(tenant_id.to_string())
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportAssignmentRow {
    pub position_code: String,
    pub assignment_type: String,
    pub pernr: String,
    pub subject_id: String,
    pub effective_date: NaiveDate,
    pub end_date: NaiveDate,
}

pub async fn export_assignments(
    pool: &SqlitePool,
    tenant_id: Uuid,
    as_of: Option<NaiveDate>,
) -> Result<Vec<ExportAssignmentRow>> {
    let base = "SELECT p.code AS position_code, a.assignment_type, a.pernr, a.subject_id,
                       a.effective_date, a.end_date
                FROM org_assignments a
                JOIN org_positions p ON p.id = a.position_id
                WHERE a.tenant_id = ?";
    let rows = match as_of {
        Some(t) => {
            let sql = format!(
                "{base} AND a.effective_date <= ? AND a.end_date > ? ORDER BY p.code, a.pernr, a.effective_date"
            );
            sqlx::query_as::<_, ExportAssignmentRow>(&sql)
                .bind(tenant_id.to_string())
                .bind(t)
                .bind(t)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{base} ORDER BY p.code, a.pernr, a.effective_date");
            sqlx::query_as::<_, ExportAssignmentRow>(&sql)
                .bind(tenant_id.to_string())
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}
