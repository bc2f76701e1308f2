//! CSV export of a tenant's hierarchy, full history or an as-of slice
//!
//! Output round-trips through seed import: dates render as YYYY-MM-DD
//! and the open-ended sentinel renders as an empty end_date.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use org_common::config::Config;
use org_common::docs::write_json_line;
use org_common::error::{Error, Result};
use org_common::time::OPEN_END;

use crate::db;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub tenant_id: Uuid,
    pub output_dir: PathBuf,
    pub as_of: Option<NaiveDate>,
}

fn date_field(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn end_date_field(date: NaiveDate) -> String {
    if date == OPEN_END {
        String::new()
    } else {
        date_field(date)
    }
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::Writer::from_path(path).map_err(|e| Error::validation(format!("{}: {e}", path.display())))
}

fn csv_err(path: &Path, e: csv::Error) -> Error {
    Error::validation(format!("{}: {e}", path.display()))
}

async fn export_nodes(pool: &sqlx::SqlitePool, opts: &ExportOptions) -> Result<()> {
    let path = opts.output_dir.join("nodes.csv");
    let mut w = csv_writer(&path)?;
    w.write_record([
        "code",
        "type",
        "name",
        "i18n_names",
        "status",
        "legal_entity_id",
        "company_code",
        "location_id",
        "display_order",
        "parent_code",
        "manager_user_id",
        "manager_email",
        "effective_date",
        "end_date",
    ])
    .map_err(|e| csv_err(&path, e))?;

    for row in db::export_nodes(pool, opts.tenant_id, opts.as_of).await? {
        w.write_record([
            row.code.as_str(),
            row.node_type.as_str(),
            row.name.as_str(),
            row.i18n_names.as_deref().unwrap_or(""),
            row.status.as_str(),
            row.legal_entity_id.as_deref().unwrap_or(""),
            row.company_code.as_deref().unwrap_or(""),
            row.location_id.as_deref().unwrap_or(""),
            &row.display_order.to_string(),
            row.parent_code.as_deref().unwrap_or(""),
            &row.manager_user_id.map(|v| v.to_string()).unwrap_or_default(),
            "",
            &date_field(row.effective_date),
            &end_date_field(row.end_date),
        ])
        .map_err(|e| csv_err(&path, e))?;
    }
    w.flush()?;
    Ok(())
}

async fn export_positions(pool: &sqlx::SqlitePool, opts: &ExportOptions) -> Result<()> {
    let path = opts.output_dir.join("positions.csv");
    let mut w = csv_writer(&path)?;
    w.write_record([
        "code",
        "org_node_code",
        "title",
        "status",
        "is_auto_created",
        "effective_date",
        "end_date",
    ])
    .map_err(|e| csv_err(&path, e))?;

    for row in db::export_positions(pool, opts.tenant_id, opts.as_of).await? {
        w.write_record([
            row.code.as_str(),
            row.org_node_code.as_str(),
            row.title.as_deref().unwrap_or(""),
            row.status.as_str(),
            if row.is_auto_created { "true" } else { "false" },
            &date_field(row.effective_date),
            &end_date_field(row.end_date),
        ])
        .map_err(|e| csv_err(&path, e))?;
    }
    w.flush()?;
    Ok(())
}

async fn export_assignments(pool: &sqlx::SqlitePool, opts: &ExportOptions) -> Result<()> {
    let path = opts.output_dir.join("assignments.csv");
    let mut w = csv_writer(&path)?;
    w.write_record([
        "position_code",
        "assignment_type",
        "pernr",
        "subject_id",
        "effective_date",
        "end_date",
    ])
    .map_err(|e| csv_err(&path, e))?;

    for row in db::export_assignments(pool, opts.tenant_id, opts.as_of).await? {
        w.write_record([
            row.position_code.as_str(),
            row.assignment_type.as_str(),
            row.pernr.as_str(),
            row.subject_id.as_str(),
            &date_field(row.effective_date),
            &end_date_field(row.end_date),
        ])
        .map_err(|e| csv_err(&path, e))?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ExportSummaryLine<'a> {
    status: &'a str,
    tenant_id: Uuid,
}

pub async fn run_export(config: &Config, opts: ExportOptions) -> Result<()> {
    if opts.tenant_id.is_nil() {
        return Err(Error::usage("--tenant is required"));
    }

    let pool = db::connect(&config.database_url).await?;
    if !db::tenant_exists(&pool, opts.tenant_id).await? {
        return Err(Error::validation(format!("unknown tenant: {}", opts.tenant_id)));
    }
    std::fs::create_dir_all(&opts.output_dir)?;

    export_nodes(&pool, &opts).await?;
    export_positions(&pool, &opts).await?;
    export_assignments(&pool, &opts).await?;
    info!(output = %opts.output_dir.display(), "wrote csv export");

    write_json_line(&ExportSummaryLine {
        status: "exported",
        tenant_id: opts.tenant_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_end_renders_empty() {
        assert_eq!(end_date_field(OPEN_END), "");
        let d = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(end_date_field(d), "2025-06-01");
        assert_eq!(date_field(d), "2025-06-01");
    }
}
