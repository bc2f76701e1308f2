//! Seed import rollback, by manifest or by created-at cutoff
//!
//! Deletes run in child-before-parent order inside one transaction so a
//! failure leaves the tenant untouched.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use org_common::config::Config;
use org_common::docs::{read_json_file, write_json_line, ImportManifest};
use org_common::error::{Error, Result};

use crate::db;

#[derive(Debug, Clone)]
pub struct RollbackOptions {
    pub tenant_id: Uuid,
    pub manifest_path: Option<PathBuf>,
    pub since: Option<DateTime<Utc>>,
    pub apply: bool,
    pub yes: bool,
}

#[derive(Debug, Serialize)]
struct RollbackCounts {
    org_nodes: usize,
    org_node_slices: usize,
    org_edges: usize,
    org_positions: usize,
    org_assignments: usize,
}

#[derive(Debug, Serialize)]
struct SeedRollbackSummaryLine<'a> {
    status: &'a str,
    mode: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    counts: Option<RollbackCounts>,
}

fn manifest_summary(status: &'static str, manifest: &ImportManifest) -> Result<()> {
    write_json_line(&SeedRollbackSummaryLine {
        status,
        mode: "manifest",
        run_id: Some(manifest.run_id),
        tenant_id: Some(manifest.tenant_id),
        since: None,
        counts: Some(RollbackCounts {
            org_nodes: manifest.inserted.org_nodes.len(),
            org_node_slices: manifest.inserted.org_node_slices.len(),
            org_edges: manifest.inserted.org_edges.len(),
            org_positions: manifest.inserted.org_positions.len(),
            org_assignments: manifest.inserted.org_assignments.len(),
        }),
    })
}

fn since_summary(status: &'static str, since: DateTime<Utc>) -> Result<()> {
    write_json_line(&SeedRollbackSummaryLine {
        status,
        mode: "since",
        run_id: None,
        tenant_id: None,
        since: Some(since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        counts: None,
    })
}

async fn rollback_by_manifest(
    pool: &sqlx::SqlitePool,
    tenant_id: Uuid,
    manifest: &ImportManifest,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    db::delete_by_ids(&mut *tx, "org_assignments", tenant_id, &manifest.inserted.org_assignments)
        .await?;
    db::delete_by_ids(&mut *tx, "org_positions", tenant_id, &manifest.inserted.org_positions)
        .await?;
    db::delete_by_ids(&mut *tx, "org_edges", tenant_id, &manifest.inserted.org_edges).await?;
    db::delete_by_ids(&mut *tx, "org_node_slices", tenant_id, &manifest.inserted.org_node_slices)
        .await?;
    db::delete_by_ids(&mut *tx, "org_nodes", tenant_id, &manifest.inserted.org_nodes).await?;
    tx.commit().await?;
    Ok(())
}

async fn rollback_by_since(
    pool: &sqlx::SqlitePool,
    tenant_id: Uuid,
    since: DateTime<Utc>,
) -> Result<()> {
    if db::has_org_nodes_before(pool, tenant_id, since).await? {
        return Err(Error::safety_net(format!(
            "refusing rollback --since: org_nodes has rows created before {}",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        )));
    }

    let mut tx = pool.begin().await?;
    for table in [
        "org_assignments",
        "org_positions",
        "org_edges",
        "org_node_slices",
        "org_nodes",
    ] {
        let removed = db::delete_created_since(&mut *tx, table, tenant_id, since).await?;
        info!(table, removed, "rolled back rows");
    }
    tx.commit().await?;
    Ok(())
}

pub async fn run_rollback(config: &Config, opts: RollbackOptions) -> Result<()> {
    if opts.tenant_id.is_nil() {
        return Err(Error::usage("--tenant is required"));
    }
    if opts.manifest_path.is_none() == opts.since.is_none() {
        return Err(Error::usage("exactly one of --manifest or --since is required"));
    }

    let pool = db::connect(&config.database_url).await?;
    if !db::tenant_exists(&pool, opts.tenant_id).await? {
        return Err(Error::validation(format!("unknown tenant: {}", opts.tenant_id)));
    }

    if let Some(manifest_path) = &opts.manifest_path {
        let manifest: ImportManifest = read_json_file(manifest_path)?;
        manifest.validate()?;
        if manifest.tenant_id != opts.tenant_id {
            return Err(Error::validation(format!(
                "manifest tenant_id mismatch: {}",
                manifest.tenant_id
            )));
        }
        if !opts.apply {
            return manifest_summary("dry_run", &manifest);
        }
        if !opts.yes {
            return Err(Error::safety_net("refusing to rollback without --yes"));
        }
        rollback_by_manifest(&pool, opts.tenant_id, &manifest).await?;
        return manifest_summary("applied", &manifest);
    }

    // since mode; the options check above guarantees the value is present
    let Some(since) = opts.since else {
        return Err(Error::usage("exactly one of --manifest or --since is required"));
    };
    if !opts.apply {
        return since_summary("dry_run", since);
    }
    if !opts.yes {
        return Err(Error::safety_net("refusing to rollback without --yes"));
    }
    rollback_by_since(&pool, opts.tenant_id, since).await?;
    since_summary("applied", since)
}
