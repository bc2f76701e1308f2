//! `quality check`: evaluate rules and write the report document

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use org_common::api::OrgApiClient;
use org_common::config::Config;
use org_common::docs::{
    quality_report_file_name, sort_issues, write_json_file, write_json_line, QualityReport,
    Ruleset, Summary, MAX_ISSUES_DEFAULT, QUALITY_REPORT_SCHEMA_VERSION,
};
use org_common::error::{Error, Result};

use crate::db;

use super::rules::evaluate;
use super::source::{state_from_api, state_from_db};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityBackend {
    Db,
    Api,
}

impl QualityBackend {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "db" => Ok(QualityBackend::Db),
            "api" => Ok(QualityBackend::Api),
            other => Err(Error::usage(format!(
                "unsupported --backend {other:?} (expected db|api)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityBackend::Db => "db",
            QualityBackend::Api => "api",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QualityCheckOptions {
    pub tenant_id: Uuid,
    pub as_of: NaiveDate,
    pub backend: QualityBackend,
    pub output_dir: PathBuf,
    pub base_url: Option<String>,
    pub auth_token: String,
    pub max_issues: usize,
}

pub async fn build_report(config: &Config, opts: &QualityCheckOptions) -> Result<QualityReport> {
    let state = match opts.backend {
        QualityBackend::Db => {
            let pool = db::connect(&config.database_url).await?;
            state_from_db(&pool, opts.tenant_id, opts.as_of).await?
        }
        QualityBackend::Api => {
            let client = OrgApiClient::new(
                opts.base_url.as_deref().unwrap_or(&config.origin),
                &opts.auth_token,
                config.request_id_header.as_deref(),
            )?;
            client.require_authorization("--auth-token")?;
            state_from_api(&client, opts.tenant_id, opts.as_of).await?
        }
    };

    let mut issues = evaluate(&state);
    sort_issues(&mut issues);

    let max_issues = if opts.max_issues == 0 {
        MAX_ISSUES_DEFAULT
    } else {
        opts.max_issues
    };
    let truncated = issues.len() > max_issues;
    if truncated {
        issues.truncate(max_issues);
    }

    let mut summary = Summary {
        errors: 0,
        warnings: 0,
        issues_total: issues.len(),
        truncated,
    };
    for iss in &issues {
        match iss.severity {
            org_common::docs::Severity::Error => summary.errors += 1,
            org_common::docs::Severity::Warning => summary.warnings += 1,
        }
    }

    let report = QualityReport {
        schema_version: QUALITY_REPORT_SCHEMA_VERSION,
        run_id: Uuid::new_v4(),
        tenant_id: opts.tenant_id,
        as_of: opts.as_of,
        generated_at: Utc::now(),
        ruleset: Ruleset::default(),
        summary,
        issues,
    };
    report.validate()?;
    Ok(report)
}

#[derive(Debug, Serialize)]
struct CheckSummaryLine<'a> {
    status: &'a str,
    run_id: Uuid,
    tenant_id: Uuid,
    backend: &'a str,
    as_of: NaiveDate,
    output: String,
    errors: usize,
    warnings: usize,
    issues_total: usize,
    truncated: bool,
}

pub async fn run_quality_check(config: &Config, opts: QualityCheckOptions) -> Result<()> {
    let report = build_report(config, &opts).await?;

    let out_path: PathBuf = Path::new(&opts.output_dir).join(quality_report_file_name(
        report.tenant_id,
        report.as_of,
        report.run_id,
    ));
    write_json_file(&out_path, &report)?;
    info!(path = %out_path.display(), issues = report.summary.issues_total, "wrote quality report");

    write_json_line(&CheckSummaryLine {
        status: "ok",
        run_id: report.run_id,
        tenant_id: report.tenant_id,
        backend: opts.backend.as_str(),
        as_of: report.as_of,
        output: out_path.display().to_string(),
        errors: report.summary.errors,
        warnings: report.summary.warnings,
        issues_total: report.summary.issues_total,
        truncated: report.summary.truncated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parsing() {
        assert_eq!(QualityBackend::parse("db").unwrap(), QualityBackend::Db);
        assert_eq!(QualityBackend::parse(" API ").unwrap(), QualityBackend::Api);
        assert_eq!(QualityBackend::parse("").unwrap(), QualityBackend::Db);
        assert!(QualityBackend::parse("csv").is_err());
    }
}
