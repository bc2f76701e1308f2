//! org-data - Organizational hierarchy import/export/quality CLI

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use org_common::config::Config;
use org_common::error::{Error, Result};
use org_common::time::{parse_timestamp, parse_when};

use org_data::export::{run_export, ExportOptions};
use org_data::fixes::{
    run_quality_apply, run_quality_plan, run_quality_rollback, BeforeBackend, QualityApplyOptions,
    QualityPlanOptions, QualityRollbackOptions,
};
use org_data::import::{run_import, ImportOptions};
use org_data::quality::{run_quality_check, QualityBackend, QualityCheckOptions};
use org_data::rollback::{run_rollback, RollbackOptions};

#[derive(Parser)]
#[command(name = "org-data", about = "Org data import/export/rollback tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed-import Org CSV files into the database
    Import(ImportArgs),
    /// Export Org data from the database into CSV files
    Export(ExportArgs),
    /// Rollback an Org seed import by manifest or since timestamp
    Rollback(RollbackArgs),
    /// Data quality checks and fixes
    Quality {
        #[command(subcommand)]
        command: QualityCommand,
    },
}

#[derive(Subcommand)]
enum QualityCommand {
    /// Evaluate quality rules and write a report
    Check(QualityCheckArgs),
    /// Generate a fix plan from a quality report
    Plan(QualityPlanArgs),
    /// Apply a fix plan through the batch API
    Apply(QualityApplyArgs),
    /// Roll back an applied fix via its manifest
    Rollback(QualityRollbackArgs),
}

#[derive(Args)]
struct ImportArgs {
    /// Tenant UUID (required)
    #[arg(long)]
    tenant: String,
    /// Input directory containing CSV files (required)
    #[arg(long)]
    input: PathBuf,
    /// Output directory for manifest (default: input dir)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Apply changes to DB (default is dry-run)
    #[arg(long)]
    apply: bool,
    /// Skip assignments import even if assignments.csv exists
    #[arg(long)]
    skip_assignments: bool,
    /// Strict cycle checks across all effective dates
    #[arg(long)]
    strict: bool,
    /// Backend: db
    #[arg(long, default_value = "db")]
    backend: String,
    /// Mode: seed
    #[arg(long, default_value = "seed")]
    mode: String,
}

#[derive(Args)]
struct ExportArgs {
    /// Tenant UUID (required)
    #[arg(long)]
    tenant: String,
    /// Output directory (required)
    #[arg(long)]
    output: PathBuf,
    /// As-of time (YYYY-MM-DD or RFC3339)
    #[arg(long)]
    as_of: Option<String>,
}

#[derive(Args)]
struct RollbackArgs {
    /// Tenant UUID (required)
    #[arg(long)]
    tenant: String,
    /// Path to import_manifest_*.json
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Rollback seed data since this time (RFC3339)
    #[arg(long)]
    since: Option<String>,
    /// Apply rollback (default is dry-run)
    #[arg(long)]
    apply: bool,
    /// Confirm destructive rollback
    #[arg(long)]
    yes: bool,
}

#[derive(Args)]
struct QualityCheckArgs {
    /// Tenant UUID (required)
    #[arg(long)]
    tenant: String,
    /// As-of time (YYYY-MM-DD or RFC3339; default now UTC)
    #[arg(long)]
    as_of: Option<String>,
    /// Backend: db|api
    #[arg(long, default_value = "db")]
    backend: String,
    /// Output directory
    #[arg(long, default_value = ".")]
    output: PathBuf,
    /// Output format: json
    #[arg(long, default_value = "json")]
    format: String,
    /// Max issues to output (truncate beyond this)
    #[arg(long, default_value_t = 0)]
    max_issues: usize,
    /// Base URL for api backend (default: ORIGIN)
    #[arg(long)]
    base_url: Option<String>,
    /// Authorization token for api backend (sent as Authorization header)
    #[arg(long, default_value = "")]
    auth_token: String,
}

#[derive(Args)]
struct QualityPlanArgs {
    /// Path to a quality report json file (required)
    #[arg(long)]
    report: PathBuf,
    /// Output file or directory for fix plan (required)
    #[arg(long)]
    output: PathBuf,
    /// Max commands allowed in fix plan (default: ORG_DATA_FIXES_MAX_COMMANDS)
    #[arg(long, default_value_t = 0)]
    max_commands: usize,
}

#[derive(Args)]
struct QualityApplyArgs {
    /// Path to a fix plan json file (required)
    #[arg(long)]
    fix_plan: PathBuf,
    /// Output directory for manifest
    #[arg(long, default_value = ".")]
    output: PathBuf,
    /// Force dry-run (mutually exclusive with --apply)
    #[arg(long)]
    dry_run: bool,
    /// Apply changes (default is dry-run)
    #[arg(long)]
    apply: bool,
    /// Confirm applying changes
    #[arg(long)]
    yes: bool,
    /// Optional change request id to bind and preflight
    #[arg(long)]
    change_request_id: Option<String>,
    /// Read before-state via: api|db
    #[arg(long, default_value = "api")]
    before_backend: String,
    /// Base URL for org api (default: ORIGIN)
    #[arg(long)]
    base_url: Option<String>,
    /// Authorization token (sent as Authorization header)
    #[arg(long, default_value = "")]
    auth_token: String,
}

#[derive(Args)]
struct QualityRollbackArgs {
    /// Path to a fix manifest json file (required)
    #[arg(long)]
    manifest: PathBuf,
    /// Force dry-run (mutually exclusive with --apply)
    #[arg(long)]
    dry_run: bool,
    /// Apply rollback (default is dry-run)
    #[arg(long)]
    apply: bool,
    /// Confirm applying rollback
    #[arg(long)]
    yes: bool,
    /// Base URL for org api (default: ORIGIN)
    #[arg(long)]
    base_url: Option<String>,
    /// Authorization token (sent as Authorization header)
    #[arg(long, default_value = "")]
    auth_token: String,
}

fn parse_tenant(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|e| Error::usage(format!("invalid --tenant: {e}")))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    match cli.command {
        Command::Import(args) => {
            if args.backend != "db" {
                return Err(Error::usage(format!("unsupported --backend: {}", args.backend)));
            }
            if args.mode != "seed" {
                return Err(Error::usage(format!(
                    "unsupported --mode for backend=db: {}",
                    args.mode
                )));
            }
            let tenant_id = parse_tenant(&args.tenant)?;
            let output_dir = args.output.unwrap_or_else(|| args.input.clone());
            run_import(
                &config,
                ImportOptions {
                    tenant_id,
                    input_dir: args.input,
                    output_dir,
                    apply: args.apply,
                    skip_assignments: args.skip_assignments,
                    strict: args.strict,
                },
            )
            .await
        }
        Command::Export(args) => {
            let tenant_id = parse_tenant(&args.tenant)?;
            let as_of = args
                .as_of
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_when)
                .transpose()
                .map_err(|e| Error::usage(format!("invalid --as-of: {e}")))?;
            run_export(
                &config,
                ExportOptions {
                    tenant_id,
                    output_dir: args.output,
                    as_of,
                },
            )
            .await
        }
        Command::Rollback(args) => {
            let tenant_id = parse_tenant(&args.tenant)?;
            let since = args
                .since
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_timestamp)
                .transpose()
                .map_err(|e| Error::usage(format!("invalid --since: {e}")))?;
            run_rollback(
                &config,
                RollbackOptions {
                    tenant_id,
                    manifest_path: args.manifest,
                    since,
                    apply: args.apply,
                    yes: args.yes,
                },
            )
            .await
        }
        Command::Quality { command } => match command {
            QualityCommand::Check(args) => {
                if args.format != "json" {
                    return Err(Error::usage(format!("unsupported --format: {}", args.format)));
                }
                let tenant_id = parse_tenant(&args.tenant)?;
                let as_of = match args.as_of.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                    Some(raw) => {
                        parse_when(raw).map_err(|e| Error::usage(format!("invalid --as-of: {e}")))?
                    }
                    None => chrono::Utc::now().date_naive(),
                };
                run_quality_check(
                    &config,
                    QualityCheckOptions {
                        tenant_id,
                        as_of,
                        backend: QualityBackend::parse(&args.backend)?,
                        output_dir: args.output,
                        base_url: args.base_url,
                        auth_token: args.auth_token,
                        max_issues: args.max_issues,
                    },
                )
                .await
            }
            QualityCommand::Plan(args) => run_quality_plan(
                &config,
                QualityPlanOptions {
                    report_path: args.report,
                    output_path: args.output,
                    max_commands: args.max_commands,
                },
            ),
            QualityCommand::Apply(args) => {
                let change_request_id = args
                    .change_request_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(Uuid::parse_str)
                    .transpose()
                    .map_err(|e| Error::usage(format!("invalid --change-request-id: {e}")))?;
                run_quality_apply(
                    &config,
                    QualityApplyOptions {
                        fix_plan_path: args.fix_plan,
                        output_dir: args.output,
                        dry_run: args.dry_run,
                        apply: args.apply,
                        yes: args.yes,
                        change_request_id,
                        before_backend: BeforeBackend::parse(&args.before_backend)?,
                        base_url: args.base_url,
                        auth_token: args.auth_token,
                    },
                )
                .await
            }
            QualityCommand::Rollback(args) => {
                run_quality_rollback(
                    &config,
                    QualityRollbackOptions {
                        manifest_path: args.manifest,
                        dry_run: args.dry_run,
                        apply: args.apply,
                        yes: args.yes,
                        base_url: args.base_url,
                        auth_token: args.auth_token,
                    },
                )
                .await
            }
        },
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        std::process::exit(err.exit_code());
    }
}
