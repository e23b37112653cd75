//! Sentinel-Sync - Content Hub reconciliation CLI
//!
//! Brings a Sentinel workspace's solutions, analytics rules and workbooks
//! in line with the Content Hub catalog.
//!
//! ## Commands
//!
//! - `reconcile`: install or update whatever is missing or stale
//! - `status`: classify everything in scope without writing

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sentinel_catalog::{ArmCatalogClient, CatalogClient, Session, Severity, DEFAULT_ARM_ENDPOINT};
use sentinel_reconcile::telemetry::init_tracing;
use sentinel_reconcile::{Coordinator, ReconcileConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "sentinel-sync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reconcile Sentinel content against the Content Hub catalog", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install or update solutions, then their rules and workbooks
    Reconcile {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        policy: PolicyArgs,

        /// Classify and plan without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Seconds to wait after solution changes before rules and workbooks
        #[arg(long)]
        settle_delay_secs: Option<u64>,

        /// Maximum number of solution installs running at once
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Show the classification of everything in scope as JSON
    Status {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        scope: ScopeArgs,
    },
}

/// Workspace and credentials.
#[derive(Args)]
struct TargetArgs {
    /// Azure subscription id
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription_id: String,

    /// Resource group of the workspace
    #[arg(long, env = "AZURE_RESOURCE_GROUP")]
    resource_group: String,

    /// Log Analytics workspace name
    #[arg(long, env = "AZURE_WORKSPACE_NAME")]
    workspace: String,

    /// Azure region of the workspace
    #[arg(long, env = "AZURE_LOCATION")]
    location: String,

    /// Bearer token for the resource manager
    #[arg(long, env = "AZURE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: String,

    /// Resource manager endpoint
    #[arg(long, env = "AZURE_ARM_ENDPOINT", default_value = DEFAULT_ARM_ENDPOINT)]
    arm_endpoint: String,
}

impl TargetArgs {
    fn session(&self) -> Session {
        Session::new(
            &self.subscription_id,
            &self.resource_group,
            &self.workspace,
            &self.location,
            &self.access_token,
        )
        .with_endpoint(&self.arm_endpoint)
    }
}

/// What to reconcile.
#[derive(Args)]
struct ScopeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Solution display name (repeatable; replaces the configured list)
    #[arg(short, long = "solution")]
    solutions: Vec<String>,

    /// Rule severity to deploy (repeatable; replaces the configured list)
    #[arg(long = "severity")]
    severities: Vec<Severity>,
}

/// Per-kind policy switches, OR-ed into the configuration file.
#[derive(Args, Default)]
struct PolicyArgs {
    /// Install preview and deprecated solutions
    #[arg(long)]
    force_solution_update: bool,

    /// Leave outdated solutions alone
    #[arg(long)]
    skip_solution_update: bool,

    /// Do not deploy solutions
    #[arg(long)]
    skip_solutions: bool,

    /// Reconcile rules of already-installed solutions too
    #[arg(long)]
    force_rules: bool,

    /// Leave outdated rules alone
    #[arg(long)]
    skip_rule_update: bool,

    /// Do not deploy rules
    #[arg(long)]
    skip_rules: bool,

    /// Reconcile workbooks of already-installed solutions too
    #[arg(long)]
    force_workbooks: bool,

    /// Redeploy workbooks that are already current
    #[arg(long)]
    redeploy_workbooks: bool,

    /// Leave outdated workbooks alone
    #[arg(long)]
    skip_workbook_update: bool,

    /// Do not deploy workbooks
    #[arg(long)]
    skip_workbooks: bool,
}

impl PolicyArgs {
    fn apply(&self, config: &mut ReconcileConfig) {
        let policy = &mut config.policy;
        policy.solutions.force_update |= self.force_solution_update;
        policy.solutions.skip_update |= self.skip_solution_update;
        policy.solutions.skip_deployment |= self.skip_solutions;
        policy.rules.force_deployment |= self.force_rules;
        policy.rules.skip_update |= self.skip_rule_update;
        policy.rules.skip_deployment |= self.skip_rules;
        policy.workbooks.force_deployment |= self.force_workbooks;
        policy.workbooks.force_redeploy |= self.redeploy_workbooks;
        policy.workbooks.skip_update |= self.skip_workbook_update;
        policy.workbooks.skip_deployment |= self.skip_workbooks;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Reconcile {
            target,
            scope,
            policy,
            dry_run,
            settle_delay_secs,
            max_concurrent,
        } => {
            let mut config = load_config(&scope)?;
            policy.apply(&mut config);
            config.dry_run |= dry_run;
            if let Some(secs) = settle_delay_secs {
                config.settle_delay_secs = secs;
            }
            if let Some(max) = max_concurrent {
                config.max_concurrent_installs = max;
            }
            cmd_reconcile(&target, config).await
        }
        Commands::Status { target, scope } => {
            let config = load_config(&scope)?;
            cmd_status(&target, config).await
        }
    }
}

/// Read the configuration file, if any, and apply the scope flags.
fn load_config(scope: &ScopeArgs) -> Result<ReconcileConfig> {
    let mut config = match &scope.config {
        Some(path) => ReconcileConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ReconcileConfig::default(),
    };
    if !scope.solutions.is_empty() {
        config.solutions = scope.solutions.clone();
    }
    if !scope.severities.is_empty() {
        config.severities = scope.severities.clone();
    }
    if config.solutions.is_empty() {
        anyhow::bail!("No solutions to reconcile: pass --solution or list them in the config file");
    }
    Ok(config)
}

fn coordinator(target: &TargetArgs, config: ReconcileConfig) -> Result<Coordinator> {
    let session = target.session();
    let params = session.workspace_params();
    let client: Arc<dyn CatalogClient> =
        Arc::new(ArmCatalogClient::new(session).context("Failed to build catalog client")?);
    Coordinator::new(client, params, config).context("Invalid reconciliation configuration")
}

async fn cmd_reconcile(target: &TargetArgs, config: ReconcileConfig) -> Result<()> {
    info!(
        workspace = %target.workspace,
        solutions = config.solutions.len(),
        dry_run = config.dry_run,
        "starting reconciliation"
    );
    let report = coordinator(target, config)?.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let failures = report.failure_count();
    if failures > 0 {
        anyhow::bail!("Reconciliation finished with {} failure(s)", failures);
    }
    Ok(())
}

async fn cmd_status(target: &TargetArgs, config: ReconcileConfig) -> Result<()> {
    let status = coordinator(target, config)?
        .status()
        .await
        .context("Failed to read workspace status")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
