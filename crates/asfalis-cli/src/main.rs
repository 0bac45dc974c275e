//! Administrative CLI for the scan orchestration catalog.
//!
//! ## Commands
//!
//! - `bootstrap-schema`: create/migrate catalog tables
//! - `enqueue`: insert a queued scan run for a repo
//! - `stages`: list stage records for a run
//! - `findings`: list normalized findings for a run

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use uuid::Uuid;

use asfalis_core::{InstallationId, RepoId, ScanRunId};
use asfalis_storage::{CatalogStore, PostgresCatalogStore};

#[derive(Parser)]
#[command(name = "asfalis", version, about = "Scan orchestration catalog administration")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create missing tables and apply idempotent schema migrations.
    BootstrapSchema,

    /// Insert a new queued scan run.
    Enqueue {
        #[arg(long)]
        repo_id: i64,
        #[arg(long)]
        installation_id: i64,
        #[arg(long)]
        branch: Option<String>,
    },

    /// List stage records for a run, oldest first.
    Stages {
        #[arg(long)]
        run_id: Uuid,
    },

    /// List normalized findings for a run.
    Findings {
        #[arg(long)]
        run_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    asfalis_core::init_tracing_from_env(Level::INFO);
    let cli = Cli::parse();

    let config = asfalis_core::Config::from_env().context("loading configuration")?;
    let store = PostgresCatalogStore::connect(&config.database_url)
        .await
        .context("connecting to catalog store")?;

    match cli.command {
        Commands::BootstrapSchema => {
            store.bootstrap_schema().await.context("bootstrapping schema")?;
            info!("schema bootstrap complete");
        }
        Commands::Enqueue {
            repo_id,
            installation_id,
            branch,
        } => {
            let run_id = store
                .enqueue(RepoId(repo_id), InstallationId(installation_id), branch)
                .await
                .context("enqueueing scan run")?;
            println!("{run_id}");
        }
        Commands::Stages { run_id } => {
            let stages = store
                .list_stages(ScanRunId(run_id))
                .await
                .context("listing stages")?;
            for stage in stages {
                println!(
                    "{:<20} started={} ended={:?} error={:?}",
                    stage.stage, stage.started_at, stage.ended_at, stage.error_message
                );
            }
        }
        Commands::Findings { run_id } => {
            let findings = store
                .list_findings(ScanRunId(run_id))
                .await
                .context("listing findings")?;
            for finding in findings {
                println!(
                    "{:?} {} {:?} {:?}",
                    finding.severity_normalized, finding.tool, finding.rule_id, finding.path
                );
            }
        }
    }

    Ok(())
}
