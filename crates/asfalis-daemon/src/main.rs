//! Dispatcher daemon: claims queued scan runs under row-level locking and
//! hands each to the pipeline engine, one run at a time.
//!
//! Mirrors the original source's worker loop: poll, claim with skip-locked,
//! run to a terminal state, continue without sleeping; sleep the poll
//! interval only when the queue is empty. Any error escaping the pipeline
//! engine is caught here and never propagates out of the loop.

mod github_app;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn, Level};

use asfalis_core::Config;
use asfalis_engine::PipelineEngine;
use asfalis_fetch::TokenBroker;
use asfalis_storage::{CatalogStore, PostgresCatalogStore};

use crate::github_app::GithubAppTokenBroker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    asfalis_core::init_tracing_from_env(Level::INFO);
    info!("asfalisd starting");

    let config = Config::from_env()?;
    let store: Arc<dyn CatalogStore> = Arc::new(PostgresCatalogStore::connect(&config.database_url).await?);
    store.bootstrap_schema().await?;

    let swept = store.sweep_orphans(config.orphan_run_threshold).await?;
    if swept > 0 {
        warn!(swept, "swept orphaned running runs at startup");
    }

    let token_broker: Arc<dyn TokenBroker> = match GithubAppTokenBroker::from_env()? {
        Some(broker) => Arc::new(broker),
        None => {
            warn!("GITHUB_APP_ID/private key not configured; fetch_repo will fail token issuance");
            Arc::new(UnconfiguredTokenBroker)
        }
    };

    let engine = PipelineEngine::new(store.clone(), token_broker, &config);

    run_dispatcher_loop(store, engine, config.worker_poll_interval).await;
    Ok(())
}

async fn run_dispatcher_loop(store: Arc<dyn CatalogStore>, engine: PipelineEngine, poll_interval: Duration) {
    info!("dispatcher loop started, waiting for jobs");
    loop {
        let claimed = match store.claim_next_queued().await {
            Ok(run) => run,
            Err(e) => {
                error!(error = %e, "dispatcher failed to claim next queued run");
                tokio::time::sleep(poll_interval).await;
                continue;
            }
        };

        let Some(run) = claimed else {
            tokio::time::sleep(poll_interval).await;
            continue;
        };

        info!(run_id = %run.id, "claimed scan run");
        if let Err(e) = engine.run(run.id).await {
            error!(run_id = %run.id, error = %e, "scan run terminated with error");
        }
        // Continue without sleeping: there may be more queued work.
    }
}

struct UnconfiguredTokenBroker;

#[async_trait::async_trait]
impl TokenBroker for UnconfiguredTokenBroker {
    async fn issue_token(&self, _installation_id: asfalis_core::InstallationId) -> asfalis_fetch::FetchResult<String> {
        Err(asfalis_fetch::FetchError::TokenIssuance(
            "GITHUB_APP_ID or private key not configured".to_string(),
        ))
    }
}
