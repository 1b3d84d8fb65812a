mod config;
mod logging;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use upwatch::{
    DefaultChecker, MemoryStore, ProbeOutcome, ResultStore, Scheduler, ServiceId, ServiceStore,
};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "upwatch-service", version, about = "Periodic service health checker")]
struct Args {
    /// Path to the configuration file (created with defaults when missing).
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Run a single check cycle and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args = Args::parse();
    let config =
        Config::from_config(args.config.as_ref()).context("failed to load configuration")?;
    info!("{config}");

    let store = Arc::new(MemoryStore::new());
    for entry in &config.services {
        let service = entry.to_service();
        if let Err(e) = service.validate() {
            warn!(service = %entry.name, "skipping invalid service: {e}");
            continue;
        }
        let id = store.create_service(&service).await?;
        info!(service = %entry.name, id, target = %entry.target, "registered service");
    }

    let checker = Arc::new(
        DefaultChecker::new(Duration::from_secs(config.probes.timeout_secs))
            .context("failed to build probe handlers")?,
    );
    let (outcome_tx, outcome_rx) = mpsc::channel(64);
    let scheduler = Scheduler::new(
        store.clone() as Arc<dyn ServiceStore>,
        store.clone() as Arc<dyn ResultStore>,
        checker,
        Duration::from_secs(config.scheduler.tick_interval_secs),
    )
    .with_outcomes(outcome_tx);

    if args.once {
        scheduler.run_cycle().await;
        drop(scheduler);
        report_summary(&store).await;
        return Ok(());
    }

    let watcher = tokio::spawn(track_transitions(outcome_rx));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    scheduler.run(shutdown).await;
    // Dropping the scheduler closes the outcome channel and ends the watcher.
    drop(scheduler);
    let _ = watcher.await;

    report_summary(&store).await;
    Ok(())
}

/// Log up/down transitions observed on the outcome stream.
async fn track_transitions(mut outcomes: mpsc::Receiver<ProbeOutcome>) {
    let mut last_state: HashMap<ServiceId, bool> = HashMap::new();
    while let Some(outcome) = outcomes.recv().await {
        match last_state.insert(outcome.service_id, outcome.success) {
            Some(previous) if previous != outcome.success => {
                if outcome.success {
                    info!(service = %outcome.service_name, "service recovered");
                } else {
                    error!(
                        service = %outcome.service_name,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "service went down",
                    );
                }
            }
            None if !outcome.success => {
                error!(service = %outcome.service_name, "service is down");
            }
            _ => {}
        }
    }
}

/// Availability summary over the stored history, written at shutdown.
async fn report_summary(store: &MemoryStore) {
    let services = match store.list_services().await {
        Ok(services) => services,
        Err(e) => {
            error!("failed to list services for summary: {e}");
            return;
        }
    };

    for service in services {
        let results = match store.recent_results(service.id, 0).await {
            Ok(results) => results,
            Err(e) => {
                error!(service = %service.name, "failed to read history: {e}");
                continue;
            }
        };
        if results.is_empty() {
            info!(service = %service.name, "no checks recorded");
            continue;
        }

        let up = results.iter().filter(|r| r.success).count();
        let availability = up as f64 / results.len() as f64 * 100.0;
        info!(
            service = %service.name,
            checks = results.len(),
            availability = %format!("{availability:.1}%"),
            "final summary",
        );
    }
}
