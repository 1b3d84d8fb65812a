//! The periodic cycle driver: tick, fan out one probe per service, drain.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::DEFAULT_TICK_INTERVAL;
use crate::checker::Checker;
use crate::model::{Service, ServiceId};
use crate::store::{ResultStore, ServiceStore};

/// Per-probe notification surfaced to observability consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub service_id: ServiceId,
    pub service_name: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Drives check cycles over every registered service on one shared tick.
///
/// The driver only ever talks to its collaborators through capability
/// traits, so stores and probe handlers can be swapped without touching it.
pub struct Scheduler {
    services: Arc<dyn ServiceStore>,
    results: Arc<dyn ResultStore>,
    checker: Arc<dyn Checker>,
    tick_interval: Duration,
    outcomes: Option<mpsc::Sender<ProbeOutcome>>,
}

impl Scheduler {
    /// Create a scheduler. A zero `tick_interval` falls back to
    /// [`DEFAULT_TICK_INTERVAL`] when [`run`](Self::run) starts.
    pub fn new(
        services: Arc<dyn ServiceStore>,
        results: Arc<dyn ResultStore>,
        checker: Arc<dyn Checker>,
        tick_interval: Duration,
    ) -> Self {
        Self { services, results, checker, tick_interval, outcomes: None }
    }

    /// Send a [`ProbeOutcome`] for every executed probe on `tx`. The channel
    /// is never awaited; outcomes are dropped when it is full.
    pub fn with_outcomes(mut self, tx: mpsc::Sender<ProbeOutcome>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    /// Run cycles until `shutdown` is cancelled.
    ///
    /// The first cycle starts one full interval after this call. A cycle in
    /// flight when the token fires is drained before `run` returns; the
    /// token is not propagated into running probes, whose own timeouts bound
    /// the drain.
    pub async fn run(&self, shutdown: CancellationToken) {
        let tick = if self.tick_interval.is_zero() {
            DEFAULT_TICK_INTERVAL
        } else {
            self.tick_interval
        };

        let mut ticker = time::interval_at(time::Instant::now() + tick, tick);
        // An overrunning cycle delays the next tick instead of queueing
        // catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = tick.as_secs_f64(), "scheduler started");
        loop {
            tokio::select! {
                biased;

                // The shutdown arm comes first so a tick pending at
                // cancellation time cannot start another cycle.
                _ = shutdown.cancelled() => {
                    info!("scheduler stopped");
                    break;
                }
                _ = ticker.tick() => self.run_cycle().await,
            }
        }
    }

    /// Execute one full cycle: snapshot the service list, probe every
    /// service concurrently, wait for all probes to finish.
    pub async fn run_cycle(&self) {
        let services = match self.services.list_services().await {
            Ok(services) => services,
            Err(e) => {
                error!("failed to list services: {e}");
                return;
            }
        };
        if services.is_empty() {
            debug!("no services registered, skipping cycle");
            return;
        }

        debug!(services = services.len(), "starting check cycle");
        let mut probes = FuturesUnordered::new();
        for service in services {
            let checker = Arc::clone(&self.checker);
            let results = Arc::clone(&self.results);
            let outcomes = self.outcomes.clone();
            probes.push(tokio::spawn(async move {
                Self::check_service(checker, results, outcomes, service).await;
            }));
        }

        while let Some(joined) = probes.next().await {
            if let Err(e) = joined {
                error!("probe task failed to complete: {e}");
            }
        }
    }

    /// Probe one service and persist the outcome. A handler error means the
    /// probe never ran, so nothing is recorded for it.
    async fn check_service(
        checker: Arc<dyn Checker>,
        results: Arc<dyn ResultStore>,
        outcomes: Option<mpsc::Sender<ProbeOutcome>>,
        service: Service,
    ) {
        let result = match checker.check(&service).await {
            Ok(result) => result,
            Err(e) => {
                warn!(service = %service.name, "skipping service: {e}");
                return;
            }
        };

        if let Err(e) = results.save_result(&result).await {
            error!(service = %service.name, "failed to save check result: {e}");
            return;
        }

        if result.success {
            info!(service = %service.name, latency_ms = result.latency_ms, "check succeeded");
        } else {
            warn!(
                service = %service.name,
                latency_ms = result.latency_ms,
                error = result.error.as_deref().unwrap_or(""),
                "check failed",
            );
        }

        if let Some(tx) = &outcomes {
            let outcome = ProbeOutcome {
                service_id: service.id,
                service_name: service.name,
                success: result.success,
                latency_ms: result.latency_ms,
                error: result.error,
            };
            if tx.try_send(outcome).is_err() {
                debug!("outcome channel unavailable, dropping notification");
            }
        }
    }
}
