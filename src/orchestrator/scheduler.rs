//! Pass scheduling.
//!
//! # Triggers
//! - Renewal timer: every `renewal.interval_secs`; missed ticks are delayed
//! - Retry backoff: a renewal pass when the earliest issuance backoff elapses
//! - Domain set change (config watcher): bootstrap if the set differs
//! - Operator (SIGHUP): bootstrap, clearing holds and FAILED domains
//! - Shutdown broadcast: stop after the pass in progress

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};

use crate::orchestrator::reconciler::{PassReport, ReconcileError, Reconciler};
use crate::registry::Domain;

/// Minimum spacing between backoff wake-ups.
const RETRY_WAKE_FLOOR: Duration = Duration::from_secs(1);

/// An event that asks for a bootstrap pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The registry file changed and now yields this domain set.
    DomainsChanged(Vec<Domain>),
    /// Operator asked for a fresh bootstrap.
    Operator,
}

pub struct Scheduler {
    reconciler: Arc<Reconciler>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    /// Run passes until shutdown. The initial bootstrap is the caller's job.
    pub async fn run(
        self,
        mut triggers: mpsc::UnboundedReceiver<Trigger>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Scheduler starting");

        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_retry: Option<time::Instant> = None;

        loop {
            let retry_at = self
                .reconciler
                .next_retry_at()
                .await
                .map(|at| last_retry.map_or(at, |last| at.max(last + RETRY_WAKE_FLOOR)));

            tokio::select! {
                _ = ticker.tick() => {
                    log_outcome(self.reconciler.renewal_pass().await);
                }
                _ = retry_due(retry_at) => {
                    tracing::debug!("Issuance backoff elapsed, running pass");
                    last_retry = Some(time::Instant::now());
                    log_outcome(self.reconciler.renewal_pass().await);
                }
                trigger = triggers.recv() => match trigger {
                    Some(Trigger::DomainsChanged(domains)) => {
                        if self.reconciler.domain_set_differs(&domains).await {
                            tracing::info!(domains = domains.len(), "Domain set changed, bootstrapping");
                            log_outcome(self.reconciler.bootstrap().await);
                        } else {
                            tracing::debug!("Config changed but domain set did not");
                        }
                    }
                    Some(Trigger::Operator) => {
                        tracing::info!("Operator requested bootstrap");
                        log_outcome(self.reconciler.bootstrap().await);
                    }
                    None => {
                        tracing::info!("Trigger channel closed, scheduler exiting");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

async fn retry_due(at: Option<time::Instant>) {
    match at {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Pass errors are logged inside the pass span; the next trigger retries.
fn log_outcome(result: Result<PassReport, ReconcileError>) {
    if let Ok(report) = result {
        if !report.failed.is_empty() || !report.held.is_empty() {
            tracing::warn!(
                pass_id = %report.pass_id,
                failed = ?report.failed,
                held = ?report.held,
                "Domains need operator attention"
            );
        }
    }
}
