//! Bootstrap and renewal passes.
//!
//! # Bootstrap
//! ```text
//! registry.load → sync table, release holds/FAILED
//!     → inspect store → render → apply (challenge paths live)
//!     → acquire for every NO_CERT domain (isolated per domain)
//!     → inspect store → render → apply once (batched)
//! ```
//!
//! # Renewal
//! ```text
//! inspect store → render → apply if the store changed under us
//!     → issue NO_CERT domains whose backoff elapsed
//!     → renew ISSUED domains inside the renewal window
//!     → inspect store → render → apply (or plain reload after renewals)
//! ```
//!
//! Passes hold the table lock for their whole duration, so a pass that
//! arrives while another runs waits for it instead of being dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::acme::{AcquireError, AcquireMode, Acquirer};
use crate::config::{ConfigError, ReconcilerConfig};
use crate::observability::metrics::{
    record_acquisition, record_domain_state, record_pass, record_reload,
};
use crate::observability::spans::pass_span;
use crate::orchestrator::state::{DomainState, FailureOutcome, StateTable};
use crate::proxy::{ApplyOutcome, ProxyControl, ReloadError};
use crate::registry::{Domain, DomainSource, UpstreamProbe};
use crate::render::{render, GlobalOptions};
use crate::resilience::backoff::RetryPolicy;
use crate::resilience::timeouts::acquire_with_deadline;
use crate::store::{CertStates, CertificateStore, StoreError};

/// Slack added on top of the client's own deadline.
const DEADLINE_GRACE: Duration = Duration::from_secs(5);

/// A failure that aborts the current pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("certificate store error: {0}")]
    Store(#[from] StoreError),

    #[error("proxy reload error: {0}")]
    Reload(#[from] ReloadError),
}

/// Tunables of the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub retry: RetryPolicy,
    pub renew_before: chrono::Duration,
    /// Deadline for one acquisition, enforced by the orchestrator.
    pub acquire_timeout: Duration,
    /// Maximum acquisitions in flight (1 = sequential).
    pub concurrency: usize,
}

impl ReconcileSettings {
    pub fn from_config(config: &ReconcilerConfig) -> Self {
        Self {
            retry: RetryPolicy::from(&config.retry),
            renew_before: chrono::Duration::days(i64::from(config.renewal.renew_before_days)),
            acquire_timeout: Duration::from_secs(config.acme.timeout_secs) + DEADLINE_GRACE,
            concurrency: config.acme.concurrency.max(1),
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self::from_config(&ReconcilerConfig::default())
    }
}

/// What one pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub kind: &'static str,
    pub issued: Vec<String>,
    pub renewed: Vec<String>,
    pub retry_scheduled: Vec<String>,
    pub held: Vec<String>,
    pub failed: Vec<String>,
    pub renewal_retained: Vec<String>,
    /// Proxy reloads issued during the pass.
    pub reloads: u32,
}

impl PassReport {
    fn new(kind: &'static str) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            kind,
            ..Self::default()
        }
    }

    fn acquired(&self) -> bool {
        !self.issued.is_empty() || !self.renewed.is_empty()
    }
}

/// Externally visible view of one domain record.
#[derive(Debug, Clone, Serialize)]
pub struct DomainSnapshot {
    pub name: String,
    pub state: DomainState,
    pub failures: u32,
    pub hold: Option<&'static str>,
    pub last_error: Option<String>,
}

/// Drives every managed domain towards serving HTTPS.
pub struct Reconciler {
    source: Arc<dyn DomainSource>,
    store: CertificateStore,
    acquirer: Arc<dyn Acquirer>,
    proxy: Arc<dyn ProxyControl>,
    probe: UpstreamProbe,
    options: GlobalOptions,
    settings: ReconcileSettings,
    table: Mutex<StateTable>,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn DomainSource>,
        store: CertificateStore,
        acquirer: Arc<dyn Acquirer>,
        proxy: Arc<dyn ProxyControl>,
        options: GlobalOptions,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            source,
            store,
            acquirer,
            proxy,
            probe: UpstreamProbe::disabled(),
            options,
            settings,
            table: Mutex::new(StateTable::new()),
        }
    }

    /// Probe upstreams before every render.
    pub fn with_probe(mut self, probe: UpstreamProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Run the bootstrap protocol. Clears operator holds and FAILED records.
    pub async fn bootstrap(&self) -> Result<PassReport, ReconcileError> {
        let mut table = self.table.lock().await;
        self.run_pass(&mut table, "bootstrap").await
    }

    /// Run the renewal protocol, or bootstrap if none has succeeded yet.
    pub async fn renewal_pass(&self) -> Result<PassReport, ReconcileError> {
        let mut table = self.table.lock().await;
        let kind = if table.is_loaded() { "renewal" } else { "bootstrap" };
        self.run_pass(&mut table, kind).await
    }

    /// Whether `domains` differs from the set currently reconciled.
    pub async fn domain_set_differs(&self, domains: &[Domain]) -> bool {
        !self.table.lock().await.same_domains(domains)
    }

    /// When the next backed-off issuance becomes due, if any.
    pub async fn next_retry_at(&self) -> Option<Instant> {
        self.table.lock().await.next_retry_at()
    }

    pub async fn domain_state(&self, name: &str) -> Option<DomainState> {
        self.table.lock().await.get(name).map(|r| r.state)
    }

    pub async fn snapshot(&self) -> Vec<DomainSnapshot> {
        let table = self.table.lock().await;
        table
            .records()
            .iter()
            .map(|r| DomainSnapshot {
                name: r.domain.name.clone(),
                state: r.state,
                failures: r.failures,
                hold: r.hold,
                last_error: r.last_error.as_ref().map(|e| e.to_string()),
            })
            .collect()
    }

    async fn run_pass(
        &self,
        table: &mut StateTable,
        kind: &'static str,
    ) -> Result<PassReport, ReconcileError> {
        let mut report = PassReport::new(kind);
        let span = pass_span(kind, report.pass_id);

        let result = async {
            tracing::debug!("Pass started");
            if kind == "bootstrap" {
                self.run_bootstrap(table, &mut report).await
            } else {
                self.run_renewal(table, &mut report).await
            }
        }
        .instrument(span.clone())
        .await;

        let _enter = span.enter();
        match result {
            Ok(()) => {
                record_pass(kind, "ok");
                tracing::info!(
                    issued = report.issued.len(),
                    renewed = report.renewed.len(),
                    retry_scheduled = report.retry_scheduled.len(),
                    held = report.held.len(),
                    failed = report.failed.len(),
                    reloads = report.reloads,
                    "Pass complete"
                );
                Ok(report)
            }
            Err(e) => {
                record_pass(kind, "error");
                tracing::error!(error = %e, "Pass aborted");
                Err(e)
            }
        }
    }

    async fn run_bootstrap(
        &self,
        table: &mut StateTable,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        let domains = self.source.load()?;
        tracing::info!(domains = domains.len(), "Domain registry loaded");
        table.sync(&domains);
        table.release_all();

        let states = self.observe(table)?;
        // Always hand the render to the proxy so challenge paths are live.
        self.apply(table, &states, true, report).await?;

        let jobs = self.issue_jobs(table);
        self.acquire_batch(table, jobs, report).await;
        self.finish(table, report).await
    }

    async fn run_renewal(
        &self,
        table: &mut StateTable,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        let states = self.observe(table)?;
        self.apply(table, &states, false, report).await?;

        let mut jobs = self.issue_jobs(table);
        let now = chrono::Utc::now();
        for record in table.records() {
            if record.state == DomainState::Issued
                && self
                    .store
                    .needs_renewal(&record.domain, self.settings.renew_before, now)?
            {
                jobs.push((record.domain.clone(), AcquireMode::Renew));
            }
        }

        if jobs.is_empty() {
            tracing::debug!("Nothing to acquire");
            return Ok(());
        }

        self.acquire_batch(table, jobs, report).await;
        self.finish(table, report).await
    }

    fn issue_jobs(&self, table: &StateTable) -> Vec<(Domain, AcquireMode)> {
        table
            .ready_to_issue(Instant::now())
            .into_iter()
            .filter_map(|name| table.get(&name).map(|r| (r.domain.clone(), AcquireMode::Issue)))
            .collect()
    }

    /// Inspect the store and fold the result into the table.
    fn observe(&self, table: &mut StateTable) -> Result<CertStates, StoreError> {
        let inspected = self.store.inspect(&table.domains())?;
        for state in &inspected {
            if let Some(record) = table.get_mut(&state.domain.name) {
                record.observe(state.exists);
                record_domain_state(&record.domain.name, record.state);
            }
        }
        Ok(inspected.into_iter().collect())
    }

    /// Render and hand the result to the proxy.
    ///
    /// Unless `force` is set, a render identical to the last accepted one is
    /// not applied again. Returns whether the proxy reloaded.
    async fn apply(
        &self,
        table: &mut StateTable,
        states: &CertStates,
        force: bool,
        report: &mut PassReport,
    ) -> Result<bool, ReloadError> {
        let domains = self.probe.effective(&table.domains()).await;
        let rendered = render(&domains, states, &self.options);

        if !force && table.applied() == Some(rendered.as_str()) {
            return Ok(false);
        }

        match self.proxy.apply(&rendered).await {
            Ok(outcome) => {
                table.set_applied(rendered.as_str());
                let reloaded = outcome == ApplyOutcome::Reloaded;
                if reloaded {
                    record_reload("reloaded");
                    report.reloads += 1;
                } else {
                    record_reload("unchanged");
                }
                Ok(reloaded)
            }
            Err(e) => {
                record_reload("error");
                Err(e)
            }
        }
    }

    /// Re-render after acquisitions so new certificates go live in one reload.
    async fn finish(
        &self,
        table: &mut StateTable,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        if !report.acquired() {
            return Ok(());
        }

        let states = self.observe(table)?;
        let reloaded = self.apply(table, &states, false, report).await?;

        // Renewed files keep their paths, so the render may be identical.
        if !reloaded && !report.renewed.is_empty() {
            match self.proxy.reload().await {
                Ok(()) => {
                    record_reload("reloaded");
                    report.reloads += 1;
                }
                Err(e) => {
                    record_reload("error");
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn acquire_batch(
        &self,
        table: &mut StateTable,
        jobs: Vec<(Domain, AcquireMode)>,
        report: &mut PassReport,
    ) {
        if jobs.is_empty() {
            return;
        }

        for (domain, mode) in &jobs {
            if let Some(record) = table.get_mut(&domain.name) {
                record.begin(*mode);
                record_domain_state(&domain.name, record.state);
            }
            tracing::info!(domain = %domain.name, mode = mode.as_str(), "Requesting certificate");
        }

        let limit = self.settings.acquire_timeout;

        if self.settings.concurrency <= 1 {
            for (domain, mode) in jobs {
                let result = attempt(self.acquirer.as_ref(), &self.store, &domain, mode, limit).await;
                self.settle(table, &domain.name, mode, result, report);
            }
            return;
        }

        let permits = Arc::new(Semaphore::new(self.settings.concurrency));
        let mut tasks = JoinSet::new();
        for (domain, mode) in jobs.iter().cloned() {
            let acquirer = Arc::clone(&self.acquirer);
            let store = self.store.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(
                async move {
                    let _permit = permits.acquire_owned().await;
                    let result = attempt(acquirer.as_ref(), &store, &domain, mode, limit).await;
                    (domain.name, mode, result)
                }
                .in_current_span(),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, mode, result)) => self.settle(table, &name, mode, result, report),
                Err(e) => tracing::error!(error = %e, "Acquisition task aborted"),
            }
        }

        // Records still in flight belong to tasks that never reported back.
        for (domain, mode) in jobs {
            let in_flight = table
                .get(&domain.name)
                .map(|r| matches!(r.state, DomainState::AwaitingIssuance | DomainState::Renewing))
                .unwrap_or(false);
            if in_flight {
                let err = AcquireError::Client("acquisition task aborted".to_string());
                self.settle(table, &domain.name, mode, Err(err), report);
            }
        }
    }

    fn settle(
        &self,
        table: &mut StateTable,
        name: &str,
        mode: AcquireMode,
        result: Result<(), AcquireError>,
        report: &mut PassReport,
    ) {
        let Some(record) = table.get_mut(name) else {
            return;
        };

        match result {
            Ok(()) => {
                record.succeed();
                record_acquisition(mode.as_str(), "success");
                tracing::info!(domain = %name, mode = mode.as_str(), "Certificate acquired");
                match mode {
                    AcquireMode::Issue => report.issued.push(name.to_string()),
                    AcquireMode::Renew => report.renewed.push(name.to_string()),
                }
            }
            Err(err) => {
                record_acquisition(mode.as_str(), err.kind());
                let outcome = record.fail(&err, mode, &self.settings.retry, Instant::now());
                match outcome {
                    FailureOutcome::RetryScheduled(delay) => {
                        tracing::warn!(
                            domain = %name,
                            error = %err,
                            attempt = record.failures,
                            retry_in_ms = delay.as_millis() as u64,
                            "Issuance failed, retry scheduled"
                        );
                        report.retry_scheduled.push(name.to_string());
                    }
                    FailureOutcome::Held => {
                        tracing::warn!(
                            domain = %name,
                            error = %err,
                            "Issuance held until operator intervention"
                        );
                        report.held.push(name.to_string());
                    }
                    FailureOutcome::Retained => {
                        tracing::warn!(
                            domain = %name,
                            error = %err,
                            "Renewal failed, keeping current certificate"
                        );
                        report.renewal_retained.push(name.to_string());
                    }
                    FailureOutcome::Failed => {
                        tracing::error!(
                            domain = %name,
                            error = %err,
                            mode = mode.as_str(),
                            attempts = record.failures,
                            "Domain failed, operator intervention required"
                        );
                        report.failed.push(name.to_string());
                    }
                }
            }
        }
        record_domain_state(name, record.state);
    }
}

/// One acquisition under the deadline, confirmed against the store.
async fn attempt(
    acquirer: &dyn Acquirer,
    store: &CertificateStore,
    domain: &Domain,
    mode: AcquireMode,
    limit: Duration,
) -> Result<(), AcquireError> {
    acquire_with_deadline(limit, acquirer.acquire(domain, mode)).await?;

    match store.exists(domain) {
        Ok(true) => Ok(()),
        Ok(false) => Err(AcquireError::Client(format!(
            "{} reported success but no certificate is in the store",
            mode.as_str()
        ))),
        Err(e) => Err(AcquireError::Client(e.to_string())),
    }
}
