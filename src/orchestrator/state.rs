//! Per-domain certificate state machine.
//!
//! # States
//! - NoCert: no usable certificate; HTTP-only blocks
//! - AwaitingIssuance: issue in flight
//! - Issued: certificate present; HTTPS block rendered
//! - Renewing: renew in flight (old certificate still served)
//! - Failed: non-retryable error or retry budget spent; operator must act
//!
//! # State Transitions
//! ```text
//! NoCert → AwaitingIssuance: eligible for an attempt (no hold, backoff elapsed)
//! AwaitingIssuance → Issued: client succeeded and the store has the cert
//! AwaitingIssuance → NoCert: retryable failure (backoff) or operator-class hold
//! AwaitingIssuance → Failed: invalid domain, or retries exhausted
//! Issued → Renewing: certificate inside the renewal window
//! Renewing → Issued: success, or retryable failure (old cert retained)
//! Renewing → Failed: non-retryable failure (old cert still served)
//! Issued/Renewing → NoCert: certificate vanished from the store
//! Failed/held → NoCert: operator intervention (bootstrap)
//! ```
//!
//! Nothing here is persisted. After a restart every record starts at NoCert
//! and the first inspection moves domains with certificates to Issued.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::acme::{AcquireError, AcquireMode, RetryClass};
use crate::registry::Domain;
use crate::resilience::backoff::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainState {
    NoCert,
    AwaitingIssuance,
    Issued,
    Renewing,
    Failed,
}

impl DomainState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainState::NoCert => "NO_CERT",
            DomainState::AwaitingIssuance => "AWAITING_ISSUANCE",
            DomainState::Issued => "ISSUED",
            DomainState::Renewing => "RENEWING",
            DomainState::Failed => "FAILED",
        }
    }

    /// Numeric code exported as a gauge.
    pub fn code(&self) -> f64 {
        match self {
            DomainState::NoCert => 0.0,
            DomainState::AwaitingIssuance => 1.0,
            DomainState::Issued => 2.0,
            DomainState::Renewing => 3.0,
            DomainState::Failed => 4.0,
        }
    }
}

impl std::fmt::Display for DomainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failed attempt did to the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Issuance will be retried after the delay.
    RetryScheduled(Duration),
    /// Issuance waits for an operator-triggered bootstrap.
    Held,
    /// Renewal failed; the current certificate stays and the next tick retries.
    Retained,
    /// Domain is FAILED.
    Failed,
}

/// Reconciliation bookkeeping for one domain.
#[derive(Debug, Clone)]
pub struct DomainRecord {
    pub domain: Domain,
    pub state: DomainState,
    /// Consecutive failed attempts.
    pub failures: u32,
    pub next_attempt_at: Option<Instant>,
    /// Error kind holding issuance until an operator acts.
    pub hold: Option<&'static str>,
    pub last_error: Option<AcquireError>,
    failed_mode: Option<AcquireMode>,
}

impl DomainRecord {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            state: DomainState::NoCert,
            failures: 0,
            next_attempt_at: None,
            hold: None,
            last_error: None,
            failed_mode: None,
        }
    }

    /// Reconcile with a fresh store inspection.
    pub fn observe(&mut self, exists: bool) {
        match (self.state, exists) {
            (DomainState::NoCert | DomainState::AwaitingIssuance, true) => self.succeed(),
            // A certificate placed by hand clears an issuance failure.
            (DomainState::Failed, true) if self.failed_mode == Some(AcquireMode::Issue) => {
                self.succeed()
            }
            (DomainState::Issued | DomainState::Renewing | DomainState::AwaitingIssuance, false) => {
                self.reset(DomainState::NoCert)
            }
            (DomainState::Failed, false) if self.failed_mode == Some(AcquireMode::Renew) => {
                self.reset(DomainState::NoCert)
            }
            _ => {}
        }
    }

    /// Whether issuance may be attempted now.
    pub fn ready_to_issue(&self, now: Instant) -> bool {
        self.state == DomainState::NoCert
            && self.hold.is_none()
            && self.next_attempt_at.map_or(true, |at| at <= now)
    }

    pub fn begin(&mut self, mode: AcquireMode) {
        self.state = match mode {
            AcquireMode::Issue => DomainState::AwaitingIssuance,
            AcquireMode::Renew => DomainState::Renewing,
        };
    }

    pub fn succeed(&mut self) {
        self.reset(DomainState::Issued);
    }

    /// Apply a failed attempt according to the error's retry class.
    pub fn fail(
        &mut self,
        err: &AcquireError,
        mode: AcquireMode,
        policy: &RetryPolicy,
        now: Instant,
    ) -> FailureOutcome {
        self.last_error = Some(err.clone());
        self.failures = self.failures.saturating_add(1);

        match (mode, err.retry_class()) {
            (_, RetryClass::Fatal) => {
                self.state = DomainState::Failed;
                self.failed_mode = Some(mode);
                self.next_attempt_at = None;
                FailureOutcome::Failed
            }
            (AcquireMode::Renew, _) => {
                self.state = DomainState::Issued;
                FailureOutcome::Retained
            }
            (AcquireMode::Issue, RetryClass::Operator) => {
                self.state = DomainState::NoCert;
                self.hold = Some(err.kind());
                FailureOutcome::Held
            }
            (AcquireMode::Issue, RetryClass::Backoff) => {
                if policy.exhausted(self.failures) {
                    self.state = DomainState::Failed;
                    self.failed_mode = Some(mode);
                    self.next_attempt_at = None;
                    return FailureOutcome::Failed;
                }
                let delay = policy.delay_after(self.failures);
                self.state = DomainState::NoCert;
                self.next_attempt_at = Some(now + delay);
                FailureOutcome::RetryScheduled(delay)
            }
        }
    }

    /// Operator intervention: clear holds and FAILED so the next pass retries.
    pub fn release(&mut self) {
        match self.state {
            DomainState::Failed => {
                // Renewal failures keep their certificate; inspection promotes them back.
                let next = if self.failed_mode == Some(AcquireMode::Renew) {
                    DomainState::Issued
                } else {
                    DomainState::NoCert
                };
                self.reset(next);
            }
            _ if self.hold.is_some() => {
                let state = self.state;
                self.reset(state);
            }
            _ => {}
        }
    }

    fn reset(&mut self, state: DomainState) {
        self.state = state;
        self.failures = 0;
        self.next_attempt_at = None;
        self.hold = None;
        self.last_error = None;
        self.failed_mode = None;
    }
}

/// All records for the current domain set, in registry order.
#[derive(Debug, Default)]
pub struct StateTable {
    records: Vec<DomainRecord>,
    loaded: bool,
    /// Text of the last render the proxy accepted.
    applied: Option<String>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a domain set has been loaded at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn applied(&self) -> Option<&str> {
        self.applied.as_deref()
    }

    pub fn set_applied(&mut self, text: &str) {
        self.applied = Some(text.to_string());
    }

    /// Replace the domain set, keeping records of domains that remain.
    pub fn sync(&mut self, domains: &[Domain]) {
        let mut previous = std::mem::take(&mut self.records);
        for domain in domains {
            let record = match previous.iter().position(|r| r.domain.name == domain.name) {
                Some(i) => {
                    let mut record = previous.swap_remove(i);
                    record.domain = domain.clone();
                    record
                }
                None => DomainRecord::new(domain.clone()),
            };
            self.records.push(record);
        }
        for removed in previous {
            tracing::info!(domain = %removed.domain.name, "Domain removed from registry");
        }
        self.loaded = true;
    }

    pub fn domains(&self) -> Vec<Domain> {
        self.records.iter().map(|r| r.domain.clone()).collect()
    }

    pub fn same_domains(&self, domains: &[Domain]) -> bool {
        self.records.len() == domains.len()
            && self.records.iter().zip(domains).all(|(r, d)| &r.domain == d)
    }

    pub fn get(&self, name: &str) -> Option<&DomainRecord> {
        self.records.iter().find(|r| r.domain.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DomainRecord> {
        self.records.iter_mut().find(|r| r.domain.name == name)
    }

    pub fn records(&self) -> &[DomainRecord] {
        &self.records
    }

    pub fn release_all(&mut self) {
        for record in &mut self.records {
            record.release();
        }
    }

    /// Names of domains whose issuance may run now.
    pub fn ready_to_issue(&self, now: Instant) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.ready_to_issue(now))
            .map(|r| r.domain.name.clone())
            .collect()
    }

    /// Earliest backoff deadline among domains waiting to be issued.
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.records
            .iter()
            .filter(|r| r.state == DomainState::NoCert && r.hold.is_none())
            .filter_map(|r| r.next_attempt_at)
            .min()
    }

    pub fn in_state(&self, state: DomainState) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.domain.name.clone())
            .collect()
    }
}
