//! Metrics collection and exposition.
//!
//! # Metrics
//! - `reconciler_passes_total` (counter): passes by kind, outcome
//! - `reconciler_acquisitions_total` (counter): ACME runs by mode, outcome
//! - `reconciler_reloads_total` (counter): proxy applies by outcome
//! - `reconciler_domain_state` (gauge): per-domain state code
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until `init_metrics` installs an exporter
//! - Labels stay low-cardinality except the per-domain gauge

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::orchestrator::DomainState;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_pass(kind: &'static str, outcome: &'static str) {
    metrics::counter!("reconciler_passes_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_acquisition(mode: &'static str, outcome: &'static str) {
    metrics::counter!("reconciler_acquisitions_total", "mode" => mode, "outcome" => outcome)
        .increment(1);
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("reconciler_reloads_total", "outcome" => outcome).increment(1);
}

pub fn record_domain_state(domain: &str, state: DomainState) {
    metrics::gauge!("reconciler_domain_state", "domain" => domain.to_string()).set(state.code());
}
