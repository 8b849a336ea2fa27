//! Component wiring.
//!
//! Subsystems are built in dependency order from one validated config:
//! store → renderer options → acquirer → proxy control → reconciler.

use std::path::Path;
use std::sync::Arc;

use crate::acme::CertbotAcquirer;
use crate::config::ReconcilerConfig;
use crate::orchestrator::{ReconcileSettings, Reconciler};
use crate::proxy::NginxControl;
use crate::registry::{DomainRegistry, UpstreamProbe};
use crate::render::GlobalOptions;
use crate::store::CertificateStore;

/// Build the production reconciler: certbot for ACME, nginx for the proxy.
///
/// `config_path` is re-read on every bootstrap for the domain set.
pub fn build_reconciler(config_path: &Path, config: &ReconcilerConfig) -> Reconciler {
    let store = CertificateStore::new(&config.store.root);
    let options = GlobalOptions::detect(config);
    let acquirer = CertbotAcquirer::new(&config.acme, &config.proxy);
    let proxy = NginxControl::new(&config.proxy);

    tracing::info!(
        store = %store.root().display(),
        proxy_config = %proxy.config_path().display(),
        acme_client = %config.acme.client,
        staging = config.acme.staging,
        "Reconciler components initialized"
    );

    Reconciler::new(
        Arc::new(DomainRegistry::new(config_path)),
        store,
        Arc::new(acquirer),
        Arc::new(proxy),
        options,
        ReconcileSettings::from_config(config),
    )
    .with_probe(UpstreamProbe::new(&config.probe))
}
