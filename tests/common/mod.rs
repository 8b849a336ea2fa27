//! Shared fakes and fixtures for reconciliation tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use tempfile::TempDir;
use tokio::net::TcpListener;

use tls_reconciler::acme::{AcquireError, AcquireMode, Acquirer};
use tls_reconciler::orchestrator::{ReconcileSettings, Reconciler};
use tls_reconciler::proxy::{ApplyOutcome, ProxyControl, ReloadError};
use tls_reconciler::registry::{Domain, StaticDomains};
use tls_reconciler::render::{GlobalOptions, RenderedConfig};
use tls_reconciler::resilience::backoff::RetryPolicy;
use tls_reconciler::store::{CertificateStore, FULLCHAIN_FILE, PRIVKEY_FILE};

/// Write a self-signed chain and key for `name` expiring in `days` days.
pub fn install_cert(root: &Path, name: &str, days: i64) {
    let expiry = Utc::now() + chrono::Duration::days(days);
    let mut params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(expiry.year(), expiry.month() as u8, expiry.day() as u8);
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();

    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(FULLCHAIN_FILE), cert.pem()).unwrap();
    fs::write(dir.join(PRIVKEY_FILE), key.serialize_pem()).unwrap();
}

/// Acquirer with scripted per-domain results.
///
/// Unscripted calls succeed. Successful calls install a certificate valid for
/// 90 days, the way the real client writes into the store.
pub struct FakeAcquirer {
    store_root: PathBuf,
    script: Mutex<HashMap<String, VecDeque<Result<(), AcquireError>>>>,
    calls: Mutex<Vec<(String, AcquireMode)>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    skip_install: AtomicBool,
}

impl FakeAcquirer {
    pub fn new(store_root: &Path) -> Self {
        Self {
            store_root: store_root.to_path_buf(),
            script: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            skip_install: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue the result of the next call for `name`.
    pub fn script(&self, name: &str, result: Result<(), AcquireError>) {
        self.script
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push_back(result);
    }

    /// Report success without writing anything to the store.
    pub fn succeed_without_install(&self) {
        self.skip_install.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, AcquireMode)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, name: &str) -> usize {
        self.calls().iter().filter(|(n, _)| n == name).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn run(&self, domain: &Domain, mode: AcquireMode) -> Result<(), AcquireError> {
        self.calls.lock().unwrap().push((domain.name.clone(), mode));
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .script
            .lock()
            .unwrap()
            .get_mut(&domain.name)
            .and_then(|queue| queue.pop_front());
        let result = scripted.unwrap_or(Ok(()));

        if result.is_ok() && !self.skip_install.load(Ordering::SeqCst) {
            install_cert(&self.store_root, &domain.name, 90);
        }
        result
    }
}

#[async_trait]
impl Acquirer for FakeAcquirer {
    async fn issue(&self, domain: &Domain) -> Result<(), AcquireError> {
        self.run(domain, AcquireMode::Issue).await
    }

    async fn renew(&self, domain: &Domain) -> Result<(), AcquireError> {
        self.run(domain, AcquireMode::Renew).await
    }
}

/// Proxy that records every render it is handed.
#[derive(Default)]
pub struct FakeProxy {
    applied: Mutex<Vec<String>>,
    reloads: AtomicUsize,
    reject: AtomicBool,
}

impl FakeProxy {
    pub fn reject_next(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Renders that were accepted, in order.
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn live(&self) -> Option<String> {
        self.applied().last().cloned()
    }

    /// Reloads issued without a config change.
    pub fn plain_reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyControl for FakeProxy {
    async fn apply(&self, config: &RenderedConfig) -> Result<ApplyOutcome, ReloadError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(ReloadError::Rejected {
                output: "nginx: [emerg] invalid config".to_string(),
            });
        }
        self.applied.lock().unwrap().push(config.as_str().to_string());
        Ok(ApplyOutcome::Reloaded)
    }

    async fn reload(&self) -> Result<(), ReloadError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A reconciler over a temp store with fake collaborators.
pub struct Harness {
    pub dir: TempDir,
    pub acquirer: Arc<FakeAcquirer>,
    pub proxy: Arc<FakeProxy>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new(domains: Vec<Domain>) -> Self {
        Self::build(domains, settings(), |a| a)
    }

    pub fn build(
        domains: Vec<Domain>,
        settings: ReconcileSettings,
        acquirer: impl FnOnce(FakeAcquirer) -> FakeAcquirer,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let acquirer = Arc::new(acquirer(FakeAcquirer::new(dir.path())));
        let proxy = Arc::new(FakeProxy::default());
        let reconciler = Arc::new(Reconciler::new(
            Arc::new(StaticDomains(domains)),
            CertificateStore::new(dir.path()),
            acquirer.clone(),
            proxy.clone(),
            options(dir.path()),
            settings,
        ));

        Self {
            dir,
            acquirer,
            proxy,
            reconciler,
        }
    }

    pub fn store_root(&self) -> &Path {
        self.dir.path()
    }
}

/// Fast retries so tests never wait on real backoff.
pub fn settings() -> ReconcileSettings {
    ReconcileSettings {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 5,
        },
        renew_before: chrono::Duration::days(30),
        acquire_timeout: Duration::from_secs(5),
        concurrency: 1,
    }
}

pub fn options(store_root: &Path) -> GlobalOptions {
    GlobalOptions {
        dhparam_available: false,
        dhparam_path: PathBuf::from("/etc/ssl/certs/dhparam-2048.pem"),
        store_root: store_root.to_path_buf(),
        webroot: PathBuf::from("/var/www/certbot"),
        placeholder_root: PathBuf::from("/usr/share/nginx/html"),
    }
}

/// Count `server` blocks listening on 443 that name `domain`.
pub fn https_blocks_for(config: &str, domain: &str) -> usize {
    config
        .split("server {")
        .filter(|block| block.contains("listen 443") && block.contains(&format!("server_name {}", domain)))
        .count()
}

/// Start a TCP listener that accepts and drops connections.
pub async fn start_mock_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });
    addr
}
