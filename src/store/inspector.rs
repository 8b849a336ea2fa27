//! Certificate store inspection.
//!
//! # Layout
//!
//! ```text
//! {root}/
//! └── a.example/
//!     ├── fullchain.pem   # leaf + intermediates
//!     └── privkey.pem     # private key
//! ```
//!
//! A certificate "exists" when both files are present and parse. A missing
//! file is the normal state before first issuance and yields `false`; every
//! other read or parse failure is a `StoreError`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use thiserror::Error;

use crate::registry::Domain;

pub const FULLCHAIN_FILE: &str = "fullchain.pem";
pub const PRIVKEY_FILE: &str = "privkey.pem";

/// Errors raised while reading the certificate store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unexpected filesystem failure (permissions, I/O).
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File present but not usable (partial write, wrong content).
    #[error("corrupt certificate material at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Certificate and key locations for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPaths {
    pub fullchain: PathBuf,
    pub privkey: PathBuf,
}

/// The path convention shared by the inspector and the renderer.
pub fn cert_paths(root: &Path, name: &str) -> CertPaths {
    let dir = root.join(name);
    CertPaths {
        fullchain: dir.join(FULLCHAIN_FILE),
        privkey: dir.join(PRIVKEY_FILE),
    }
}

/// Certificate presence derived for one domain during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateState {
    pub domain: Domain,
    pub exists: bool,
}

/// Per-pass certificate presence keyed by domain name.
///
/// Unknown names read as absent, so a domain is never rendered with HTTPS
/// unless it was inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertStates {
    inner: HashMap<String, bool>,
}

impl CertStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, exists: bool) {
        self.inner.insert(name.into(), exists);
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.get(name).copied().unwrap_or(false)
    }
}

impl FromIterator<CertificateState> for CertStates {
    fn from_iter<I: IntoIterator<Item = CertificateState>>(iter: I) -> Self {
        let mut states = CertStates::new();
        for state in iter {
            states.set(state.domain.name, state.exists);
        }
        states
    }
}

impl<'a> FromIterator<(&'a str, bool)> for CertStates {
    fn from_iter<I: IntoIterator<Item = (&'a str, bool)>>(iter: I) -> Self {
        let mut states = CertStates::new();
        for (name, exists) in iter {
            states.set(name, exists);
        }
        states
    }
}

/// Read-only view of the on-disk certificate store.
#[derive(Debug, Clone)]
pub struct CertificateStore {
    root: PathBuf,
}

impl CertificateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paths(&self, domain: &Domain) -> CertPaths {
        cert_paths(&self.root, &domain.name)
    }

    /// Whether a usable certificate chain and key exist for the domain.
    pub fn exists(&self, domain: &Domain) -> Result<bool, StoreError> {
        Ok(self.load_leaf_expiry(domain)?.is_some())
    }

    /// Inspect every domain, failing on the first unexpected store error.
    pub fn inspect(&self, domains: &[Domain]) -> Result<Vec<CertificateState>, StoreError> {
        domains
            .iter()
            .map(|domain| {
                Ok(CertificateState {
                    domain: domain.clone(),
                    exists: self.exists(domain)?,
                })
            })
            .collect()
    }

    /// Expiry of the leaf certificate, `None` if no certificate exists.
    pub fn expires_at(&self, domain: &Domain) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.load_leaf_expiry(domain)
    }

    /// Whether the certificate expires within `renew_before` of `now`.
    ///
    /// A missing certificate is an issuance concern, not a renewal one.
    pub fn needs_renewal(
        &self,
        domain: &Domain,
        renew_before: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let Some(expires) = self.load_leaf_expiry(domain)? else {
            return Ok(false);
        };

        let due = expires <= now + renew_before;
        if due {
            tracing::debug!(domain = %domain.name, expires = %expires, "Certificate due for renewal");
        } else {
            tracing::trace!(domain = %domain.name, expires = %expires, "Certificate still valid");
        }
        Ok(due)
    }

    fn load_leaf_expiry(&self, domain: &Domain) -> Result<Option<DateTime<Utc>>, StoreError> {
        let paths = self.paths(domain);

        let Some(chain) = read_optional(&paths.fullchain)? else {
            tracing::trace!(domain = %domain.name, "No certificate chain in store");
            return Ok(None);
        };
        let Some(key) = read_optional(&paths.privkey)? else {
            tracing::trace!(domain = %domain.name, "No private key in store");
            return Ok(None);
        };

        let expires = parse_chain(&paths.fullchain, &chain)?;
        check_private_key(&paths.privkey, &key)?;
        Ok(Some(expires))
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn corrupt(path: &Path, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse every certificate in the chain and return the leaf's notAfter.
fn parse_chain(path: &Path, pem: &[u8]) -> Result<DateTime<Utc>, StoreError> {
    let mut reader = pem;
    let mut leaf_expiry = None;

    for item in rustls_pemfile::certs(&mut reader) {
        let der = item.map_err(|e| corrupt(path, e.to_string()))?;
        let (_, cert) = x509_parser::parse_x509_certificate(der.as_ref())
            .map_err(|e| corrupt(path, format!("invalid X.509 certificate: {}", e)))?;

        if leaf_expiry.is_none() {
            let not_after = cert.validity().not_after.timestamp();
            let expires = DateTime::<Utc>::from_timestamp(not_after, 0)
                .ok_or_else(|| corrupt(path, "notAfter out of range"))?;
            leaf_expiry = Some(expires);
        }
    }

    leaf_expiry.ok_or_else(|| corrupt(path, "no certificates found"))
}

fn check_private_key(path: &Path, pem: &[u8]) -> Result<(), StoreError> {
    let mut reader = pem;
    match rustls_pemfile::private_key(&mut reader) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(corrupt(path, "no private key found")),
        Err(e) => Err(corrupt(path, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn self_signed(name: &str, year: i32) -> (String, String) {
        let mut params = rcgen::CertificateParams::new(vec![name.to_string()]).unwrap();
        params.not_after = rcgen::date_time_ymd(year, 6, 1);
        let key = rcgen::KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key.serialize_pem())
    }

    fn install(root: &Path, name: &str, chain: &str, key: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(FULLCHAIN_FILE), chain).unwrap();
        fs::write(dir.join(PRIVKEY_FILE), key).unwrap();
    }

    fn domain(name: &str) -> Domain {
        Domain::new(name, "http://app:3000", true)
    }

    #[test]
    fn test_cert_paths_convention() {
        let paths = cert_paths(Path::new("/etc/letsencrypt/live"), "a.example");
        assert_eq!(paths.fullchain, PathBuf::from("/etc/letsencrypt/live/a.example/fullchain.pem"));
        assert_eq!(paths.privkey, PathBuf::from("/etc/letsencrypt/live/a.example/privkey.pem"));
    }

    #[test]
    fn test_missing_certificate_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let store = CertificateStore::new(dir.path());
        assert!(!store.exists(&domain("a.example")).unwrap());
    }

    #[test]
    fn test_missing_key_means_absent() {
        let dir = TempDir::new().unwrap();
        let (chain, _) = self_signed("a.example", 2090);
        let cert_dir = dir.path().join("a.example");
        fs::create_dir_all(&cert_dir).unwrap();
        fs::write(cert_dir.join(FULLCHAIN_FILE), chain).unwrap();

        let store = CertificateStore::new(dir.path());
        assert!(!store.exists(&domain("a.example")).unwrap());
    }

    #[test]
    fn test_valid_certificate_exists() {
        let dir = TempDir::new().unwrap();
        let (chain, key) = self_signed("a.example", 2090);
        install(dir.path(), "a.example", &chain, &key);

        let store = CertificateStore::new(dir.path());
        assert!(store.exists(&domain("a.example")).unwrap());

        let expires = store.expires_at(&domain("a.example")).unwrap().unwrap();
        assert_eq!(expires, Utc.with_ymd_and_hms(2090, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_truncated_chain_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let (chain, key) = self_signed("a.example", 2090);
        install(dir.path(), "a.example", &chain[..chain.len() / 2], &key);

        let store = CertificateStore::new(dir.path());
        let err = store.exists(&domain("a.example")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_key_without_pem_block_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let (chain, _) = self_signed("a.example", 2090);
        install(dir.path(), "a.example", &chain, "not a key\n");

        let store = CertificateStore::new(dir.path());
        let err = store.exists(&domain("a.example")).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_chain_is_io_error() {
        // A directory where a file is expected fails with something other than NotFound.
        let dir = TempDir::new().unwrap();
        let cert_dir = dir.path().join("a.example");
        fs::create_dir_all(cert_dir.join(FULLCHAIN_FILE)).unwrap();

        let store = CertificateStore::new(dir.path());
        let err = store.exists(&domain("a.example")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_needs_renewal_window() {
        let dir = TempDir::new().unwrap();
        let (chain, key) = self_signed("a.example", 2030);
        install(dir.path(), "a.example", &chain, &key);
        let store = CertificateStore::new(dir.path());
        let d = domain("a.example");

        let far = Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap();
        let close = Utc.with_ymd_and_hms(2030, 5, 20, 0, 0, 0).unwrap();

        assert!(!store.needs_renewal(&d, ChronoDuration::days(30), far).unwrap());
        assert!(store.needs_renewal(&d, ChronoDuration::days(30), close).unwrap());
        assert!(!store.needs_renewal(&domain("b.example"), ChronoDuration::days(30), close).unwrap());
    }

    #[test]
    fn test_inspect_collects_states() {
        let dir = TempDir::new().unwrap();
        let (chain, key) = self_signed("a.example", 2090);
        install(dir.path(), "a.example", &chain, &key);
        let store = CertificateStore::new(dir.path());

        let states: CertStates = store
            .inspect(&[domain("a.example"), domain("b.example")])
            .unwrap()
            .into_iter()
            .collect();
        assert!(states.exists("a.example"));
        assert!(!states.exists("b.example"));
        assert!(!states.exists("unknown.example"));
    }
}
