//! Proxy configuration rendering.
//!
//! # Data Flow
//! ```text
//! Vec<Domain> + CertStates + GlobalOptions
//!     → nginx.rs (pure, deterministic)
//!     → RenderedConfig (whole file, deployed as one unit)
//! ```

pub mod nginx;

use std::path::PathBuf;

use crate::config::ReconcilerConfig;

pub use nginx::{render, validation_wrapper, ACME_CHALLENGE_PATH};

/// Process-wide render inputs, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalOptions {
    /// Whether the shared DH parameter file exists.
    pub dhparam_available: bool,
    pub dhparam_path: PathBuf,
    /// Certificate store root (`{root}/{domain}/fullchain.pem`).
    pub store_root: PathBuf,
    /// Directory served on the ACME challenge path.
    pub webroot: PathBuf,
    /// Static root for inactive domains.
    pub placeholder_root: PathBuf,
}

impl GlobalOptions {
    /// Build options from config, probing the DH parameter file once.
    pub fn detect(config: &ReconcilerConfig) -> Self {
        let dhparam_path = PathBuf::from(&config.store.dhparam_path);
        let dhparam_available = dhparam_path.is_file();

        tracing::info!(
            dhparam = %dhparam_path.display(),
            available = dhparam_available,
            "DH parameter detection"
        );

        Self {
            dhparam_available,
            dhparam_path,
            store_root: PathBuf::from(&config.store.root),
            webroot: PathBuf::from(&config.proxy.webroot),
            placeholder_root: PathBuf::from(&config.proxy.placeholder_root),
        }
    }
}

/// The complete proxy configuration produced by one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    text: String,
    domains: usize,
    https_blocks: usize,
}

impl RenderedConfig {
    pub fn new(text: String, domains: usize, https_blocks: usize) -> Self {
        Self {
            text,
            domains,
            https_blocks,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn domains(&self) -> usize {
        self.domains
    }

    pub fn https_blocks(&self) -> usize {
        self.https_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_missing_dhparam() {
        let mut config = ReconcilerConfig::default();
        config.store.dhparam_path = "/nonexistent/dhparam.pem".to_string();
        let opts = GlobalOptions::detect(&config);
        assert!(!opts.dhparam_available);
        assert_eq!(opts.store_root, PathBuf::from("/etc/letsencrypt/live"));
    }

    #[test]
    fn test_detect_present_dhparam() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = ReconcilerConfig::default();
        config.store.dhparam_path = file.path().display().to_string();
        assert!(GlobalOptions::detect(&config).dhparam_available);
    }
}
