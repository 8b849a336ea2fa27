//! Domain registry.
//!
//! # Data Flow
//! ```text
//! config file [[domains]]
//!     → config::loader (parse + validate, all errors collected)
//!     → DomainRegistry::load (source order preserved)
//!     → probe.rs (optional: demote unreachable upstreams for this pass)
//!     → orchestrator
//! ```

pub mod domain;
pub mod probe;

use std::path::{Path, PathBuf};

use crate::config::{load_config, ConfigError, ReconcilerConfig};

pub use domain::Domain;
pub use probe::UpstreamProbe;

/// Loads the managed domain set from the configuration file.
#[derive(Debug, Clone)]
pub struct DomainRegistry {
    path: PathBuf,
}

impl DomainRegistry {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Read the configuration file and return its domains in file order.
    ///
    /// Fails on malformed files and on duplicated names.
    pub fn load(&self) -> Result<Vec<Domain>, ConfigError> {
        let config = load_config(&self.path)?;
        Ok(domains_from_config(&config))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Where a reconciliation pass reads the managed domain set from.
pub trait DomainSource: Send + Sync {
    fn load(&self) -> Result<Vec<Domain>, ConfigError>;
}

impl DomainSource for DomainRegistry {
    fn load(&self) -> Result<Vec<Domain>, ConfigError> {
        DomainRegistry::load(self)
    }
}

/// A fixed domain set, for one-shot tooling and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDomains(pub Vec<Domain>);

impl DomainSource for StaticDomains {
    fn load(&self) -> Result<Vec<Domain>, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Domains of an already validated configuration.
pub fn domains_from_config(config: &ReconcilerConfig) -> Vec<Domain> {
    config.domains.iter().map(Domain::from).collect()
}
