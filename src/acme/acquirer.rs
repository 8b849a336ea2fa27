//! Certificate acquisition interface.

use async_trait::async_trait;

use crate::acme::AcquireError;
use crate::registry::Domain;

/// Whether a certificate is being obtained for the first time or replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquireMode {
    Issue,
    Renew,
}

impl AcquireMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquireMode::Issue => "issue",
            AcquireMode::Renew => "renew",
        }
    }
}

/// Obtains certificates for a domain from an ACME CA.
///
/// Callers must only invoke this once the proxy is serving the domain's
/// challenge path. On success the certificate is in the store.
#[async_trait]
pub trait Acquirer: Send + Sync {
    /// Request a new certificate via HTTP-01.
    async fn issue(&self, domain: &Domain) -> Result<(), AcquireError>;

    /// Replace an existing certificate.
    async fn renew(&self, domain: &Domain) -> Result<(), AcquireError>;

    async fn acquire(&self, domain: &Domain, mode: AcquireMode) -> Result<(), AcquireError> {
        match mode {
            AcquireMode::Issue => self.issue(domain).await,
            AcquireMode::Renew => self.renew(domain).await,
        }
    }
}
