//! Certificate acquisition through an external ACME client.
//!
//! # Challenge Flow
//!
//! 1. The orchestrator renders and reloads the proxy so that
//!    `/.well-known/acme-challenge/` is served from the webroot for the domain
//! 2. [`Acquirer::issue`] runs the client in webroot mode; the client drops the
//!    token into the webroot and the CA fetches it over plain HTTP
//! 3. The client writes `fullchain.pem` / `privkey.pem` into the store
//! 4. The orchestrator re-inspects the store and renders the HTTPS block
//!
//! Failures are classified by [`AcquireError::retry_class`].

mod acquirer;
mod certbot;
mod error;

pub use acquirer::{AcquireMode, Acquirer};
pub use certbot::CertbotAcquirer;
pub use error::{AcquireError, RetryClass};
