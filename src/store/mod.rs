//! Certificate store subsystem.
//!
//! The store is owned by the ACME client; the reconciler only reads it.
//! Inspection results are computed fresh every pass and never cached, so an
//! external renewal or a manual deletion is picked up on the next pass.

pub mod inspector;

pub use inspector::{
    cert_paths, CertPaths, CertStates, CertificateState, CertificateStore, StoreError,
    FULLCHAIN_FILE, PRIVKEY_FILE,
};
