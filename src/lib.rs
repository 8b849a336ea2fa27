//! TLS certificate reconciler for an nginx front proxy.
//!
//! Keeps every configured domain reachable over HTTP (ACME challenge path)
//! and drives it towards HTTPS: render → reload → acquire → render → reload.

// Inputs
pub mod config;
pub mod registry;
pub mod store;

// Outputs and external collaborators
pub mod acme;
pub mod proxy;
pub mod render;

// Control flow
pub mod orchestrator;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ReconcilerConfig;
pub use lifecycle::Shutdown;
pub use orchestrator::{PassReport, Reconciler};
