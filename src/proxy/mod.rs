//! Reverse proxy control.
//!
//! # Design Decisions
//! - The whole config file is one unit: validated, swapped and reloaded together
//! - Validation runs against a staged copy, never the live path
//! - Unchanged renders do not reload (reload is disruptive)

pub mod reload;

pub use reload::{ApplyOutcome, NginxControl, ProxyControl, ReloadError};
