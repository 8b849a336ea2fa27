//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Acquisition attempt:
//!     → timeouts.rs (every ACME call has a deadline)
//!     → On retryable failure: backoff.rs (schedule next attempt)
//!     → attempts >= max_attempts: domain marked FAILED
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; a hung client must not wedge a pass
//! - Backoff is per domain, so one domain's failures never delay another's
//! - Jittered backoff spreads retries of domains that failed together

pub mod backoff;
pub mod timeouts;
