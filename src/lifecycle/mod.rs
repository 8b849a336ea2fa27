//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build components → Bootstrap → Scheduler
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown broadcast
//!     SIGHUP → Operator bootstrap
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → scheduler finishes its pass and exits → watcher dropped
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::build_reconciler;
