//! Reconciliation orchestrator.
//!
//! # Data Flow
//! ```text
//! Scheduler (timer / retry backoff / config change / SIGHUP)
//!     → Reconciler pass (one at a time)
//!         → registry → store inspection → render → proxy apply
//!         → acquirer (per domain, isolated failures)
//!         → store inspection → render → proxy apply (batched)
//!     → PassReport
//! ```
//!
//! # Design Decisions
//! - Certificate state is re-derived from the store every pass; the table only
//!   holds retry bookkeeping, so a restart resumes by re-inspection
//! - One render/apply covers every domain; partial configs are never deployed
//! - A per-domain failure never aborts the pass; store and reload failures do

pub mod reconciler;
pub mod scheduler;
pub mod state;

pub use reconciler::{DomainSnapshot, PassReport, ReconcileError, ReconcileSettings, Reconciler};
pub use scheduler::{Scheduler, Trigger};
pub use state::{DomainRecord, DomainState, FailureOutcome, StateTable};
