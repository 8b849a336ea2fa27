//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ReconcilerConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → registry reloads [[domains]]
//!     → scheduler starts a bootstrap pass if the domain set differs
//! ```
//!
//! # Design Decisions
//! - Daemon settings are read once at startup; only the domain set hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AcmeConfig, DomainEntry, LogFormat, ObservabilityConfig, ProbeConfig, ProxyConfig,
    ReconcilerConfig, RenewalConfig, RetryConfig, StoreConfig,
};
