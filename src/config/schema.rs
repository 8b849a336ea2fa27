//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the reconciler,
//! including the domain registry. All types derive Serde traits for
//! deserialization from the TOML config file.

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the staged wrapper path in `proxy.validate_command`.
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// Root configuration for the reconciler.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Managed domains, in render order.
    pub domains: Vec<DomainEntry>,

    /// On-disk certificate store layout.
    pub store: StoreConfig,

    /// Reverse proxy integration (config path, validate/reload commands).
    pub proxy: ProxyConfig,

    /// ACME client settings.
    pub acme: AcmeConfig,

    /// Renewal timer settings.
    pub renewal: RenewalConfig,

    /// Backoff for retryable acquisition failures.
    pub retry: RetryConfig,

    /// Upstream reachability probe.
    pub probe: ProbeConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// One entry of the domain registry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DomainEntry {
    /// Primary domain name; also the certificate name in the store.
    pub name: String,

    /// Upstream URL the HTTPS block proxies to (e.g. "http://app:3000").
    pub upstream: String,

    /// Whether the upstream is live. Inactive domains keep their certificate
    /// but serve a placeholder instead of proxying.
    #[serde(default = "default_active")]
    pub active: bool,

    /// Extra server names covered by the same certificate.
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn default_active() -> bool {
    true
}

/// Certificate store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root holding one directory per certificate name.
    pub root: String,

    /// Shared Diffie-Hellman parameter file, referenced only if present.
    pub dhparam_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: "/etc/letsencrypt/live".to_string(),
            dhparam_path: "/etc/ssl/certs/dhparam-2048.pem".to_string(),
        }
    }
}

/// Reverse proxy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Live config file the proxy includes.
    pub config_path: String,

    /// Directory served for `/.well-known/acme-challenge/`.
    pub webroot: String,

    /// Static root served by HTTPS blocks of inactive domains.
    pub placeholder_root: String,

    /// Dry-run check; `{config}` is replaced by the staged wrapper path.
    pub validate_command: Vec<String>,

    /// Graceful reload command.
    pub reload_command: Vec<String>,

    /// Deadline for each validate/reload command in seconds.
    pub command_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: "/etc/nginx/conf.d/nginx.conf".to_string(),
            webroot: "/var/www/certbot".to_string(),
            placeholder_root: "/usr/share/nginx/html".to_string(),
            validate_command: vec![
                "nginx".to_string(),
                "-t".to_string(),
                "-q".to_string(),
                "-c".to_string(),
                CONFIG_PLACEHOLDER.to_string(),
            ],
            reload_command: vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()],
            command_timeout_secs: 30,
        }
    }
}

/// ACME client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcmeConfig {
    /// Contact email registered with the CA.
    pub email: String,

    /// ACME client executable.
    pub client: String,

    /// Use the CA's staging environment.
    pub staging: bool,

    /// Deadline for a single issue/renew invocation in seconds.
    pub timeout_secs: u64,

    /// Maximum concurrent acquisitions within one pass (1 = sequential).
    pub concurrency: usize,

    /// Extra arguments appended to every client invocation.
    pub extra_args: Vec<String>,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            client: "certbot".to_string(),
            staging: false,
            timeout_secs: 300,
            concurrency: 1,
            extra_args: Vec::new(),
        }
    }
}

/// Renewal timer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Interval between renewal passes in seconds.
    pub interval_secs: u64,

    /// Renew when the certificate expires within this many days.
    pub renew_before_days: u32,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            interval_secs: 12 * 3600,
            renew_before_days: 30,
        }
    }
}

/// Retry configuration for acquisition failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed attempts allowed before a domain is marked FAILED.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 60_000,
            max_delay_ms: 3_600_000,
        }
    }
}

/// Upstream probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Demote active domains whose upstream refuses connections.
    pub enabled: bool,

    /// TCP connect timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout_ms: 1000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ReconcilerConfig = toml::from_str(
            r#"
            [acme]
            email = "ops@a.example"

            [[domains]]
            name = "a.example"
            upstream = "http://app:3000"
            "#,
        )
        .unwrap();

        assert_eq!(config.domains.len(), 1);
        assert!(config.domains[0].active);
        assert!(config.domains[0].aliases.is_empty());
        assert_eq!(config.store.root, "/etc/letsencrypt/live");
        assert_eq!(config.acme.client, "certbot");
        assert_eq!(config.acme.concurrency, 1);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_parses_lowercase() {
        let config: ReconcilerConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}
