//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Domain names are well-formed and unique across names and aliases
//! - Upstreams are absolute http(s) URLs
//! - Validate value ranges (timeouts > 0, backoff bounds ordered)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ReconcilerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use url::Url;

use crate::config::schema::{ReconcilerConfig, CONFIG_PLACEHOLDER};

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g. `domains[1].upstream`).
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ReconcilerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_domains(config, &mut errors);

    if config.acme.email.trim().is_empty() {
        errors.push(ValidationError::new("acme.email", "must not be empty"));
    }
    if config.acme.client.trim().is_empty() {
        errors.push(ValidationError::new("acme.client", "must not be empty"));
    }
    if config.acme.timeout_secs == 0 {
        errors.push(ValidationError::new("acme.timeout_secs", "must be greater than 0"));
    }
    if config.acme.concurrency == 0 {
        errors.push(ValidationError::new("acme.concurrency", "must be greater than 0"));
    }

    if config.proxy.validate_command.is_empty() {
        errors.push(ValidationError::new("proxy.validate_command", "must not be empty"));
    } else if !config
        .proxy
        .validate_command
        .iter()
        .any(|arg| arg.contains(CONFIG_PLACEHOLDER))
    {
        errors.push(ValidationError::new(
            "proxy.validate_command",
            format!("must reference the staged config via {}", CONFIG_PLACEHOLDER),
        ));
    }
    if config.proxy.reload_command.is_empty() {
        errors.push(ValidationError::new("proxy.reload_command", "must not be empty"));
    }
    if config.proxy.command_timeout_secs == 0 {
        errors.push(ValidationError::new("proxy.command_timeout_secs", "must be greater than 0"));
    }

    if config.renewal.interval_secs == 0 {
        errors.push(ValidationError::new("renewal.interval_secs", "must be greater than 0"));
    }

    if config.retry.max_attempts == 0 {
        errors.push(ValidationError::new("retry.max_attempts", "must be greater than 0"));
    }
    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        errors.push(ValidationError::new(
            "retry.base_delay_ms",
            "must not exceed retry.max_delay_ms",
        ));
    }

    if config.probe.enabled && config.probe.timeout_ms == 0 {
        errors.push(ValidationError::new("probe.timeout_ms", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_domains(config: &ReconcilerConfig, errors: &mut Vec<ValidationError>) {
    // Names and aliases share one namespace: nginx would reject a server_name
    // claimed by two blocks on the same port.
    let mut seen: HashSet<&str> = HashSet::new();

    for (i, entry) in config.domains.iter().enumerate() {
        let field = format!("domains[{}]", i);

        if let Err(reason) = check_hostname(&entry.name) {
            errors.push(ValidationError::new(format!("{}.name", field), reason));
        }
        if !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate domain '{}'", entry.name),
            ));
        }

        for (j, alias) in entry.aliases.iter().enumerate() {
            if let Err(reason) = check_hostname(alias) {
                errors.push(ValidationError::new(format!("{}.aliases[{}]", field, j), reason));
            }
            if !seen.insert(alias.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.aliases[{}]", field, j),
                    format!("duplicate domain '{}'", alias),
                ));
            }
        }

        if let Err(reason) = check_upstream(&entry.upstream) {
            errors.push(ValidationError::new(format!("{}.upstream", field), reason));
        }
    }
}

/// Lowercase RFC 1123 hostname with at least two labels.
pub fn check_hostname(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.len() > 253 {
        return Err(format!("'{}' exceeds 253 characters", name));
    }
    if !name.contains('.') {
        return Err(format!("'{}' is not a fully qualified name", name));
    }
    for label in name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(format!("'{}' has an empty or oversized label", name));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!("'{}' has a label starting or ending with '-'", name));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(format!("'{}' must contain only lowercase letters, digits and '-'", name));
        }
    }
    Ok(())
}

fn check_upstream(upstream: &str) -> Result<(), String> {
    let url = Url::parse(upstream).map_err(|e| format!("'{}' is not a valid URL: {}", upstream, e))?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported scheme '{}'", other)),
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", upstream));
    }
    Ok(())
}
