//! Acquisition error taxonomy.

use std::time::Duration;

use thiserror::Error;

/// Per-domain failure of an issue or renew attempt. Never fatal to the process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquireError {
    /// CA rate limit hit; retry after backoff.
    #[error("rate limited by the certificate authority: {0}")]
    RateLimited(String),

    /// The CA could not fetch the challenge token.
    #[error("challenge endpoint unreachable: {0}")]
    ChallengeUnreachable(String),

    /// The domain does not resolve (or resolves elsewhere).
    #[error("domain does not resolve: {0}")]
    DnsNotResolvable(String),

    /// The CA refuses to issue for this identifier.
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    /// The client did not finish within its deadline.
    #[error("ACME client timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Client failed in a way that could not be classified.
    #[error("ACME client failed: {0}")]
    Client(String),
}

/// How the orchestrator should react to an `AcquireError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    /// Retry automatically after exponential backoff.
    Backoff,
    /// Hold until an operator-triggered bootstrap.
    Operator,
    /// Give up; the domain becomes FAILED.
    Fatal,
}

impl AcquireError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            AcquireError::RateLimited(_) | AcquireError::Timeout(_) | AcquireError::Client(_) => {
                RetryClass::Backoff
            }
            AcquireError::ChallengeUnreachable(_) | AcquireError::DnsNotResolvable(_) => {
                RetryClass::Operator
            }
            AcquireError::InvalidDomain(_) => RetryClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_class() == RetryClass::Backoff
    }

    pub fn needs_operator(&self) -> bool {
        self.retry_class() == RetryClass::Operator
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AcquireError::RateLimited(_) => "rate_limited",
            AcquireError::ChallengeUnreachable(_) => "challenge_unreachable",
            AcquireError::DnsNotResolvable(_) => "dns_not_resolvable",
            AcquireError::InvalidDomain(_) => "invalid_domain",
            AcquireError::Timeout(_) => "timeout",
            AcquireError::Client(_) => "client",
        }
    }

    /// Classify the diagnostic output of a failed ACME client run.
    ///
    /// Matches ACME problem types first, then the human-readable messages
    /// certbot prints for them.
    pub fn classify(output: &str) -> Self {
        let lower = output.to_ascii_lowercase();
        let detail = last_meaningful_line(output);

        if lower.contains("urn:ietf:params:acme:error:ratelimited")
            || lower.contains("too many certificates")
            || lower.contains("too many failed authorizations")
            || lower.contains("rate limit")
        {
            AcquireError::RateLimited(detail)
        } else if lower.contains("urn:ietf:params:acme:error:rejectedidentifier")
            || lower.contains("urn:ietf:params:acme:error:malformed")
            || lower.contains("invalid identifiers requested")
            || lower.contains("policy forbids issuing")
            || lower.contains("not a valid domain name")
        {
            AcquireError::InvalidDomain(detail)
        } else if lower.contains("urn:ietf:params:acme:error:dns")
            || lower.contains("dns problem")
            || lower.contains("nxdomain")
            || lower.contains("no valid ip addresses found")
        {
            AcquireError::DnsNotResolvable(detail)
        } else if lower.contains("urn:ietf:params:acme:error:connection")
            || lower.contains("urn:ietf:params:acme:error:unauthorized")
            || lower.contains("urn:ietf:params:acme:error:incorrectresponse")
            || lower.contains("timeout during connect")
            || lower.contains("connection refused")
            || lower.contains("invalid response from")
        {
            AcquireError::ChallengeUnreachable(detail)
        } else {
            AcquireError::Client(detail)
        }
    }
}

fn last_meaningful_line(output: &str) -> String {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| !l.starts_with("Ask for help") && !l.starts_with("See the logfile"))
        .last()
        .unwrap_or("no diagnostic output")
        .to_string()
}
