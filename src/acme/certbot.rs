//! certbot-backed acquirer.
//!
//! # Responsibilities
//! - Build `certbot certonly --webroot` / `certbot renew` invocations
//! - Enforce the per-invocation deadline (child is killed on timeout)
//! - Classify failures from the client's diagnostic output

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::acme::{AcquireError, AcquireMode, Acquirer};
use crate::config::{AcmeConfig, ProxyConfig};
use crate::registry::Domain;

/// Runs the certbot CLI.
#[derive(Debug, Clone)]
pub struct CertbotAcquirer {
    program: String,
    email: String,
    webroot: PathBuf,
    staging: bool,
    extra_args: Vec<String>,
    timeout: Duration,
}

impl CertbotAcquirer {
    pub fn new(acme: &AcmeConfig, proxy: &ProxyConfig) -> Self {
        Self {
            program: acme.client.clone(),
            email: acme.email.clone(),
            webroot: PathBuf::from(&proxy.webroot),
            staging: acme.staging,
            extra_args: acme.extra_args.clone(),
            timeout: Duration::from_secs(acme.timeout_secs),
        }
    }

    /// Arguments for one invocation, without the program name.
    pub fn args(&self, domain: &Domain, mode: AcquireMode) -> Vec<String> {
        let mut args = Vec::new();

        match mode {
            AcquireMode::Issue => {
                args.push("certonly".to_string());
                args.push("--webroot".to_string());
                args.push("-w".to_string());
                args.push(self.webroot.display().to_string());
                args.push("--cert-name".to_string());
                args.push(domain.name.clone());
                for name in domain.server_names() {
                    args.push("-d".to_string());
                    args.push(name.to_string());
                }
                args.push("--email".to_string());
                args.push(self.email.clone());
                args.push("--agree-tos".to_string());
                args.push("--no-eff-email".to_string());
            }
            AcquireMode::Renew => {
                args.push("renew".to_string());
                args.push("--cert-name".to_string());
                args.push(domain.name.clone());
                args.push("--force-renewal".to_string());
            }
        }

        args.push("--non-interactive".to_string());
        if self.staging {
            args.push("--staging".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    async fn run(&self, domain: &Domain, mode: AcquireMode) -> Result<(), AcquireError> {
        let args = self.args(domain, mode);

        tracing::info!(
            domain = %domain.name,
            mode = mode.as_str(),
            program = %self.program,
            "Invoking ACME client"
        );

        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(AcquireError::Client(format!(
                    "failed to run {}: {}",
                    self.program, e
                )))
            }
            Err(_) => return Err(AcquireError::Timeout(self.timeout)),
        };

        if output.status.success() {
            tracing::debug!(domain = %domain.name, mode = mode.as_str(), "ACME client succeeded");
            return Ok(());
        }

        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        diagnostics.push('\n');
        diagnostics.push_str(&String::from_utf8_lossy(&output.stdout));

        let err = AcquireError::classify(&diagnostics);
        tracing::warn!(
            domain = %domain.name,
            mode = mode.as_str(),
            status = %output.status,
            kind = err.kind(),
            "ACME client failed"
        );
        Err(err)
    }
}

#[async_trait]
impl Acquirer for CertbotAcquirer {
    async fn issue(&self, domain: &Domain) -> Result<(), AcquireError> {
        self.run(domain, AcquireMode::Issue).await
    }

    async fn renew(&self, domain: &Domain) -> Result<(), AcquireError> {
        self.run(domain, AcquireMode::Renew).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acquirer(program: &str, timeout_secs: u64) -> CertbotAcquirer {
        let acme = AcmeConfig {
            email: "ops@a.example".to_string(),
            client: program.to_string(),
            timeout_secs,
            ..AcmeConfig::default()
        };
        CertbotAcquirer::new(&acme, &ProxyConfig::default())
    }

    #[test]
    fn test_issue_args() {
        let domain = Domain::new("a.example", "http://app:3000", true)
            .with_aliases(vec!["www.a.example".to_string()]);
        let args = acquirer("certbot", 300).args(&domain, AcquireMode::Issue);

        assert_eq!(
            args,
            vec![
                "certonly", "--webroot", "-w", "/var/www/certbot", "--cert-name", "a.example",
                "-d", "a.example", "-d", "www.a.example", "--email", "ops@a.example",
                "--agree-tos", "--no-eff-email", "--non-interactive",
            ]
        );
    }

    #[test]
    fn test_renew_args_with_staging() {
        let mut acq = acquirer("certbot", 300);
        acq.staging = true;
        acq.extra_args = vec!["--quiet".to_string()];
        let args = acq.args(&Domain::new("a.example", "http://app:3000", true), AcquireMode::Renew);

        assert_eq!(
            args,
            vec![
                "renew", "--cert-name", "a.example", "--force-renewal", "--non-interactive",
                "--staging", "--quiet",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_client_error() {
        let acq = acquirer("/nonexistent/certbot", 5);
        let err = acq
            .issue(&Domain::new("a.example", "http://app:3000", true))
            .await
            .unwrap_err();
        assert!(matches!(err, AcquireError::Client(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_run_is_classified() {
        // `false` ignores its arguments and exits 1 with no output.
        let acq = acquirer("false", 5);
        let err = acq
            .renew(&Domain::new("a.example", "http://app:3000", true))
            .await
            .unwrap_err();
        assert_eq!(err, AcquireError::Client("no diagnostic output".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run() {
        let acq = acquirer("true", 5);
        assert!(acq
            .issue(&Domain::new("a.example", "http://app:3000", true))
            .await
            .is_ok());
    }
}
