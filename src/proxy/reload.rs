//! Validated config swap and graceful reload.
//!
//! # Sequence
//! ```text
//! rendered text
//!     → identical to live file (and already reloaded once)? → Unchanged
//!     → write {config}.staged + {config}.validate (wrapper including staged)
//!     → validate command (dry run)   ── fails → remove staged, Rejected
//!     → rename staged → live (atomic on the same filesystem)
//!     → reload command               ── fails → Signal
//! ```
//!
//! The live path only ever receives text the proxy accepted.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;

use crate::config::schema::{ProxyConfig, CONFIG_PLACEHOLDER};
use crate::render::{validation_wrapper, RenderedConfig};

/// Failure to validate, install or reload proxy configuration.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The dry run rejected the render; the live config was not touched.
    #[error("proxy rejected rendered config: {output}")]
    Rejected { output: String },

    /// The proxy did not accept the reload signal.
    #[error("proxy reload failed: {output}")]
    Signal { output: String },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Result of a successful apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Live config already matches; no reload issued.
    Unchanged,
    /// New config installed and the proxy reloaded.
    Reloaded,
}

/// Installs rendered configuration into the running proxy.
#[async_trait]
pub trait ProxyControl: Send + Sync {
    /// Validate, swap in and reload `config` as one unit.
    async fn apply(&self, config: &RenderedConfig) -> Result<ApplyOutcome, ReloadError>;

    /// Reload without changing the config, e.g. after certificate files changed.
    async fn reload(&self) -> Result<(), ReloadError>;
}

/// nginx driven through its CLI.
#[derive(Debug)]
pub struct NginxControl {
    config_path: PathBuf,
    validate_command: Vec<String>,
    reload_command: Vec<String>,
    timeout: Duration,
    reloaded_once: AtomicBool,
}

impl NginxControl {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            config_path: PathBuf::from(&config.config_path),
            validate_command: config.validate_command.clone(),
            reload_command: config.reload_command.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
            reloaded_once: AtomicBool::new(false),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.config_path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Path the render is staged at before validation.
    pub fn staged_path(&self) -> PathBuf {
        self.sibling(".staged")
    }

    fn wrapper_path(&self) -> PathBuf {
        self.sibling(".validate")
    }

    /// Dry-run the staged render through the validate command.
    pub async fn validate(&self, staged: &Path) -> Result<(), ReloadError> {
        let wrapper = self.wrapper_path();
        write_file(&wrapper, &validation_wrapper(staged)).await?;

        let wrapper_str = wrapper.display().to_string();
        let command: Vec<String> = self
            .validate_command
            .iter()
            .map(|arg| arg.replace(CONFIG_PLACEHOLDER, &wrapper_str))
            .collect();

        let result = run_command(&command, self.timeout).await;
        let _ = fs::remove_file(&wrapper).await;

        match result? {
            (true, _) => Ok(()),
            (false, output) => Err(ReloadError::Rejected { output }),
        }
    }

    async fn live_matches(&self, text: &str) -> bool {
        match fs::read_to_string(&self.config_path).await {
            Ok(current) => current == text,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ProxyControl for NginxControl {
    async fn apply(&self, config: &RenderedConfig) -> Result<ApplyOutcome, ReloadError> {
        // The first apply always reloads: a previous process may have written
        // the file and died before signalling.
        if self.reloaded_once.load(Ordering::SeqCst) && self.live_matches(config.as_str()).await {
            tracing::debug!(path = %self.config_path.display(), "Rendered config unchanged");
            return Ok(ApplyOutcome::Unchanged);
        }

        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| ReloadError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let staged = self.staged_path();
        write_file(&staged, config.as_str()).await?;

        if let Err(e) = self.validate(&staged).await {
            let _ = fs::remove_file(&staged).await;
            tracing::error!(error = %e, "Rendered config rejected, keeping previous config");
            return Err(e);
        }

        fs::rename(&staged, &self.config_path)
            .await
            .map_err(|source| ReloadError::Io {
                path: self.config_path.clone(),
                source,
            })?;

        self.reload().await?;

        tracing::info!(
            path = %self.config_path.display(),
            domains = config.domains(),
            https_blocks = config.https_blocks(),
            "Proxy config installed and reloaded"
        );
        Ok(ApplyOutcome::Reloaded)
    }

    async fn reload(&self) -> Result<(), ReloadError> {
        match run_command(&self.reload_command, self.timeout).await? {
            (true, _) => {
                self.reloaded_once.store(true, Ordering::SeqCst);
                Ok(())
            }
            (false, output) => Err(ReloadError::Signal { output }),
        }
    }
}

async fn write_file(path: &Path, contents: &str) -> Result<(), ReloadError> {
    fs::write(path, contents).await.map_err(|source| ReloadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Run `command`, returning (success, combined output).
async fn run_command(command: &[String], limit: Duration) -> Result<(bool, String), ReloadError> {
    let shown = command.join(" ");
    let Some((program, args)) = command.split_first() else {
        return Err(ReloadError::Spawn {
            command: shown,
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match timeout(limit, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ReloadError::Spawn { command: shown, source }),
        Err(_) => {
            return Err(ReloadError::Timeout {
                command: shown,
                timeout: limit,
            })
        }
    };

    let mut text = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(stdout.trim());
    }

    tracing::debug!(command = %shown, status = %output.status, "Proxy command finished");
    Ok((output.status.success(), text))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn control(dir: &TempDir, validate: &[&str], reload: &[&str]) -> NginxControl {
        let config = ProxyConfig {
            config_path: dir.path().join("conf.d/nginx.conf").display().to_string(),
            validate_command: validate.iter().map(|s| s.to_string()).collect(),
            reload_command: reload.iter().map(|s| s.to_string()).collect(),
            command_timeout_secs: 5,
            ..ProxyConfig::default()
        };
        NginxControl::new(&config)
    }

    fn rendered(text: &str) -> RenderedConfig {
        RenderedConfig::new(text.to_string(), 1, 0)
    }

    #[tokio::test]
    async fn test_apply_installs_and_reloads() {
        let dir = TempDir::new().unwrap();
        let nginx = control(&dir, &["test", "-f", "{config}"], &["true"]);

        let outcome = nginx.apply(&rendered("server {}\n")).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Reloaded);
        assert_eq!(std::fs::read_to_string(nginx.config_path()).unwrap(), "server {}\n");
        assert!(!nginx.staged_path().exists());
        assert!(!nginx.wrapper_path().exists());
    }

    #[tokio::test]
    async fn test_unchanged_config_skips_reload() {
        let dir = TempDir::new().unwrap();
        let nginx = control(&dir, &["test", "-f", "{config}"], &["true"]);

        assert_eq!(nginx.apply(&rendered("a\n")).await.unwrap(), ApplyOutcome::Reloaded);
        assert_eq!(nginx.apply(&rendered("a\n")).await.unwrap(), ApplyOutcome::Unchanged);
        assert_eq!(nginx.apply(&rendered("b\n")).await.unwrap(), ApplyOutcome::Reloaded);
    }

    #[tokio::test]
    async fn test_first_apply_reloads_even_if_file_matches() {
        let dir = TempDir::new().unwrap();
        let nginx = control(&dir, &["test", "-f", "{config}"], &["true"]);
        std::fs::create_dir_all(nginx.config_path().parent().unwrap()).unwrap();
        std::fs::write(nginx.config_path(), "a\n").unwrap();

        assert_eq!(nginx.apply(&rendered("a\n")).await.unwrap(), ApplyOutcome::Reloaded);
    }

    #[tokio::test]
    async fn test_rejected_config_never_reaches_live_path() {
        let dir = TempDir::new().unwrap();
        let good = control(&dir, &["test", "-f", "{config}"], &["true"]);
        good.apply(&rendered("good\n")).await.unwrap();

        let bad = control(
            &dir,
            &["sh", "-c", "echo 'unknown directive' >&2; exit 1", "{config}"],
            &["true"],
        );
        let err = bad.apply(&rendered("broken\n")).await.unwrap_err();

        match err {
            ReloadError::Rejected { output } => assert!(output.contains("unknown directive")),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(std::fs::read_to_string(bad.config_path()).unwrap(), "good\n");
        assert!(!bad.staged_path().exists());
    }

    #[tokio::test]
    async fn test_reload_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let nginx = control(&dir, &["test", "-f", "{config}"], &["false"]);
        let err = nginx.apply(&rendered("a\n")).await.unwrap_err();
        assert!(matches!(err, ReloadError::Signal { .. }));
    }

    #[tokio::test]
    async fn test_forced_reload_runs_command() {
        let dir = TempDir::new().unwrap();
        let ok = control(&dir, &["true"], &["true"]);
        ok.reload().await.unwrap();
        let bad = control(&dir, &["true"], &["false"]);
        assert!(matches!(bad.reload().await, Err(ReloadError::Signal { .. })));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let dir = TempDir::new().unwrap();
        let mut nginx = control(&dir, &["sh", "-c", "sleep 5", "{config}"], &["true"]);
        nginx.timeout = Duration::from_millis(100);
        let err = nginx.apply(&rendered("a\n")).await.unwrap_err();
        assert!(matches!(err, ReloadError::Timeout { .. }));
    }
}
