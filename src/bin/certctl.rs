use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use tls_reconciler::config::{load_config, ReconcilerConfig};
use tls_reconciler::registry::{domains_from_config, UpstreamProbe};
use tls_reconciler::render::{render, GlobalOptions};
use tls_reconciler::store::{CertStates, CertificateStore};

#[derive(Parser)]
#[command(name = "certctl")]
#[command(about = "Operator CLI for the TLS reconciler", long_about = None)]
struct Cli {
    #[arg(short, long, env = "TLS_RECONCILER_CONFIG", default_value = "/etc/tls-reconciler/config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the config file and list managed domains
    Check,
    /// Show certificate status per domain as JSON
    Status,
    /// Print the proxy config the daemon would render now
    Render,
}

#[derive(Serialize)]
struct DomainStatus {
    name: String,
    upstream: String,
    active: bool,
    cert_present: bool,
    expires_at: Option<DateTime<Utc>>,
    renewal_due: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Check => check(&config),
        Commands::Status => status(&config)?,
        Commands::Render => print!("{}", render_now(&config).await?),
    }

    Ok(())
}

fn check(config: &ReconcilerConfig) {
    println!("config ok: {} domain(s)", config.domains.len());
    for domain in domains_from_config(config) {
        let state = if domain.is_active { "active" } else { "inactive" };
        println!("  {:<40} {:<8} {}", domain.server_names().collect::<Vec<_>>().join(","), state, domain.upstream_target);
    }
}

fn status(config: &ReconcilerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = CertificateStore::new(&config.store.root);
    let renew_before = chrono::Duration::days(i64::from(config.renewal.renew_before_days));
    let now = Utc::now();

    let mut report = Vec::new();
    for domain in domains_from_config(config) {
        let expires_at = store.expires_at(&domain)?;
        report.push(DomainStatus {
            cert_present: expires_at.is_some(),
            renewal_due: store.needs_renewal(&domain, renew_before, now)?,
            expires_at,
            name: domain.name,
            upstream: domain.upstream_target,
            active: domain.is_active,
        });
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn render_now(config: &ReconcilerConfig) -> Result<String, Box<dyn std::error::Error>> {
    let store = CertificateStore::new(&config.store.root);
    let domains = domains_from_config(config);
    let states: CertStates = store.inspect(&domains)?.into_iter().collect();
    let effective = UpstreamProbe::new(&config.probe).effective(&domains).await;
    let rendered = render(&effective, &states, &GlobalOptions::detect(config));
    Ok(rendered.as_str().to_string())
}
