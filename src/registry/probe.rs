//! Upstream reachability probe.
//!
//! # Responsibilities
//! - TCP-connect to each active domain's upstream
//! - Demote unreachable upstreams to inactive for the current pass
//!
//! # Design Decisions
//! - Probing only computes render inputs; the renderer itself never does I/O
//! - A timeout or refused connection both count as unreachable

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;
use url::Url;

use crate::config::ProbeConfig;
use crate::registry::Domain;

/// Probes upstream targets before rendering.
#[derive(Debug, Clone)]
pub struct UpstreamProbe {
    enabled: bool,
    timeout: Duration,
}

impl UpstreamProbe {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            enabled: config.enabled,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// A probe that leaves every domain as configured.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_millis(0),
        }
    }

    /// Return the domains with `is_active` cleared where the upstream is down.
    pub async fn effective(&self, domains: &[Domain]) -> Vec<Domain> {
        if !self.enabled {
            return domains.to_vec();
        }

        let mut effective = Vec::with_capacity(domains.len());
        for domain in domains {
            let mut domain = domain.clone();
            if domain.is_active && !self.is_reachable(&domain.upstream_target).await {
                tracing::warn!(
                    domain = %domain.name,
                    upstream = %domain.upstream_target,
                    "Upstream unreachable, serving placeholder this pass"
                );
                domain.is_active = false;
            }
            effective.push(domain);
        }
        effective
    }

    async fn is_reachable(&self, upstream: &str) -> bool {
        let Some((host, port)) = upstream_addr(upstream) else {
            return false;
        };

        match timeout(self.timeout, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(upstream = %upstream, error = %e, "Upstream probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(upstream = %upstream, "Upstream probe timed out");
                false
            }
        }
    }
}

fn upstream_addr(upstream: &str) -> Option<(String, u16)> {
    let url = Url::parse(upstream).ok()?;
    let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_upstream_addr_defaults_port() {
        assert_eq!(upstream_addr("http://app"), Some(("app".to_string(), 80)));
        assert_eq!(upstream_addr("https://app"), Some(("app".to_string(), 443)));
        assert_eq!(upstream_addr("http://app:3000/x"), Some(("app".to_string(), 3000)));
        assert_eq!(upstream_addr("not a url"), None);
    }

    #[tokio::test]
    async fn test_disabled_probe_keeps_domains() {
        let domains = vec![Domain::new("a.example", "http://127.0.0.1:1", true)];
        let effective = UpstreamProbe::disabled().effective(&domains).await;
        assert_eq!(effective, domains);
    }

    #[tokio::test]
    async fn test_probe_demotes_unreachable_upstream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = listener.local_addr().unwrap();

        // Bind then drop to get a port with nothing listening.
        let dead = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        let probe = UpstreamProbe::new(&ProbeConfig {
            enabled: true,
            timeout_ms: 500,
        });
        let domains = vec![
            Domain::new("up.example", format!("http://{}", live), true),
            Domain::new("down.example", format!("http://{}", dead), true),
            Domain::new("off.example", format!("http://{}", live), false),
        ];

        let effective = probe.effective(&domains).await;
        assert!(effective[0].is_active);
        assert!(!effective[1].is_active);
        assert!(!effective[2].is_active);
    }
}
