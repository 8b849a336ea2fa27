//! nginx configuration rendering.
//!
//! # Responsibilities
//! - One HTTP block per domain: ACME challenge path + redirect to HTTPS
//! - One HTTPS block per domain that has a certificate
//! - Hardened TLS policy and security headers on every HTTPS block
//! - Proxy location only for active domains
//!
//! # Design Decisions
//! - Pure function of (domains, cert states, options); no I/O
//! - Output order follows domain order, so renders diff cleanly
//! - The DH parameter file is referenced only when it exists; nginx refuses
//!   to start on a missing `ssl_dhparam`

use std::fmt::Write;
use std::path::Path;

use crate::registry::Domain;
use crate::render::{GlobalOptions, RenderedConfig};
use crate::store::{cert_paths, CertStates};

/// HTTP-01 challenge location served from the webroot.
pub const ACME_CHALLENGE_PATH: &str = "/.well-known/acme-challenge/";

const HEADER: &str = "# Managed by tls-reconciler. Manual edits are overwritten.\n";

const TLS_PROTOCOLS: &str = "TLSv1.2 TLSv1.3";

const TLS_CIPHERS: &str = "ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:\
ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384:\
ECDHE-ECDSA-CHACHA20-POLY1305:ECDHE-RSA-CHACHA20-POLY1305:\
DHE-RSA-AES128-GCM-SHA256:DHE-RSA-AES256-GCM-SHA384";

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("Strict-Transport-Security", "\"max-age=63072000; includeSubDomains\""),
    ("X-Frame-Options", "\"SAMEORIGIN\""),
    ("X-Content-Type-Options", "\"nosniff\""),
    ("Referrer-Policy", "\"strict-origin-when-cross-origin\""),
];

/// Render the complete proxy configuration for one pass.
pub fn render(domains: &[Domain], states: &CertStates, opts: &GlobalOptions) -> RenderedConfig {
    let mut out = String::from(HEADER);
    let mut https_blocks = 0;

    for domain in domains {
        out.push('\n');
        write_http_block(&mut out, domain, opts);

        if states.exists(&domain.name) {
            out.push('\n');
            write_https_block(&mut out, domain, opts);
            https_blocks += 1;
        }
    }

    RenderedConfig::new(out, domains.len(), https_blocks)
}

/// Minimal main config that includes `staged` so the proxy can dry-run it.
pub fn validation_wrapper(staged: &Path) -> String {
    format!(
        "events {{}}\n\nhttp {{\n    include {};\n}}\n",
        staged.display()
    )
}

fn server_names(domain: &Domain) -> String {
    domain.server_names().collect::<Vec<_>>().join(" ")
}

// `write!` into a String cannot fail; results are discarded below.
fn write_http_block(out: &mut String, domain: &Domain, opts: &GlobalOptions) {
    let _ = writeln!(out, "server {{");
    let _ = writeln!(out, "    listen 80;");
    let _ = writeln!(out, "    listen [::]:80;");
    let _ = writeln!(out, "    server_name {};", server_names(domain));
    out.push('\n');
    let _ = writeln!(out, "    location ^~ {} {{", ACME_CHALLENGE_PATH);
    let _ = writeln!(out, "        root {};", opts.webroot.display());
    let _ = writeln!(out, "        default_type \"text/plain\";");
    let _ = writeln!(out, "    }}");
    out.push('\n');
    let _ = writeln!(out, "    location / {{");
    let _ = writeln!(out, "        return 301 https://$host$request_uri;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
}

fn write_https_block(out: &mut String, domain: &Domain, opts: &GlobalOptions) {
    let paths = cert_paths(&opts.store_root, &domain.name);

    let _ = writeln!(out, "server {{");
    let _ = writeln!(out, "    listen 443 ssl;");
    let _ = writeln!(out, "    listen [::]:443 ssl;");
    let _ = writeln!(out, "    server_name {};", server_names(domain));
    out.push('\n');
    let _ = writeln!(out, "    ssl_certificate {};", paths.fullchain.display());
    let _ = writeln!(out, "    ssl_certificate_key {};", paths.privkey.display());
    let _ = writeln!(out, "    ssl_protocols {};", TLS_PROTOCOLS);
    let _ = writeln!(out, "    ssl_prefer_server_ciphers on;");
    let _ = writeln!(out, "    ssl_ciphers {};", TLS_CIPHERS);
    let _ = writeln!(out, "    ssl_session_cache shared:SSL:10m;");
    let _ = writeln!(out, "    ssl_session_timeout 1d;");
    let _ = writeln!(out, "    ssl_session_tickets off;");
    let _ = writeln!(out, "    ssl_stapling on;");
    let _ = writeln!(out, "    ssl_stapling_verify on;");
    if opts.dhparam_available {
        let _ = writeln!(out, "    ssl_dhparam {};", opts.dhparam_path.display());
    }
    out.push('\n');
    for (name, value) in SECURITY_HEADERS {
        let _ = writeln!(out, "    add_header {} {} always;", name, value);
    }
    out.push('\n');

    if domain.is_active {
        let _ = writeln!(out, "    location / {{");
        let _ = writeln!(out, "        proxy_pass {};", domain.upstream_target);
        let _ = writeln!(out, "        proxy_http_version 1.1;");
        let _ = writeln!(out, "        proxy_set_header Host $host;");
        let _ = writeln!(out, "        proxy_set_header X-Real-IP $remote_addr;");
        let _ = writeln!(out, "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;");
        let _ = writeln!(out, "        proxy_set_header X-Forwarded-Proto $scheme;");
        let _ = writeln!(out, "        proxy_set_header Upgrade $http_upgrade;");
        let _ = writeln!(out, "        proxy_set_header Connection \"upgrade\";");
        let _ = writeln!(out, "    }}");
    } else {
        let _ = writeln!(out, "    root {};", opts.placeholder_root.display());
        let _ = writeln!(out, "    index index.html;");
    }
    let _ = writeln!(out, "}}");
}
