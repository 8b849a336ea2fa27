//! Managed domain model.

use serde::Serialize;

use crate::config::schema::DomainEntry;

/// A domain whose certificate and proxy blocks are managed.
///
/// Immutable for the duration of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Domain {
    /// Primary name; doubles as the certificate name in the store.
    pub name: String,
    /// Upstream URL the HTTPS block proxies to.
    pub upstream_target: String,
    /// Whether the HTTPS block proxies to the upstream.
    pub is_active: bool,
    /// Additional names on the same certificate.
    pub aliases: Vec<String>,
}

impl Domain {
    pub fn new(name: impl Into<String>, upstream_target: impl Into<String>, is_active: bool) -> Self {
        Self {
            name: name.into(),
            upstream_target: upstream_target.into(),
            is_active,
            aliases: Vec::new(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Primary name followed by aliases, in configuration order.
    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

impl From<&DomainEntry> for Domain {
    fn from(entry: &DomainEntry) -> Self {
        Self {
            name: entry.name.clone(),
            upstream_target: entry.upstream.clone(),
            is_active: entry.active,
            aliases: entry.aliases.clone(),
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_names_order() {
        let domain = Domain::new("a.example", "http://app:3000", true)
            .with_aliases(vec!["www.a.example".to_string()]);
        let names: Vec<&str> = domain.server_names().collect();
        assert_eq!(names, vec!["a.example", "www.a.example"]);
    }

    #[test]
    fn test_from_entry() {
        let entry = DomainEntry {
            name: "b.example".to_string(),
            upstream: "http://b:80".to_string(),
            active: false,
            aliases: vec![],
        };
        let domain = Domain::from(&entry);
        assert_eq!(domain, Domain::new("b.example", "http://b:80", false));
    }
}
