//! Locally hosted domains.

use jid::Jid;
use std::collections::HashSet;

/// Set of domains served by this server.
///
/// Archives exist only for accounts on these domains.
#[derive(Debug, Clone, Default)]
pub struct LocalHosts {
    domains: HashSet<String>,
}

impl LocalHosts {
    /// Create a host set from domain names.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.into().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Check whether a domain is hosted locally.
    pub fn is_local_host(&self, domain: &str) -> bool {
        self.domains.contains(&domain.to_ascii_lowercase())
    }

    /// Check whether an address belongs to a local account.
    pub fn is_local(&self, jid: &Jid) -> bool {
        self.is_local_host(jid.domain().as_str())
    }
}
