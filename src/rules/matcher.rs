//! Tag and host list predicates.

use super::{HostEntry, HostList, ServiceList};

/// What the predicates need to know about a host.
#[derive(Debug, Clone, Copy)]
pub struct HostFacts<'a> {
    /// Untagged host name.
    pub name: &'a str,
    /// Tags of the host.
    pub tags: &'a [String],
    /// Whether the host is a cluster.
    pub is_cluster: bool,
}

/// Drop the `|tag|tag` suffix of a tagged host name.
pub fn strip_tags(name: &str) -> &str {
    name.split('|').next().unwrap_or(name)
}

/// Every unprefixed tag must be present, every `!tag` absent. An empty
/// requirement list matches.
pub fn hosttags_match_taglist(host_tags: &[String], required: &[String]) -> bool {
    required.iter().all(|tag| match tag.strip_prefix('!') {
        Some(absent) => !host_tags.iter().any(|t| t == absent),
        None => host_tags.iter().any(|t| t == tag),
    })
}

impl HostList {
    /// Walk the entries in order; the first one that matches decides.
    pub fn matches(&self, host: &HostFacts<'_>) -> bool {
        for entry in &self.entries {
            match entry {
                HostEntry::All => return true,
                HostEntry::Cluster if host.is_cluster => return true,
                HostEntry::Physical if !host.is_cluster => return true,
                HostEntry::Cluster | HostEntry::Physical | HostEntry::Marker(_) => {}
                HostEntry::Name { name, negate } => {
                    if name == host.name {
                        return !negate;
                    }
                }
            }
        }
        false
    }
}

impl ServiceList {
    /// Walk the patterns in order; the first one that matches decides.
    /// No match means `false`.
    pub fn matches(&self, description: &str) -> bool {
        self.patterns
            .iter()
            .find(|p| p.is_match(description))
            .is_some_and(|p| !p.negate)
    }
}
