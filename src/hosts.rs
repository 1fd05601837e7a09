//! Host topology: names, tags, clusters and addresses.
//!
//! Built once per run from `all_hosts` and `clusters`. Host names are
//! untagged everywhere outside this module; tags live in a side table.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Mutex;

use crate::config::Config;
use crate::rules::{in_binary_hostlist, strip_tags, HostFacts};

/// Hosts, clusters and their tags.
#[derive(Debug, Default)]
pub struct Topology {
    hosts: Vec<String>,
    clusters: Vec<(String, Vec<String>)>,
    tags: HashMap<String, Vec<String>>,
    active_hosts: Vec<String>,
    active_clusters: Vec<String>,
    active: HashSet<String>,
    ipaddresses: BTreeMap<String, String>,
    ip_cache: Mutex<HashMap<String, Option<String>>>,
}

fn split_tagged(tagged: &str) -> (String, Vec<String>) {
    let mut parts = tagged.split('|');
    let name = parts.next().unwrap_or_default().to_owned();
    (name, parts.map(str::to_owned).collect())
}

impl Topology {
    /// Build the topology of a configuration.
    pub fn new(config: &Config) -> Self {
        let mut tags = HashMap::new();
        let mut hosts = Vec::with_capacity(config.rules.all_hosts.len());
        for tagged in &config.rules.all_hosts {
            let (name, host_tags) = split_tagged(tagged);
            tags.insert(name.clone(), host_tags);
            hosts.push(name);
        }
        let mut clusters = Vec::with_capacity(config.rules.clusters.len());
        for (tagged, nodes) in &config.rules.clusters {
            let (name, cluster_tags) = split_tagged(tagged);
            tags.insert(name.clone(), cluster_tags);
            clusters.push((name, nodes.iter().map(|n| strip_tags(n).to_owned()).collect()));
        }

        let mut topology = Self {
            hosts,
            clusters,
            tags,
            ipaddresses: config.settings.ipaddresses.clone(),
            ..Self::default()
        };
        let only = config.rules.only_hosts.as_ref();
        let is_active = |t: &Topology, name: &str| {
            only.map_or(true, |list| in_binary_hostlist(&t.facts(name), list))
        };
        topology.active_hosts = topology
            .hosts
            .iter()
            .filter(|h| is_active(&topology, h))
            .cloned()
            .collect();
        topology.active_clusters = topology
            .clusters
            .iter()
            .map(|(c, _)| c)
            .filter(|c| is_active(&topology, c))
            .cloned()
            .collect();
        topology.active = topology
            .active_hosts
            .iter()
            .chain(&topology.active_clusters)
            .cloned()
            .collect();
        topology
    }

    /// Predicate view of a host.
    pub fn facts<'a>(&'a self, name: &'a str) -> HostFacts<'a> {
        HostFacts {
            name,
            tags: self.tags_of(name),
            is_cluster: self.is_cluster(name),
        }
    }

    /// Tags of a host or cluster; empty for unknown names.
    pub fn tags_of(&self, name: &str) -> &[String] {
        self.tags.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every configured host (not clusters), untagged, in configuration
    /// order.
    pub fn all_hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Hosts admitted by `only_hosts`.
    pub fn active_hosts(&self) -> &[String] {
        &self.active_hosts
    }

    /// Clusters admitted by `only_hosts`.
    pub fn active_clusters(&self) -> &[String] {
        &self.active_clusters
    }

    /// Whether `name` is an active host or cluster.
    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains(name)
    }

    /// Whether `name` is an active host (used to filter parents).
    pub fn is_active_host(&self, name: &str) -> bool {
        self.active_hosts.iter().any(|h| h == name)
    }

    /// Whether `name` is a configured host or cluster.
    pub fn is_known(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Whether `name` is a cluster.
    pub fn is_cluster(&self, name: &str) -> bool {
        self.clusters.iter().any(|(c, _)| c == name)
    }

    /// Nodes of a cluster; empty for non-clusters.
    pub fn nodes_of(&self, cluster: &str) -> &[String] {
        self.clusters
            .iter()
            .find(|(c, _)| c == cluster)
            .map(|(_, nodes)| nodes.as_slice())
            .unwrap_or_default()
    }

    /// The first cluster `node` belongs to.
    pub fn cluster_of(&self, node: &str) -> Option<&str> {
        self.clusters
            .iter()
            .find(|(_, nodes)| nodes.iter().any(|n| n == node))
            .map(|(c, _)| c.as_str())
    }

    /// Address of a host: the `ipaddresses` table first, then DNS (IPv4).
    /// Answers are memoised for the lifetime of the topology.
    pub fn lookup_ipaddress(&self, name: &str) -> Option<String> {
        if let Some(ip) = self.ipaddresses.get(name) {
            return Some(ip.clone());
        }
        if let Ok(cache) = self.ip_cache.lock() {
            if let Some(hit) = cache.get(name) {
                return hit.clone();
            }
        }
        let resolved = resolve_ipv4(name);
        match &resolved {
            Some(ip) => tracing::debug!(host = name, ip = %ip, "resolved address"),
            None => tracing::debug!(host = name, "cannot resolve address"),
        }
        if let Ok(mut cache) = self.ip_cache.lock() {
            cache.insert(name.to_owned(), resolved.clone());
        }
        resolved
    }

    /// Host name owning an address, if it is a configured host.
    pub fn host_of_ip(&self, ip: &str) -> Option<&str> {
        self.hosts
            .iter()
            .find(|h| self.lookup_ipaddress(h).as_deref() == Some(ip))
            .map(String::as_str)
    }
}

fn resolve_ipv4(name: &str) -> Option<String> {
    if let Ok(IpAddr::V4(ip)) = name.parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    (name, 0u16)
        .to_socket_addrs()
        .ok()?
        .find(|a| a.is_ipv4())
        .map(|a| a.ip().to_string())
}
