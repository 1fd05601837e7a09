//! Rule engine: host classification, check tables and lookups.
//!
//! An [`Engine`] owns one loaded configuration together with the check
//! catalog, the host topology and the autochecks. Everything the renderer,
//! the precompiler and discovery need to know about a host is answered
//! here. Check tables are memoised per host until the autochecks are
//! re-read.

pub mod aggregation;
pub mod check_table;
pub mod depsort;
pub mod snmp;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::autochecks::{self, Autocheck, AutocheckError};
use crate::catalog::{CheckCatalog, CheckPlugin};
use crate::config::{Config, ConfigError, LoadOptions};
use crate::hosts::Topology;
use crate::literal::{Item, LiteralError, Value};
use crate::rules::resolver::fill_template;
use crate::rules::{
    host_extra_conf, hosttags_match_taglist, in_binary_hostlist, in_boolean_serviceconf_list,
    service_deps, service_extra_conf, CheckDeclaration, CheckHosts, HostFacts, LegacyCheck,
};

pub use check_table::{CheckEntry, CheckKey, CheckTable, ServiceSpec};
pub use snmp::{SnmpCommand, SnmpCredentials};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while answering questions about hosts and services.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A check type that no plugin provides.
    #[error("Unknown check type '{0}'. Please use 'cmk list-checks' for a list of all check types.")]
    UnknownCheckType(String),

    /// Two services of a host render the same description.
    #[error(
        "Duplicate service description '{description}' for host '{host}'!\n \
         - 1st occurrance: checktype = {first_check_type}, item = {first_item}\n \
         - 2nd occurrance: checktype = {second_check_type}, item = {second_item}"
    )]
    DuplicateDescription {
        /// Host both services belong to.
        host: String,
        /// The colliding description.
        description: String,
        /// Check type of the first service.
        first_check_type: String,
        /// Item of the first service, as a literal.
        first_item: String,
        /// Check type of the second service.
        second_check_type: String,
        /// Item of the second service, as a literal.
        second_item: String,
    },

    /// A legacy check uses the description of another service.
    #[error(
        "Duplicate service description (legacy check) '{description}' for host '{host}'!\n \
         - 1st occurrance: checktype = {first_check_type}, item = {first_item}\n \
         - 2nd occurrance: checktype = legacy({command}), item = None"
    )]
    DuplicateLegacyDescription {
        /// Host both services belong to.
        host: String,
        /// The colliding description.
        description: String,
        /// Check type of the first service.
        first_check_type: String,
        /// Item of the first service, as a literal.
        first_item: String,
        /// Command of the legacy check.
        command: String,
    },

    /// Services that depend on each other.
    #[error("Cyclic service dependency of host {host}. Problematic are: {}", .descriptions.join(","))]
    CyclicDependency {
        /// Affected host.
        host: String,
        /// Descriptions left unsorted, sorted by name.
        descriptions: Vec<String>,
    },

    /// A host without a resolvable address.
    #[error("Cannot determine ip address of {0}. Please add to ipaddresses.")]
    NoIpAddress(String),

    /// A cluster node that is not an active host.
    #[error("Node {node} of cluster {cluster} not in all_hosts.")]
    NodeNotInAllHosts {
        /// The node.
        node: String,
        /// Its cluster.
        cluster: String,
    },

    /// A check plugin source file that cannot be found.
    #[error("Cannot find check file {file} needed for check type {check_type}")]
    MissingPlugin {
        /// Check type being precompiled.
        check_type: String,
        /// Plugin file name.
        file: String,
    },

    /// SNMP credentials of the wrong shape.
    #[error("Invalid SNMP credentials '{credentials}' for host {host}: must be string, 4-tuple or 6-tuple")]
    InvalidSnmpCredentials {
        /// Affected host.
        host: String,
        /// The configured value.
        credentials: String,
    },

    /// Filesystem failure.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Autochecks could not be read.
    #[error(transparent)]
    Autochecks(#[from] AutocheckError),

    /// A parameter refers to an unknown variable.
    #[error(transparent)]
    Literal(#[from] LiteralError),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Loaded configuration plus everything derived from it.
#[derive(Debug)]
pub struct Engine {
    config: Config,
    catalog: CheckCatalog,
    topology: Topology,
    autochecks: Vec<Autocheck>,
    checks: Vec<CheckDeclaration>,
    variables: BTreeMap<String, Value>,
    table_cache: Mutex<HashMap<String, Arc<CheckTable>>>,
}

impl Engine {
    /// Build an engine. Autochecks are placed before the configured checks
    /// so that configured checks win on equal `(check_type, item)`.
    pub fn new(
        config: Config,
        catalog: CheckCatalog,
        autochecks: Vec<Autocheck>,
    ) -> Result<Self, EngineError> {
        let mut variables = catalog.variable_defaults();
        variables.extend(config.variables.iter().map(|(k, v)| (k.clone(), v.clone())));
        let topology = Topology::new(&config);
        let mut engine = Self {
            config,
            catalog,
            topology,
            autochecks: Vec::new(),
            checks: Vec::new(),
            variables,
            table_cache: Mutex::new(HashMap::new()),
        };
        engine.set_autochecks(autochecks)?;
        Ok(engine)
    }

    /// Load configuration and autochecks from disk.
    pub fn load(catalog: CheckCatalog, options: LoadOptions) -> Result<Self, EngineError> {
        let config = Config::load(&catalog, options)?;
        let autochecks = autochecks::read_all(&config.paths.autochecks_dir())?;
        Self::new(config, catalog, autochecks)
    }

    /// Re-read the autochecks directory, e.g. after an inventory run.
    pub fn reread_autochecks(&mut self) -> Result<(), EngineError> {
        let autochecks = autochecks::read_all(&self.config.paths.autochecks_dir())?;
        self.set_autochecks(autochecks)
    }

    fn set_autochecks(&mut self, autochecks: Vec<Autocheck>) -> Result<(), EngineError> {
        let mut checks = Vec::with_capacity(
            autochecks
                .len()
                .saturating_add(self.config.rules.checks.len()),
        );
        for ac in &autochecks {
            let mut params = ac.params.clone();
            if !self.config.rules.check_parameters.is_empty() {
                let description = self.service_description(&ac.check_type, &ac.item)?;
                let facts = self.topology.facts(&ac.host);
                if let Some(first) =
                    service_extra_conf(&facts, &description, &self.config.rules.check_parameters)
                        .first()
                {
                    params = (*first).clone();
                }
            }
            checks.push(CheckDeclaration {
                tags: Vec::new(),
                hosts: CheckHosts::Single(ac.host.clone()),
                check_type: ac.check_type.clone(),
                item: ac.item.clone(),
                params,
            });
        }
        checks.extend(self.config.rules.checks.iter().cloned());
        for check in &checks {
            self.resolve_params(&check.params)?;
        }
        self.checks = checks;
        self.autochecks = autochecks;
        self.clear_cache();
        Ok(())
    }

    /// Forget memoised check tables.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.table_cache.lock() {
            cache.clear();
        }
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The check catalog.
    pub fn catalog(&self) -> &CheckCatalog {
        &self.catalog
    }

    /// Hosts and clusters.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Autochecks as read from disk.
    pub fn autochecks(&self) -> &[Autocheck] {
        &self.autochecks
    }

    /// Effective check variables: plugin defaults overlaid by `[variables]`.
    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Replace variable references in parameters by their values.
    pub fn resolve_params(&self, params: &Value) -> Result<Value, EngineError> {
        Ok(params.resolve(&|name| self.variables.get(name).cloned())?)
    }

    /// Capability record of a check type.
    pub fn plugin(&self, check_type: &str) -> Result<&CheckPlugin, EngineError> {
        self.catalog
            .get(check_type)
            .ok_or_else(|| EngineError::UnknownCheckType(check_type.to_owned()))
    }

    /// Whether a check type reads SNMP data.
    pub fn check_uses_snmp(&self, check_type: &str) -> bool {
        self.catalog.get(check_type).is_some_and(CheckPlugin::uses_snmp)
    }

    // -- Descriptions and check tables ------------------------------------

    /// Service description of `(check_type, item)`.
    ///
    /// `service_descriptions` overrides the plugin template. String items
    /// lose the characters listed in `nagios_illegal_chars`. A template
    /// without `%s` gets ` %s` appended when there is an item.
    pub fn service_description(&self, check_type: &str, item: &Item) -> Result<String, EngineError> {
        let plugin = self.plugin(check_type)?;
        let template = self
            .config
            .settings
            .service_descriptions
            .get(check_type)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(plugin.description);
        let arg = match item {
            Item::None => return Ok(template.to_owned()),
            Item::Int(i) => i.to_string(),
            Item::Str(s) => {
                let illegal = &self.config.settings.nagios_illegal_chars;
                s.chars().filter(|c| !illegal.contains(*c)).collect()
            }
        };
        let template = if template.contains("%s") {
            template.to_owned()
        } else {
            format!("{template} %s")
        };
        Ok(fill_template(&template, &arg).unwrap_or_else(|| template.replacen("%s", &arg, 1)))
    }

    /// Check table of a host. Later declarations replace earlier ones with
    /// the same `(check_type, item)`; dependencies on services the host does
    /// not have are dropped.
    pub fn check_table(&self, host: &str) -> Result<Arc<CheckTable>, EngineError> {
        if let Ok(cache) = self.table_cache.lock() {
            if let Some(table) = cache.get(host) {
                return Ok(Arc::clone(table));
            }
        }

        let facts = self.facts(host);
        let mut table = CheckTable::new();
        for check in &self.checks {
            let host_matches = match &check.hosts {
                CheckHosts::Single(name) => name == host,
                CheckHosts::List(list) => list.matches(&facts),
            };
            if !host_matches || !hosttags_match_taglist(facts.tags, &check.tags) {
                continue;
            }
            let description = self.service_description(&check.check_type, &check.item)?;
            let deps = service_deps(&facts, &description, &self.config.rules.service_dependencies);
            table.insert(
                (check.check_type.clone(), check.item.clone()),
                ServiceSpec {
                    params: check.params.clone(),
                    description,
                    deps,
                },
            );
        }
        check_table::prune_dangling_deps(&mut table);
        tracing::debug!(host, services = table.len(), "built check table");

        let table = Arc::new(table);
        if let Ok(mut cache) = self.table_cache.lock() {
            cache.insert(host.to_owned(), Arc::clone(&table));
        }
        Ok(table)
    }

    /// Check table of a host in dependency order.
    pub fn sorted_check_table(&self, host: &str) -> Result<Vec<CheckEntry>, EngineError> {
        let table = self.check_table(host)?;
        depsort::topo_sort(host, &table)
    }

    // -- Hosts ------------------------------------------------------------

    /// Predicate view of a host.
    pub fn facts<'a>(&'a self, host: &'a str) -> HostFacts<'a> {
        self.topology.facts(host)
    }

    /// Active hosts followed by active clusters.
    pub fn active_hosts_and_clusters(&self) -> Vec<String> {
        self.topology
            .active_hosts()
            .iter()
            .chain(self.topology.active_clusters())
            .cloned()
            .collect()
    }

    /// Address of a host, if it has one.
    pub fn lookup_ipaddress(&self, host: &str) -> Option<String> {
        self.topology.lookup_ipaddress(host)
    }

    /// Address of a host, failing when it has none.
    pub fn require_ipaddress(&self, host: &str) -> Result<String, EngineError> {
        self.lookup_ipaddress(host)
            .ok_or_else(|| EngineError::NoIpAddress(host.to_owned()))
    }

    /// Whether the host is monitored via SNMP.
    pub fn is_snmp_host(&self, host: &str) -> bool {
        in_binary_hostlist(&self.facts(host), &self.config.rules.snmp_hosts)
    }

    /// Whether the host runs an agent.
    pub fn is_tcp_host(&self, host: &str) -> bool {
        in_binary_hostlist(&self.facts(host), &self.config.rules.tcp_hosts)
    }

    /// Hosts that are neither SNMP nor TCP hosts are only pinged.
    pub fn is_ping_host(&self, host: &str) -> bool {
        !self.is_snmp_host(host) && !self.is_tcp_host(host)
    }

    /// Whether SNMP v2c bulk walks are used.
    pub fn is_bulkwalk_host(&self, host: &str) -> bool {
        in_binary_hostlist(&self.facts(host), &self.config.rules.bulkwalk_hosts)
    }

    /// Whether stored walks replace live SNMP queries.
    pub fn is_usewalk_host(&self, host: &str) -> bool {
        in_binary_hostlist(&self.facts(host), &self.config.rules.usewalk_hosts)
    }

    /// SNMP credentials: the first matching `snmp_communities` rule, else
    /// `snmp_default_community`.
    pub fn snmp_credentials(&self, host: &str) -> Result<SnmpCredentials, EngineError> {
        let facts = self.facts(host);
        let configured = host_extra_conf(&facts, &self.config.rules.snmp_communities);
        match configured.first() {
            Some(value) => SnmpCredentials::from_value(host, value),
            None => SnmpCredentials::from_value(
                host,
                &Value::from_toml(&self.config.settings.snmp_default_community),
            ),
        }
    }

    /// SNMP command line with authentication options.
    pub fn snmp_command(&self, host: &str, what: SnmpCommand) -> Result<String, EngineError> {
        let credentials = self.snmp_credentials(host)?;
        Ok(snmp::base_command(what, &credentials, self.is_bulkwalk_host(host)))
    }

    /// Program producing the agent output of a host, with `<IP>` and
    /// `<HOST>` substituted.
    pub fn datasource_program(&self, host: &str, ip: &str) -> Option<String> {
        host_extra_conf(&self.facts(host), &self.config.rules.datasource_programs)
            .first()
            .map(|p| p.replace("<IP>", ip).replace("<HOST>", host))
    }

    /// Host a service found on `host` belongs to: a cluster listed in
    /// `clustered_services_of`, else the node's cluster when the service is
    /// in `clustered_services`, else the host itself.
    pub fn host_of_clustered_service(&self, host: &str, description: &str) -> String {
        let facts = self.facts(host);
        let rules = &self.config.rules;
        for (cluster, conf) in &rules.clustered_services_of {
            if self.topology.nodes_of(cluster).iter().any(|n| n == host)
                && in_boolean_serviceconf_list(&facts, description, conf)
            {
                return cluster.clone();
            }
        }
        if in_boolean_serviceconf_list(&facts, description, &rules.clustered_services) {
            if let Some(cluster) = self.topology.cluster_of(host) {
                return cluster.to_owned();
            }
        }
        host.to_owned()
    }

    /// Whether inventory of `check_type` is suppressed for `host`.
    pub fn checktype_ignored_for_host(&self, host: &str, check_type: &str) -> bool {
        if self.config.settings.ignored_checktypes.iter().any(|c| c == check_type) {
            return true;
        }
        host_extra_conf(&self.facts(host), &self.config.rules.ignored_checks)
            .iter()
            .any(|types| types.iter().any(|t| t == check_type))
    }

    /// Whether `ignored_services` excludes a service.
    pub fn service_ignored(&self, host: &str, description: &str) -> bool {
        let ignored = in_boolean_serviceconf_list(
            &self.facts(host),
            description,
            &self.config.rules.ignored_services,
        );
        if ignored {
            tracing::debug!(host, service = description, "ignoring service");
        }
        ignored
    }

    // -- Groups and extra configuration -----------------------------------

    /// Host groups of a host.
    pub fn hostgroups_of(&self, host: &str) -> Vec<String> {
        owned(host_extra_conf(&self.facts(host), &self.config.rules.host_groups))
    }

    /// Host groups of a summary host.
    pub fn summary_hostgroups_of(&self, host: &str) -> Vec<String> {
        owned(host_extra_conf(&self.facts(host), &self.config.rules.summary_host_groups))
    }

    /// Contact groups of a set of hosts, without duplicates.
    pub fn host_contactgroups_of(&self, hosts: &[&str]) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for host in hosts {
            for group in host_extra_conf(&self.facts(host), &self.config.rules.host_contactgroups) {
                if !groups.contains(group) {
                    groups.push(group.clone());
                }
            }
        }
        groups
    }

    /// Parents of a host. Values may list several names separated by
    /// commas; names that are not configured hosts are dropped.
    pub fn parents_of(&self, host: &str) -> Vec<String> {
        host_extra_conf(&self.facts(host), &self.config.rules.parents)
            .into_iter()
            .flat_map(|p| p.split(','))
            .filter(|p| self.topology.all_hosts().iter().any(|h| h == p))
            .map(str::to_owned)
            .collect()
    }

    /// Service groups of a service.
    pub fn service_groups_of(&self, host: &str, description: &str) -> Vec<String> {
        owned(service_extra_conf(
            &self.facts(host),
            description,
            &self.config.rules.service_groups,
        ))
    }

    /// Contact groups of a service.
    pub fn service_contactgroups_of(&self, host: &str, description: &str) -> Vec<String> {
        owned(service_extra_conf(
            &self.facts(host),
            description,
            &self.config.rules.service_contactgroups,
        ))
    }

    /// Service groups of an aggregated service.
    pub fn summary_service_groups_of(&self, host: &str, description: &str) -> Vec<String> {
        owned(service_extra_conf(
            &self.facts(host),
            description,
            &self.config.rules.summary_service_groups,
        ))
    }

    /// Contact groups of an aggregated service.
    pub fn summary_service_contactgroups_of(&self, host: &str, description: &str) -> Vec<String> {
        owned(service_extra_conf(
            &self.facts(host),
            description,
            &self.config.rules.summary_service_contactgroups,
        ))
    }

    /// Legacy active checks of a host.
    pub fn legacy_checks_of(&self, host: &str) -> Vec<&LegacyCheck> {
        host_extra_conf(&self.facts(host), &self.config.rules.legacy_checks)
    }

    /// First matching value per `extra_host_conf` key, ordered by key.
    pub fn extra_host_conf_of(&self, host: &str) -> Vec<(&str, &Value)> {
        host_conf_of(&self.facts(host), &self.config.rules.extra_host_conf)
    }

    /// First matching value per `extra_summary_host_conf` key.
    pub fn extra_summary_host_conf_of(&self, host: &str) -> Vec<(&str, &Value)> {
        host_conf_of(&self.facts(host), &self.config.rules.extra_summary_host_conf)
    }

    /// First matching value per `extra_service_conf` key.
    pub fn extra_service_conf_of(&self, host: &str, description: &str) -> Vec<(&str, &Value)> {
        service_conf_of(&self.facts(host), description, &self.config.rules.extra_service_conf)
    }

    /// First matching value per `extra_summary_service_conf` key.
    pub fn extra_summary_service_conf_of(
        &self,
        host: &str,
        description: &str,
    ) -> Vec<(&str, &Value)> {
        service_conf_of(
            &self.facts(host),
            description,
            &self.config.rules.extra_summary_service_conf,
        )
    }
}

fn owned(values: Vec<&String>) -> Vec<String> {
    values.into_iter().cloned().collect()
}

fn host_conf_of<'r>(
    facts: &HostFacts<'_>,
    conf: &'r BTreeMap<String, Vec<crate::rules::HostRule<Value>>>,
) -> Vec<(&'r str, &'r Value)> {
    conf.iter()
        .filter_map(|(key, rules)| {
            host_extra_conf(facts, rules)
                .first()
                .map(|v| (key.as_str(), *v))
        })
        .collect()
}

fn service_conf_of<'r>(
    facts: &HostFacts<'_>,
    description: &str,
    conf: &'r BTreeMap<String, Vec<crate::rules::ServiceRule<Value>>>,
) -> Vec<(&'r str, &'r Value)> {
    conf.iter()
        .filter_map(|(key, rules)| {
            service_extra_conf(facts, description, rules)
                .first()
                .map(|v| (key.as_str(), *v))
        })
        .collect()
}
