//! Host, check and rule tables of the configuration.

use std::collections::BTreeMap;

use serde::Deserialize;
use toml::Value as Toml;

use crate::literal::Value;
use crate::rules::parse::{self, RuleValue};
use crate::rules::{
    AggregationRule, BinaryHostList, BooleanServiceRule, CheckDeclaration, DependencyRule,
    HostRule, LegacyCheck, RuleError, ServiceRule,
};

/// Rule lists as written, before shape checking.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawRules {
    all_hosts: Vec<String>,
    clusters: BTreeMap<String, Vec<String>>,
    checks: Vec<Toml>,
    check_parameters: Vec<Toml>,
    legacy_checks: Vec<Toml>,
    only_hosts: Option<Vec<Toml>>,
    snmp_hosts: Option<Vec<Toml>>,
    tcp_hosts: Option<Vec<Toml>>,
    bulkwalk_hosts: Vec<Toml>,
    usewalk_hosts: Vec<Toml>,
    snmp_communities: Vec<Toml>,
    ignored_services: Vec<Toml>,
    ignored_checks: Vec<Toml>,
    host_groups: Vec<Toml>,
    service_groups: Vec<Toml>,
    service_contactgroups: Vec<Toml>,
    host_contactgroups: Vec<Toml>,
    parents: Vec<Toml>,
    clustered_services: Vec<Toml>,
    clustered_services_of: BTreeMap<String, Vec<Toml>>,
    datasource_programs: Vec<Toml>,
    service_aggregations: Vec<Toml>,
    service_dependencies: Vec<Toml>,
    non_aggregated_hosts: Vec<Toml>,
    summary_host_groups: Vec<Toml>,
    summary_service_groups: Vec<Toml>,
    summary_service_contactgroups: Vec<Toml>,
    extra_host_conf: BTreeMap<String, Vec<Toml>>,
    extra_summary_host_conf: BTreeMap<String, Vec<Toml>>,
    extra_service_conf: BTreeMap<String, Vec<Toml>>,
    extra_summary_service_conf: BTreeMap<String, Vec<Toml>>,
    scanparent_hosts: Option<Vec<Toml>>,
    filesystem_levels: Vec<Toml>,
    pub(crate) host_notification_periods: Vec<Toml>,
    pub(crate) service_notification_periods: Vec<Toml>,
    pub(crate) summary_host_notification_periods: Vec<Toml>,
    pub(crate) summary_service_notification_periods: Vec<Toml>,
}

/// Shape-checked rule tables.
#[derive(Debug, Clone, Default)]
pub struct Rules {
    /// Hosts, optionally tagged (`name|tag|tag`).
    pub all_hosts: Vec<String>,
    /// Cluster name (optionally tagged) to untagged node names.
    pub clusters: BTreeMap<String, Vec<String>>,
    /// Explicit check declarations.
    pub checks: Vec<CheckDeclaration>,
    /// Parameters overriding inventorised ones, by service description.
    pub check_parameters: Vec<ServiceRule<Value>>,
    /// Legacy active checks.
    pub legacy_checks: Vec<HostRule<LegacyCheck>>,
    /// Restricts the set of active hosts when set.
    pub only_hosts: Option<BinaryHostList>,
    /// SNMP hosts.
    pub snmp_hosts: BinaryHostList,
    /// Agent (TCP) hosts.
    pub tcp_hosts: BinaryHostList,
    /// SNMP hosts queried with `snmpbulkwalk -v2c`.
    pub bulkwalk_hosts: BinaryHostList,
    /// SNMP hosts answered from stored walks.
    pub usewalk_hosts: BinaryHostList,
    /// SNMP credentials per host.
    pub snmp_communities: Vec<HostRule<Value>>,
    /// Services excluded from inventory.
    pub ignored_services: Vec<BooleanServiceRule>,
    /// Check types excluded from inventory per host.
    pub ignored_checks: Vec<HostRule<Vec<String>>>,
    /// Host groups.
    pub host_groups: Vec<HostRule<String>>,
    /// Service groups.
    pub service_groups: Vec<ServiceRule<String>>,
    /// Service contact groups.
    pub service_contactgroups: Vec<ServiceRule<String>>,
    /// Host contact groups.
    pub host_contactgroups: Vec<HostRule<String>>,
    /// Parents; a value may list several comma separated hosts.
    pub parents: Vec<HostRule<String>>,
    /// Services of nodes that belong to the node's cluster.
    pub clustered_services: Vec<BooleanServiceRule>,
    /// Per cluster: services of its nodes that belong to it.
    pub clustered_services_of: BTreeMap<String, Vec<BooleanServiceRule>>,
    /// Programs producing agent output (`<IP>`, `<HOST>` substituted).
    pub datasource_programs: Vec<HostRule<String>>,
    /// Service aggregations.
    pub service_aggregations: Vec<AggregationRule>,
    /// Service dependencies.
    pub service_dependencies: Vec<DependencyRule>,
    /// Hosts never aggregated.
    pub non_aggregated_hosts: BinaryHostList,
    /// Host groups of summary hosts.
    pub summary_host_groups: Vec<HostRule<String>>,
    /// Service groups of aggregated services.
    pub summary_service_groups: Vec<ServiceRule<String>>,
    /// Contact groups of aggregated services.
    pub summary_service_contactgroups: Vec<ServiceRule<String>>,
    /// Extra host attributes by attribute name.
    pub extra_host_conf: BTreeMap<String, Vec<HostRule<Value>>>,
    /// Extra summary host attributes by attribute name.
    pub extra_summary_host_conf: BTreeMap<String, Vec<HostRule<Value>>>,
    /// Extra service attributes by attribute name.
    pub extra_service_conf: BTreeMap<String, Vec<ServiceRule<Value>>>,
    /// Extra aggregated service attributes by attribute name.
    pub extra_summary_service_conf: BTreeMap<String, Vec<ServiceRule<Value>>>,
    /// Hosts considered by `scan-parents` without explicit host names.
    pub scanparent_hosts: BinaryHostList,
    /// Deprecated filesystem levels, keyed by mount point pattern.
    pub filesystem_levels: Vec<ServiceRule<Value>>,
}

fn host_map<T: RuleValue>(
    prefix: &str,
    raw: &BTreeMap<String, Vec<Toml>>,
) -> Result<BTreeMap<String, Vec<HostRule<T>>>, RuleError> {
    raw.iter()
        .map(|(key, rules)| {
            parse::host_rules(&format!("{prefix}['{key}']"), rules).map(|r| (key.clone(), r))
        })
        .collect()
}

fn service_map<T: RuleValue>(
    prefix: &str,
    raw: &BTreeMap<String, Vec<Toml>>,
) -> Result<BTreeMap<String, Vec<ServiceRule<T>>>, RuleError> {
    raw.iter()
        .map(|(key, rules)| {
            parse::service_rules(&format!("{prefix}['{key}']"), rules).map(|r| (key.clone(), r))
        })
        .collect()
}

fn binary_or(
    list: &str,
    raw: &Option<Vec<Toml>>,
    default: fn() -> BinaryHostList,
) -> Result<BinaryHostList, RuleError> {
    match raw {
        Some(entries) => parse::binary_host_list(list, entries),
        None => Ok(default()),
    }
}

impl Rules {
    pub(crate) fn from_raw(raw: &RawRules) -> Result<Self, RuleError> {
        Ok(Self {
            all_hosts: raw.all_hosts.clone(),
            clusters: raw.clusters.clone(),
            checks: parse::check_declarations("checks", &raw.checks)?,
            check_parameters: parse::service_rules("check_parameters", &raw.check_parameters)?,
            legacy_checks: parse::host_rules("legacy_checks", &raw.legacy_checks)?,
            only_hosts: raw
                .only_hosts
                .as_ref()
                .map(|entries| parse::binary_host_list("only_hosts", entries))
                .transpose()?,
            snmp_hosts: binary_or("snmp_hosts", &raw.snmp_hosts, BinaryHostList::default_snmp_hosts)?,
            tcp_hosts: binary_or("tcp_hosts", &raw.tcp_hosts, BinaryHostList::default_tcp_hosts)?,
            bulkwalk_hosts: parse::binary_host_list("bulkwalk_hosts", &raw.bulkwalk_hosts)?,
            usewalk_hosts: parse::binary_host_list("usewalk_hosts", &raw.usewalk_hosts)?,
            snmp_communities: parse::host_rules("snmp_communities", &raw.snmp_communities)?,
            ignored_services: parse::boolean_service_rules("ignored_services", &raw.ignored_services)?,
            ignored_checks: parse::host_rules("ignored_checks", &raw.ignored_checks)?,
            host_groups: parse::host_rules("host_groups", &raw.host_groups)?,
            service_groups: parse::service_rules("service_groups", &raw.service_groups)?,
            service_contactgroups: parse::service_rules(
                "service_contactgroups",
                &raw.service_contactgroups,
            )?,
            host_contactgroups: parse::host_rules("host_contactgroups", &raw.host_contactgroups)?,
            parents: parse::host_rules("parents", &raw.parents)?,
            clustered_services: parse::boolean_service_rules(
                "clustered_services",
                &raw.clustered_services,
            )?,
            clustered_services_of: raw
                .clustered_services_of
                .iter()
                .map(|(cluster, rules)| {
                    parse::boolean_service_rules(
                        &format!("clustered_services_of['{cluster}']"),
                        rules,
                    )
                    .map(|r| (crate::rules::strip_tags(cluster).to_owned(), r))
                })
                .collect::<Result<_, _>>()?,
            datasource_programs: parse::host_rules("datasource_programs", &raw.datasource_programs)?,
            service_aggregations: parse::aggregation_rules(
                "service_aggregations",
                &raw.service_aggregations,
            )?,
            service_dependencies: parse::dependency_rules(
                "service_dependencies",
                &raw.service_dependencies,
            )?,
            non_aggregated_hosts: parse::binary_host_list(
                "non_aggregated_hosts",
                &raw.non_aggregated_hosts,
            )?,
            summary_host_groups: parse::host_rules("summary_host_groups", &raw.summary_host_groups)?,
            summary_service_groups: parse::service_rules(
                "summary_service_groups",
                &raw.summary_service_groups,
            )?,
            summary_service_contactgroups: parse::service_rules(
                "summary_service_contactgroups",
                &raw.summary_service_contactgroups,
            )?,
            extra_host_conf: host_map("extra_host_conf", &raw.extra_host_conf)?,
            extra_summary_host_conf: host_map(
                "extra_summary_host_conf",
                &raw.extra_summary_host_conf,
            )?,
            extra_service_conf: service_map("extra_service_conf", &raw.extra_service_conf)?,
            extra_summary_service_conf: service_map(
                "extra_summary_service_conf",
                &raw.extra_summary_service_conf,
            )?,
            scanparent_hosts: binary_or(
                "scanparent_hosts",
                &raw.scanparent_hosts,
                BinaryHostList::all_hosts,
            )?,
            filesystem_levels: parse::service_rules("filesystem_levels", &raw.filesystem_levels)?,
        })
    }
}
