//! Scalar settings: templates, timeouts, intervals and output switches.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Whether and how group definitions are emitted.
///
/// `define_hostgroups = true` defines every referenced group with its name
/// as alias; a table maps group names to aliases. An empty table counts
/// as disabled.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum GroupDefinitions {
    /// `true` / `false`.
    Flag(bool),
    /// Group name to alias.
    Aliases(BTreeMap<String, String>),
}

impl Default for GroupDefinitions {
    fn default() -> Self {
        GroupDefinitions::Flag(false)
    }
}

impl GroupDefinitions {
    /// Whether group blocks are written at all.
    pub fn enabled(&self) -> bool {
        match self {
            GroupDefinitions::Flag(on) => *on,
            GroupDefinitions::Aliases(aliases) => !aliases.is_empty(),
        }
    }

    /// Alias of a group; the name itself when none is configured.
    pub fn alias<'a>(&'a self, name: &'a str) -> &'a str {
        match self {
            GroupDefinitions::Aliases(aliases) => aliases.get(name).map_or(name, String::as_str),
            GroupDefinitions::Flag(_) => name,
        }
    }
}

/// Scalar configuration variables. Every field is a top-level key.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// TCP port of the agent.
    pub agent_port: u16,
    /// Agent connect timeout in seconds.
    pub tcp_connect_timeout: f64,
    /// Minimum agent version; embedded into precompiled checks.
    pub agent_min_version: u32,
    /// Cache age used when checking (seconds, 0 = never).
    pub check_max_cachefile_age: u64,
    /// Cache age used for cluster nodes (seconds).
    pub cluster_max_cachefile_age: u64,
    /// Cache age used during inventory (seconds).
    pub inventory_max_cachefile_age: u64,
    /// `pnp` or `standard`.
    pub perfdata_format: String,
    /// `multiline` or `singleline`.
    pub aggregation_output_format: String,
    /// Summary host name template.
    pub aggr_summary_hostname: String,
    /// Also aggregate the `Check_MK` service.
    pub aggregate_check_mk: bool,
    /// Embedded into precompiled checks.
    pub simulation_mode: bool,
    /// Append JSON debug logs to this file.
    pub debug_log: Option<PathBuf>,
    /// Name of the monitoring host; default parent of scanned hosts.
    pub monitoring_host: String,
    /// Parallel traceroute processes during parent scans.
    pub max_num_processes: usize,
    /// Credentials used when no `snmp_communities` rule matches.
    pub snmp_default_community: toml::Value,
    /// Interval of the inventory check in minutes; unset disables it.
    pub inventory_check_interval: Option<u32>,
    /// Exit code of the inventory check on unchecked services.
    pub inventory_check_severity: u8,
    /// Reorganise autochecks after every inventory.
    pub always_cleanup_autochecks: bool,
    /// Host template.
    pub host_template: String,
    /// Cluster host template.
    pub cluster_template: String,
    /// Template of the PING service of service-less hosts.
    pub pingonly_template: String,
    /// Template of the active `Check_MK` service.
    pub active_service_template: String,
    /// Template of the `Check_MK inventory` service.
    pub inventory_check_template: String,
    /// Passive service template.
    pub passive_service_template: String,
    /// Passive service template for checks with performance data.
    pub passive_service_template_perf: String,
    /// Template of aggregated services.
    pub summary_service_template: String,
    /// Template of service dependencies.
    pub service_dependency_template: String,
    /// Host group of hosts without one.
    pub default_host_group: String,
    /// Emit host definitions.
    pub generate_hostconf: bool,
    /// Emit `check_mk-<type>` dummy commands.
    pub generate_dummy_commands: bool,
    /// Command line of the dummy commands.
    pub dummy_check_commandline: String,
    /// Characters removed from items before they enter descriptions.
    pub nagios_illegal_chars: String,
    /// `notes_url` of logwatch services (`%s` host, `%s` file).
    pub logwatch_notes_url: String,
    /// Appended verbatim to the objects file.
    pub extra_nagios_conf: String,
    /// Host group definitions.
    pub define_hostgroups: GroupDefinitions,
    /// Service group definitions.
    pub define_servicegroups: GroupDefinitions,
    /// Contact group definitions.
    pub define_contactgroups: GroupDefinitions,
    /// Embedded into precompiled checks.
    pub nagios_user: Option<String>,
    /// Embedded into precompiled checks.
    pub www_group: Option<String>,
    /// Interpreter line of precompiled host checks.
    pub precompile_interpreter: String,
    /// Check types never inventorised.
    pub ignored_checktypes: Vec<String>,
    /// Per check type description templates.
    pub service_descriptions: BTreeMap<String, String>,
    /// Explicit IP addresses.
    pub ipaddresses: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            agent_port: 6556,
            tcp_connect_timeout: 5.0,
            agent_min_version: 0,
            check_max_cachefile_age: 0,
            cluster_max_cachefile_age: 90,
            inventory_max_cachefile_age: 120,
            perfdata_format: "pnp".to_owned(),
            aggregation_output_format: "multiline".to_owned(),
            aggr_summary_hostname: "%s-s".to_owned(),
            aggregate_check_mk: false,
            simulation_mode: false,
            debug_log: None,
            monitoring_host: "localhost".to_owned(),
            max_num_processes: 50,
            snmp_default_community: toml::Value::String("public".to_owned()),
            inventory_check_interval: None,
            inventory_check_severity: 1,
            always_cleanup_autochecks: false,
            host_template: "check_mk_host".to_owned(),
            cluster_template: "check_mk_cluster".to_owned(),
            pingonly_template: "check_mk_pingonly".to_owned(),
            active_service_template: "check_mk_active".to_owned(),
            inventory_check_template: "check_mk_inventory".to_owned(),
            passive_service_template: "check_mk_passive".to_owned(),
            passive_service_template_perf: "check_mk_passive_perf".to_owned(),
            summary_service_template: "check_mk_summarized".to_owned(),
            service_dependency_template: "check_mk".to_owned(),
            default_host_group: "check_mk".to_owned(),
            generate_hostconf: true,
            generate_dummy_commands: true,
            dummy_check_commandline: "echo \"ERROR - you did an active check on this service - please disable active checks\" && exit 1".to_owned(),
            nagios_illegal_chars: "`~!$%^&*|'\"<>?,()=".to_owned(),
            logwatch_notes_url: "/nagios/logwatch.php?host=%s&file=%s".to_owned(),
            extra_nagios_conf: String::new(),
            define_hostgroups: GroupDefinitions::default(),
            define_servicegroups: GroupDefinitions::default(),
            define_contactgroups: GroupDefinitions::default(),
            nagios_user: None,
            www_group: None,
            precompile_interpreter: "/usr/bin/python".to_owned(),
            ignored_checktypes: Vec::new(),
            service_descriptions: BTreeMap::new(),
            ipaddresses: BTreeMap::new(),
        }
    }
}
