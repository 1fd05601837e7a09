//! Precompiled host checks.
//!
//! For every host a self-contained script is written to
//! `<precompiled_dir>/<host>`. It carries the host's check table and all
//! facts the check run needs as literals, so no rule is evaluated at check
//! time. Shared engine code and plugin sources are copied in with comment
//! lines removed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::catalog::PrecompileHook;
use crate::engine::{Engine, EngineError, SnmpCommand};
use crate::literal::{quote, Item, Value};
use crate::rules::service_extra_conf;

/// Engine module embedded into every artifact.
const BASE_MODULE: &str = "check_mk_base.py";

/// SNMP module embedded when a host has SNMP checks.
const SNMP_MODULE: &str = "snmp.py";

/// Variable whose value `filesystem_levels` may replace.
const FILESYSTEM_DEFAULT_LEVELS: &str = "filesystem_default_levels";

const OPTION_SHIM: &str = "
# very simple commandline parsing: only -v is supported
opt_verbose = '-v' in sys.argv
opt_debug   = False

# make sure these names are defined (even if never needed)
no_inventory_possible = None
precompile_filesystem_levels = None
filesystem_default_levels = None
";

/// One row of a precompiled check table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrecompiledCheck {
    /// Check type.
    pub check_type: String,
    /// Service item.
    pub item: Item,
    /// Fully resolved parameters.
    pub params: Value,
    /// Service description.
    pub description: String,
    /// Aggregated service name, empty when not aggregated.
    pub aggregated_name: String,
}

impl PrecompiledCheck {
    fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::Str(self.check_type.clone()),
            self.item.to_value(),
            self.params.clone(),
            Value::Str(self.description.clone()),
            Value::Str(self.aggregated_name.clone()),
        ])
    }
}

/// Sorted check table of a host with parameters resolved and precompile
/// hooks applied. Dependencies are not needed at check time and dropped.
pub fn precompiled_check_table(
    engine: &Engine,
    host: &str,
) -> Result<Vec<PrecompiledCheck>, EngineError> {
    let mut table = Vec::new();
    for entry in engine.sorted_check_table(host)? {
        let aggregated_name = engine
            .aggregated_service_name(host, &entry.description)
            .unwrap_or_default();
        let hook = engine.plugin(&entry.check_type)?.precompile;
        let params = match hook {
            Some(PrecompileHook::FilesystemLevels) => {
                filesystem_levels(engine, host, &entry.item, &entry.params)
            }
            None => entry.params.clone(),
        };
        table.push(PrecompiledCheck {
            params: engine.resolve_params(&params)?,
            check_type: entry.check_type,
            item: entry.item,
            description: entry.description,
            aggregated_name,
        });
    }
    Ok(table)
}

/// Parameters still referring to `filesystem_default_levels` take the
/// first `filesystem_levels` entry for the mount point instead.
fn filesystem_levels(engine: &Engine, host: &str, item: &Item, params: &Value) -> Value {
    if !matches!(params, Value::Ref(name) if name == FILESYSTEM_DEFAULT_LEVELS) {
        return params.clone();
    }
    let mountpoint = match item {
        Item::Str(s) => s.clone(),
        other => other.to_string(),
    };
    service_extra_conf(
        &engine.facts(host),
        &mountpoint,
        &engine.config().rules.filesystem_levels,
    )
    .first()
    .map_or_else(|| params.clone(), |levels| (*levels).clone())
}

/// Contents of a source file without comment lines. Indentation of the
/// remaining lines is kept.
pub fn stripped_source(path: &Path) -> Result<String, EngineError> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if !line.trim_start().starts_with('#') {
            out.push_str(line);
        }
    }
    Ok(out)
}

fn path_value(path: &Path) -> Value {
    Value::Str(path.display().to_string())
}

fn optional(value: Option<&str>) -> Value {
    value.map_or(Value::None, |v| Value::Str(v.to_owned()))
}

fn count(value: u64) -> Value {
    i64::try_from(value).map_or(Value::None, Value::Int)
}

/// Settings every artifact needs, in output order.
fn global_variables(engine: &Engine) -> Vec<(&'static str, Value)> {
    let config = engine.config();
    let settings = &config.settings;
    let paths = &config.paths;
    vec![
        ("check_mk_version", Value::Str(env!("CARGO_PKG_VERSION").to_owned())),
        ("agent_port", Value::Int(i64::from(settings.agent_port))),
        ("tcp_connect_timeout", Value::Float(settings.tcp_connect_timeout)),
        ("agent_min_version", Value::Int(i64::from(settings.agent_min_version))),
        ("perfdata_format", Value::Str(settings.perfdata_format.clone())),
        (
            "aggregation_output_format",
            Value::Str(settings.aggregation_output_format.clone()),
        ),
        ("aggr_summary_hostname", Value::Str(settings.aggr_summary_hostname.clone())),
        ("nagios_command_pipe_path", path_value(&paths.nagios_command_pipe)),
        ("var_dir", path_value(&paths.var_dir)),
        ("counters_directory", path_value(&paths.counters_dir())),
        ("tcp_cache_dir", path_value(&paths.cache_dir())),
        ("snmpwalks_dir", path_value(&paths.snmpwalks_dir())),
        ("check_mk_basedir", path_value(&paths.config_dir)),
        ("nagios_user", optional(settings.nagios_user.as_deref())),
        ("www_group", optional(settings.www_group.as_deref())),
        ("cluster_max_cachefile_age", count(settings.cluster_max_cachefile_age)),
        ("check_max_cachefile_age", count(settings.check_max_cachefile_age)),
        ("simulation_mode", Value::Bool(settings.simulation_mode)),
        ("aggregate_check_mk", Value::Bool(settings.aggregate_check_mk)),
        (
            "debug_log",
            settings.debug_log.as_deref().map_or(Value::Bool(false), path_value),
        ),
    ]
}

fn function(out: &mut String, name: &str, value: &Value) {
    out.push_str(&format!("def {name}(hostname):\n   return {value}\n\n"));
}

/// Source of the artifact for `host`.
pub fn host_check_source(engine: &Engine, host: &str) -> Result<String, EngineError> {
    let config = engine.config();
    let paths = &config.paths;
    let topology = engine.topology();
    let is_cluster = topology.is_cluster(host);

    let mut out = format!("#!{}\n", config.settings.precompile_interpreter);
    out.push_str(&stripped_source(&paths.modules_dir.join(BASE_MODULE))?);
    out.push_str(OPTION_SHIM);

    out.push_str("\n# Global variables\n");
    for (name, value) in global_variables(engine) {
        out.push_str(&format!("{name} = {value}\n"));
    }

    let table = precompiled_check_table(engine, host)?;
    let literal = Value::List(table.iter().map(PrecompiledCheck::to_value).collect());
    out.push_str(&format!("\n# Checks for {host}\n\n"));
    out.push_str(&format!(
        "def get_sorted_check_table(hostname):\n    return {literal}\n\n"
    ));

    let mut needed = BTreeSet::new();
    let mut need_snmp = false;
    for check in &table {
        let plugin = engine.plugin(&check.check_type)?;
        needed.insert(plugin.file_name());
        need_snmp |= plugin.uses_snmp();
    }
    if need_snmp {
        out.push_str(&stripped_source(&paths.modules_dir.join(SNMP_MODULE))?);
    }

    let mut files = BTreeSet::new();
    for file in &needed {
        let path = paths
            .find_check_plugin(file)
            .ok_or_else(|| EngineError::MissingPlugin {
                check_type: (*file).to_owned(),
                file: paths.checks_dir.join(file).display().to_string(),
            })?;
        files.insert(path);
    }
    out.push_str(
        "check_info = {}\nprecompile_params = {}\ncheck_config_variables = []\n\
         snmp_info = {}\nsnmp_info_single = {}\nsnmp_scan_functions = {}\n",
    );
    for path in &files {
        out.push_str(&format!("# {}\n", path.display()));
        out.push_str(&stripped_source(path)?);
        out.push_str("\n\n");
    }
    out.push_str("do_rrd_update = False\n");

    if is_cluster {
        let nodes = Value::List(
            topology
                .nodes_of(host)
                .iter()
                .map(|n| Value::Str(n.clone()))
                .collect(),
        );
        out.push_str(&format!("clusters = {{ {} : {nodes} }}\n", quote(host)));
        out.push_str("def is_cluster(hostname):\n    return True\n\n");
    } else {
        out.push_str("clusters = {}\ndef is_cluster(hostname):\n    return False\n\n");
    }

    function(&mut out, "is_snmp_host", &Value::Bool(engine.is_snmp_host(host)));
    function(&mut out, "is_tcp_host", &Value::Bool(engine.is_tcp_host(host)));
    function(
        &mut out,
        "snmp_get_command",
        &Value::Str(engine.snmp_command(host, SnmpCommand::Get)?),
    );
    function(
        &mut out,
        "snmp_walk_command",
        &Value::Str(engine.snmp_command(host, SnmpCommand::Walk)?),
    );
    function(&mut out, "is_usewalk_host", &Value::Bool(engine.is_usewalk_host(host)));

    let (ipaddress, nodes) = if is_cluster {
        let mut nodes = Vec::new();
        for node in topology.nodes_of(host) {
            nodes.push((node.clone(), engine.require_ipaddress(node)?));
        }
        (None, nodes)
    } else {
        let ip = engine.require_ipaddress(host)?;
        (Some(ip.clone()), vec![(host.to_owned(), ip)])
    };
    let ipaddresses = Value::Dict(
        nodes
            .iter()
            .map(|(n, ip)| (Value::Str(n.clone()), Value::Str(ip.clone())))
            .collect(),
    );
    out.push_str(&format!("ipaddresses = {ipaddresses}\n\n"));

    let programs = Value::Dict(
        nodes
            .iter()
            .map(|(n, ip)| (Value::Str(n.clone()), optional(engine.datasource_program(n, ip).as_deref())))
            .collect(),
    );
    out.push_str(&format!(
        "def get_datasource_program(hostname, ipaddress):\n    return {programs}[hostname]\n\n"
    ));
    out.push_str(&format!(
        "def host_is_aggregated(hostname):\n    return {}\n\n",
        Value::Bool(engine.host_is_aggregated(host))
    ));

    for file in &needed {
        for plugin in engine.catalog().iter().filter(|p| p.file_name() == *file) {
            for var in plugin.variables {
                if let Some(value) = engine.variables().get(var.name) {
                    out.push_str(&format!("{} = {}\n", var.name, engine.resolve_params(value)?));
                }
            }
        }
    }

    out.push_str(&format!(
        "do_check({}, {})\n",
        quote(host),
        optional(ipaddress.as_deref())
    ));
    Ok(out)
}

/// Write the artifact of `host` and make it executable.
pub fn precompile_host(engine: &Engine, host: &str) -> Result<PathBuf, EngineError> {
    let dir = engine.config().paths.precompiled_dir();
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| EngineError::Io { path, source }
    };
    std::fs::create_dir_all(&dir).map_err(io(&dir))?;
    let path = dir.join(host);
    let source = host_check_source(engine, host)?;
    std::fs::write(&path, source).map_err(io(&path))?;
    set_executable(&path).map_err(io(&path))?;
    tracing::debug!(host, path = %path.display(), "precompiled host check");
    Ok(path)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Precompile every active host and cluster. The first failure aborts.
pub fn precompile_all(engine: &Engine) -> Result<Vec<PathBuf>, EngineError> {
    let mut written = Vec::new();
    for host in engine.active_hosts_and_clusters() {
        match precompile_host(engine, &host) {
            Ok(path) => written.push(path),
            Err(e) => {
                tracing::error!(host = %host, error = %e, "error precompiling checks");
                return Err(e);
            }
        }
    }
    tracing::info!(hosts = written.len(), "precompiled host checks");
    Ok(written)
}
