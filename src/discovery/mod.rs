//! Service discovery (inventory).
//!
//! Discovery asks a [`DataSource`] for the raw data of a check type, runs
//! the plugin's discovery function on it and compares the result with the
//! services a host already has. New services are written to a timestamped
//! autochecks file unless the run only checks.

pub mod datasource;
pub mod sections;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::autochecks::{self, AutocheckError};
use crate::catalog::{CheckPlugin, DiscoveryContext, ScanContext, Transport};
use crate::engine::snmp::{SYS_DESCR_OID, SYS_OBJECT_ID_OID};
use crate::engine::{Engine, EngineError};
use crate::literal::Item;

pub use datasource::{DataSource, DataSourceError, LiveDataSource, WalkRow};
pub use sections::{parse_agent_output, AgentSections};

/// Errors that stop a discovery run.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// A check type that no plugin provides.
    #[error("No such check type '{0}'. Try cmk list-checks.")]
    UnknownCheckType(String),

    /// A check type without a discovery function.
    #[error("Check type '{0}' does not support inventory")]
    NotInventorable(String),

    /// Data of a host could not be fetched. Only fatal when checking.
    #[error("Host '{host}': {source}")]
    Host {
        /// Affected host.
        host: String,
        /// Underlying error.
        #[source]
        source: DataSourceError,
    },

    /// Host or service configuration could not be evaluated.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Autochecks could not be written.
    #[error(transparent)]
    Autochecks(#[from] AutocheckError),
}

/// How a discovered service relates to what the host already has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Not monitored yet.
    New,
    /// Already monitored.
    Old,
    /// Not monitored and excluded by `ignored_services`.
    Ignored,
    /// Monitored but excluded by `ignored_services`.
    Obsolete,
    /// An autocheck that discovery no longer finds.
    Vanished,
    /// A configured check that discovery does not find.
    Manual,
    /// A legacy active check.
    Legacy,
}

impl ServiceState {
    /// Lower case name used in automation output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Old => "old",
            Self::Ignored => "ignored",
            Self::Obsolete => "obsolete",
            Self::Vanished => "vanished",
            Self::Manual => "manual",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service found by discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredService {
    /// Host the service belongs to; a cluster for clustered services.
    pub host: String,
    /// Check type.
    pub check_type: String,
    /// Service item.
    pub item: Item,
    /// Parameters as literal source.
    pub paramstring: String,
    /// Classification; [`ServiceState::New`] unless states were requested.
    pub state: ServiceState,
}

/// Switches of an inventory run.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryOptions {
    /// Do not write autochecks, and fail on unreachable hosts.
    pub check_only: bool,
    /// Report known and ignored services too, classified.
    pub include_state: bool,
}

// ---------------------------------------------------------------------------
// Host data
// ---------------------------------------------------------------------------

/// Raw data a plugin discovers from: the lines of its agent section, or the
/// rows of its SNMP table. `None` when the agent has no such section.
pub async fn host_info(
    engine: &Engine,
    source: &dyn DataSource,
    host: &str,
    ip: &str,
    plugin: &CheckPlugin,
) -> Result<Option<Vec<Vec<String>>>, DataSourceError> {
    let max_age = engine.config().settings.inventory_max_cachefile_age;
    match plugin.transport {
        Transport::Agent { section } => {
            let output = source.agent_output(host, ip, max_age).await?;
            Ok(parse_agent_output(&output).remove(section))
        }
        Transport::Snmp { base_oid, columns } => {
            let mut walked = Vec::with_capacity(columns.len());
            for column in columns {
                let oid = format!("{}.{column}", base_oid.trim_start_matches('.'));
                let rows = source.snmp_walk(host, ip, &oid).await?;
                walked.push((oid, rows));
            }
            Ok(Some(snmp_table(&walked)))
        }
    }
}

/// Join column walks into rows by OID index. The first column decides
/// which rows exist; missing cells are empty.
pub fn snmp_table(columns: &[(String, Vec<WalkRow>)]) -> Vec<Vec<String>> {
    let indexed: Vec<(Vec<String>, BTreeMap<String, String>)> = columns
        .iter()
        .map(|(oid, rows)| {
            let mut order = Vec::with_capacity(rows.len());
            let mut cells = BTreeMap::new();
            for (row_oid, value) in rows {
                let index = row_oid
                    .trim_start_matches('.')
                    .strip_prefix(oid.as_str())
                    .map(|rest| rest.trim_start_matches('.'))
                    .unwrap_or(row_oid)
                    .to_owned();
                order.push(index.clone());
                cells.insert(index, value.clone());
            }
            (order, cells)
        })
        .collect();

    let Some((order, _)) = indexed.first() else {
        return Vec::new();
    };
    order
        .iter()
        .map(|index| {
            indexed
                .iter()
                .map(|(_, cells)| cells.get(index).cloned().unwrap_or_default())
                .collect()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Discover services of `check_type` on `hosts` (all active hosts when
/// empty). A host may be given as `name/ip` to bypass address lookup.
///
/// Hosts whose transport does not fit the check type, hosts ignoring it
/// and clusters are skipped. Hosts that cannot be reached are reported and
/// skipped unless `check_only` is set.
pub async fn make_inventory(
    engine: &Engine,
    source: &dyn DataSource,
    check_type: &str,
    hosts: &[String],
    options: InventoryOptions,
) -> Result<Vec<DiscoveredService>, DiscoveryError> {
    let plugin = engine
        .catalog()
        .get(check_type)
        .ok_or_else(|| DiscoveryError::UnknownCheckType(check_type.to_owned()))?;
    let discover = plugin
        .discovery
        .ok_or_else(|| DiscoveryError::NotInventorable(check_type.to_owned()))?;
    let is_snmp_check = plugin.uses_snmp();

    let hosts = if hosts.is_empty() {
        engine.topology().active_hosts().to_vec()
    } else {
        hosts.to_vec()
    };

    let mut lines: Vec<String> = Vec::new();
    let mut found = Vec::new();
    for spec in &hosts {
        let (hostname, explicit_ip) = match spec.split_once('/') {
            Some((name, ip)) => (name, Some(ip.to_owned())),
            None => (spec.as_str(), None),
        };
        if is_snmp_check && !engine.is_snmp_host(hostname) {
            continue;
        }
        if !is_snmp_check && !engine.is_tcp_host(hostname) {
            continue;
        }
        if engine.checktype_ignored_for_host(hostname, check_type) {
            continue;
        }
        if engine.topology().is_cluster(hostname) {
            tracing::warn!(host = hostname, "is a cluster host and cannot be inventorized");
            continue;
        }
        let Some(ip) = explicit_ip.or_else(|| engine.lookup_ipaddress(hostname)) else {
            tracing::warn!(host = hostname, "Cannot resolve {hostname} into IP address.");
            continue;
        };

        let info = match host_info(engine, source, hostname, &ip, plugin).await {
            Ok(Some(info)) => info,
            Ok(None) => continue,
            Err(error) if options.check_only => {
                return Err(DiscoveryError::Host {
                    host: hostname.to_owned(),
                    source: error,
                })
            }
            Err(e) => {
                tracing::warn!(host = hostname, error = %e, "Host '{hostname}': {e}");
                continue;
            }
        };

        let ctx = DiscoveryContext {
            check_type,
            lines: &info,
            variables: engine.variables(),
        };
        for discovered in discover(&ctx) {
            let description = engine.service_description(check_type, &discovered.item)?;
            let owner = engine.host_of_clustered_service(hostname, &description);
            let table = engine.check_table(&owner)?;

            let mut state = ServiceState::New;
            if table.contains_key(&(check_type.to_owned(), discovered.item.clone())) {
                if !options.include_state {
                    continue;
                }
                state = ServiceState::Old;
            }
            if engine.service_ignored(&owner, &description) {
                if !options.include_state {
                    continue;
                }
                state = if state == ServiceState::Old {
                    ServiceState::Obsolete
                } else {
                    ServiceState::Ignored
                };
            }

            let line = autochecks::inventory_line(
                &owner,
                check_type,
                &discovered.item,
                &discovered.paramstring,
            );
            if lines.contains(&line) {
                continue;
            }
            lines.push(line);
            found.push(DiscoveredService {
                host: owner,
                check_type: check_type.to_owned(),
                item: discovered.item,
                paramstring: discovered.paramstring,
                state,
            });
        }
    }

    if !options.check_only && !lines.is_empty() {
        let dir = engine.config().paths.autochecks_dir();
        let path = autochecks::write_inventory_file(&dir, check_type, chrono::Local::now(), &lines)?;
        tracing::info!(check_type, new = lines.len(), path = %path.display(), "wrote new checks");
    }
    Ok(found)
}

/// SNMP check types a device supports. A device that does not answer
/// `sysDescr` supports none.
pub async fn snmp_scan(
    engine: &Engine,
    source: &dyn DataSource,
    host: &str,
    ip: &str,
) -> Vec<&'static str> {
    tracing::debug!(host, ip, "scanning host for SNMP checks");
    let Some(sys_descr) = source.snmp_get(host, ip, SYS_DESCR_OID).await else {
        tracing::info!(host, "no SNMP answer");
        return Vec::new();
    };
    let sys_object_id = source.snmp_get(host, ip, SYS_OBJECT_ID_OID).await;
    let found = engine.catalog().snmp_scan(&ScanContext {
        sys_descr: &sys_descr,
        sys_object_id: sys_object_id.as_deref(),
    });
    if found.is_empty() {
        tracing::debug!(host, "nothing detected");
    } else {
        tracing::debug!(host, check_types = ?found, "detected");
    }
    found
}

/// Scan SNMP hosts (all active hosts when empty) and inventory every check
/// type the scan finds.
pub async fn do_snmp_scan(
    engine: &Engine,
    source: &dyn DataSource,
    hosts: &[String],
    options: InventoryOptions,
) -> Result<Vec<DiscoveredService>, DiscoveryError> {
    let hosts = if hosts.is_empty() {
        engine.topology().active_hosts().to_vec()
    } else {
        hosts.to_vec()
    };
    let mut result = Vec::new();
    for host in &hosts {
        if !engine.is_snmp_host(host) {
            tracing::debug!(host = %host, "skipping, not an snmp host");
            continue;
        }
        let Some(ip) = engine.lookup_ipaddress(host) else {
            tracing::warn!(host = %host, "Cannot resolve {host} into IP address. Skipping.");
            continue;
        };
        for check_type in snmp_scan(engine, source, host, &ip).await {
            if engine.catalog().get(check_type).is_some_and(|p| p.discovery.is_none()) {
                continue;
            }
            tracing::debug!(host = %host, check_type, "trying inventory");
            let found =
                make_inventory(engine, source, check_type, std::slice::from_ref(host), options)
                    .await?;
            result.extend(found);
        }
    }
    Ok(result)
}

// ---------------------------------------------------------------------------
// Inventory runs
// ---------------------------------------------------------------------------

/// Check types an inventory run covers: the given ones, or every
/// inventorable type (including SNMP) when none are given.
pub fn selected_check_types(engine: &Engine, check_types: &[String]) -> Vec<String> {
    if check_types.is_empty() {
        engine
            .catalog()
            .inventorable(true)
            .into_iter()
            .map(str::to_owned)
            .collect()
    } else {
        check_types.to_vec()
    }
}

/// Forget existing autochecks of `check_types` on `hosts` (every active
/// host and cluster when empty) before re-inventorising them. The engine
/// has to re-read its autochecks afterwards.
pub fn remove_for_redo(
    engine: &Engine,
    check_types: &[String],
    hosts: &[String],
) -> Result<usize, DiscoveryError> {
    let check_types = selected_check_types(engine, check_types);
    let check_types: Vec<&str> = check_types.iter().map(String::as_str).collect();
    let hosts = if hosts.is_empty() {
        engine.active_hosts_and_clusters()
    } else {
        hosts.to_vec()
    };
    let dir = engine.config().paths.autochecks_dir();
    let mut removed: usize = 0;
    for host in &hosts {
        removed = removed.saturating_add(autochecks::remove_autochecks_of(&dir, host, &check_types)?);
    }
    tracing::info!(removed, "removed existing autochecks");
    Ok(removed)
}

/// Inventorise `hosts` (all active hosts when empty). Without explicit
/// check types, SNMP hosts are scanned and every TCP type is tried;
/// otherwise exactly the given types are. New services are written to the
/// autochecks directory and returned.
pub async fn run_inventory(
    engine: &Engine,
    source: &dyn DataSource,
    check_types: &[String],
    hosts: &[String],
) -> Result<Vec<DiscoveredService>, DiscoveryError> {
    let options = InventoryOptions::default();
    let mut found = Vec::new();
    let check_types: Vec<String> = if check_types.is_empty() {
        found.extend(do_snmp_scan(engine, source, hosts, options).await?);
        engine
            .catalog()
            .inventorable(false)
            .into_iter()
            .map(str::to_owned)
            .collect()
    } else {
        check_types.to_vec()
    };
    for check_type in &check_types {
        found.extend(make_inventory(engine, source, check_type, hosts, options).await?);
    }
    Ok(found)
}

/// Number of new services per check type, in check type order.
pub fn count_by_check_type(services: &[DiscoveredService]) -> BTreeMap<&str, usize> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for service in services {
        let count = counts.entry(service.check_type.as_str()).or_default();
        *count = count.saturating_add(1);
    }
    counts
}

// ---------------------------------------------------------------------------
// Inventory check
// ---------------------------------------------------------------------------

/// Result of [`check_inventory`] in monitoring plugin form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryCheck {
    /// Plugin exit status: 0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN.
    pub exit_code: u8,
    /// Status line followed by one line per unchecked service.
    pub output: String,
}

fn status_text(severity: u8) -> &'static str {
    match severity {
        0 => "OK",
        1 => "WARNING",
        2 => "CRITICAL",
        _ => "UNKNOWN",
    }
}

/// Count services discovery would add to `host`. SNMP hosts are only
/// checked for SNMP types, and SNMP types only when the host already has
/// checks of that type.
pub async fn check_inventory(engine: &Engine, source: &dyn DataSource, host: &str) -> InventoryCheck {
    match unchecked_services(engine, source, host).await {
        Ok(new) if new.is_empty() => InventoryCheck {
            exit_code: 0,
            output: "OK - no unchecked services found\n".to_owned(),
        },
        Ok(new) => {
            let severity = engine.config().settings.inventory_check_severity;
            let mut counts: Vec<(&str, usize)> = Vec::new();
            for service in &new {
                match counts.iter_mut().find(|(ct, _)| *ct == service.check_type) {
                    Some((_, n)) => *n = n.saturating_add(1),
                    None => counts.push((service.check_type.as_str(), 1)),
                }
            }
            let info: Vec<String> = counts.iter().map(|(ct, n)| format!("{ct}:{n}")).collect();
            let mut output = format!(
                "{} - {} unchecked services ({})\n",
                status_text(severity),
                new.len(),
                info.join(", ")
            );
            for service in &new {
                let description = engine
                    .service_description(&service.check_type, &service.item)
                    .unwrap_or_else(|_| service.item.to_string());
                output.push_str(&format!("{}: {description}\n", service.check_type));
            }
            InventoryCheck {
                exit_code: severity,
                output,
            }
        }
        Err(e) => InventoryCheck {
            exit_code: 3,
            output: format!("UNKNOWN - {e}\n"),
        },
    }
}

async fn unchecked_services(
    engine: &Engine,
    source: &dyn DataSource,
    host: &str,
) -> Result<Vec<DiscoveredService>, DiscoveryError> {
    let only_snmp = engine.is_snmp_host(host);
    let table = engine.check_table(host)?;
    let host_types: BTreeSet<&str> = table.keys().map(|(ct, _)| ct.as_str()).collect();
    let options = InventoryOptions {
        check_only: true,
        include_state: false,
    };

    let mut new = Vec::new();
    for check_type in engine.catalog().inventorable(true) {
        let uses_snmp = engine.check_uses_snmp(check_type);
        if only_snmp && !uses_snmp {
            continue;
        }
        if uses_snmp && !host_types.contains(check_type) {
            continue;
        }
        let found = make_inventory(engine, source, check_type, &[host.to_owned()], options).await?;
        new.extend(found);
    }
    Ok(new)
}
