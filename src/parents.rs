//! Parent discovery via traceroute.
//!
//! Hosts are traced in chunks of at most `max_num_processes` concurrent
//! `traceroute` runs; a chunk is fully collected before the next starts.
//! The farthest answering hop that is not the host itself becomes its
//! parent. Gateways that are not configured hosts are added as artificial
//! `gw-a-b-c-d` hosts. The result replaces `conf.d/parents.toml`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Serialize;
use tokio::process::Command;
use tokio::task::JoinSet;

use crate::config::PARENTS_FILE;
use crate::engine::Engine;
use crate::rules::in_binary_hostlist;

/// Maximum hop count passed to traceroute.
const MAX_HOPS: u32 = 15;

/// Errors of a parent scan.
#[derive(Debug, thiserror::Error)]
pub enum ParentScanError {
    /// The result file could not be written.
    #[error("cannot write {}: {source}", .path.display())]
    Io {
        /// Target file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The result could not be serialised.
    #[error("cannot serialise parents: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// What a traceroute run says about a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trace {
    /// Reached through the router with this address.
    Gateway(String),
    /// Reached directly; the monitoring host is the parent.
    Direct,
    /// The host is the monitoring host itself.
    MonitoringHost,
    /// No usable answer.
    Failed(String),
}

/// Interpret the output of `traceroute -n`. The first line is the banner.
pub fn parse_traceroute(output: &str, host_ip: Option<&str>, monitoring_ip: Option<&str>) -> Trace {
    let lines: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return Trace::Failed("Cannot execute traceroute. Is traceroute installed? Are you root?".to_owned());
    }
    if lines.len() < 2 {
        return Trace::Failed(lines.join(" "));
    }

    let mut routes: Vec<Option<&str>> = Vec::new();
    for line in lines.iter().skip(1) {
        match line.split_whitespace().nth(1) {
            Some(route) if route.matches('.').count() == 3 => routes.push(Some(route)),
            Some("*") => routes.push(None),
            _ => tracing::warn!(line = %line, "invalid output line from traceroute"),
        }
    }

    match routes.len() {
        0 => Trace::Failed("incomplete output from traceroute. No routes found.".to_owned()),
        1 if host_ip.is_some() && host_ip == monitoring_ip => Trace::MonitoringHost,
        1 => Trace::Direct,
        _ => routes
            .iter()
            .rev()
            .flatten()
            .find(|r| Some(**r) != host_ip)
            .map_or_else(
                || Trace::Failed("No usable routing information".to_owned()),
                |r| Trace::Gateway((*r).to_owned()),
            ),
    }
}

/// Parents found by a scan, in the shape of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParentScan {
    /// Artificial gateway hosts, tagged `parent`.
    pub all_hosts: Vec<String>,
    /// `[parent, [hosts]]` rules.
    pub parents: Vec<(String, Vec<String>)>,
    /// Addresses of the artificial gateway hosts.
    pub ipaddresses: BTreeMap<String, String>,
}

impl ParentScan {
    /// Record the outcome for one host.
    fn add(&mut self, engine: &Engine, known_gateways: &mut BTreeSet<String>, host: &str, trace: &Trace) {
        let monitoring_host = &engine.config().settings.monitoring_host;
        let gateway = match trace {
            Trace::Gateway(ip) => match engine.topology().host_of_ip(ip) {
                Some(name) => Some(name.to_owned()),
                None => {
                    let name = format!("gw-{}", ip.replace('.', "-"));
                    if known_gateways.insert(name.clone()) {
                        self.all_hosts.push(format!("{name}|parent"));
                        self.ipaddresses.insert(name.clone(), ip.clone());
                        self.parents.push((monitoring_host.clone(), vec![name.clone()]));
                    }
                    Some(name)
                }
            },
            Trace::Direct => Some(monitoring_host.clone()),
            Trace::MonitoringHost | Trace::Failed(_) => None,
        };
        match gateway {
            Some(gateway) => self.parents.push((gateway, vec![host.to_owned()])),
            None if host != monitoring_host => {
                self.parents.push((monitoring_host.clone(), vec![host.to_owned()]));
            }
            None => {}
        }
    }

    /// Configuration text of the result.
    pub fn to_toml(&self, now: chrono::DateTime<chrono::Local>) -> Result<String, ParentScanError> {
        let mut text = format!(
            "# Automatically created by scan-parents at {}\n\n\
             # Do not edit this file. If you want to convert an\n\
             # artificial gateway host into a permanent one, then\n\
             # move its definition into another file\n\n",
            now.format("%a %b %e %H:%M:%S %Y")
        );
        text.push_str(&toml::to_string(self)?);
        Ok(text)
    }
}

/// Hosts a scan without explicit host names covers.
pub fn default_scan_hosts(engine: &Engine) -> Vec<String> {
    let scanparent_hosts = &engine.config().rules.scanparent_hosts;
    engine
        .topology()
        .all_hosts()
        .iter()
        .filter(|h| in_binary_hostlist(&engine.facts(h), scanparent_hosts))
        .cloned()
        .collect()
}

async fn traceroute(ip: String) -> std::io::Result<(bool, String)> {
    let output = Command::new("traceroute")
        .args(["-m", &MAX_HOPS.to_string(), "-n", "-w", "3", &ip])
        .env("LANG", "")
        .env("LC_ALL", "")
        .output()
        .await?;
    Ok((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}

/// Trace a chunk of hosts concurrently and wait for all of them.
async fn trace_chunk(engine: &Engine, chunk: &[String], monitoring_ip: Option<&str>) -> Vec<Trace> {
    let mut traces = vec![Trace::Failed("not traced".to_owned()); chunk.len()];
    let mut addresses = vec![None; chunk.len()];
    let mut running = JoinSet::new();
    for (index, host) in chunk.iter().enumerate() {
        let Some(ip) = engine.lookup_ipaddress(host) else {
            tracing::warn!(host = %host, "cannot resolve host name");
            if let Some(slot) = traces.get_mut(index) {
                *slot = Trace::Failed("cannot resolve host name".to_owned());
            }
            continue;
        };
        tracing::debug!(host = %host, ip = %ip, "running traceroute");
        if let Some(slot) = addresses.get_mut(index) {
            *slot = Some(ip.clone());
        }
        running.spawn(async move { (index, traceroute(ip).await) });
    }

    while let Some(joined) = running.join_next().await {
        let Ok((index, result)) = joined else {
            continue;
        };
        let trace = match result {
            Ok((true, output)) => {
                let host_ip = addresses.get(index).cloned().flatten();
                parse_traceroute(&output, host_ip.as_deref(), monitoring_ip)
            }
            Ok((false, _)) => Trace::Failed("traceroute failed".to_owned()),
            Err(e) => Trace::Failed(format!("cannot run traceroute: {e}")),
        };
        if let (Trace::Failed(reason), Some(host)) = (&trace, chunk.get(index)) {
            tracing::warn!(host = %host, "{reason}");
        }
        if let Some(slot) = traces.get_mut(index) {
            *slot = trace;
        }
    }
    traces
}

/// Find parents of `hosts`, or of all hosts in `scanparent_hosts` when
/// none are given. Hosts that already have parents are skipped.
pub async fn scan_parents(engine: &Engine, hosts: &[String]) -> ParentScan {
    let hosts = if hosts.is_empty() {
        default_scan_hosts(engine)
    } else {
        hosts.to_vec()
    };
    let settings = &engine.config().settings;
    let chunk_size = settings.max_num_processes.max(1);
    let monitoring_ip = engine.lookup_ipaddress(&settings.monitoring_host);
    tracing::info!(processes = chunk_size, "scanning for parents");

    let todo: Vec<String> = hosts
        .into_iter()
        .filter(|h| {
            let manual = !engine.parents_of(h).is_empty();
            if manual {
                tracing::debug!(host = %h, "has a manual parent");
            }
            !manual
        })
        .collect();

    let mut scan = ParentScan::default();
    let mut known_gateways = BTreeSet::new();
    for chunk in todo.chunks(chunk_size) {
        let traces = trace_chunk(engine, chunk, monitoring_ip.as_deref()).await;
        for (host, trace) in chunk.iter().zip(&traces) {
            tracing::debug!(host = %host, ?trace, "traced");
            scan.add(engine, &mut known_gateways, host, trace);
        }
    }
    scan
}

/// Write the scan result to `conf.d/parents.toml`.
pub fn write_parents_file(engine: &Engine, scan: &ParentScan) -> Result<PathBuf, ParentScanError> {
    let dir = engine.config().paths.conf_d();
    let path = dir.join(PARENTS_FILE);
    let text = scan.to_toml(chrono::Local::now())?;
    std::fs::create_dir_all(&dir)
        .and_then(|()| std::fs::write(&path, text))
        .map_err(|source| ParentScanError::Io {
            path: path.clone(),
            source,
        })?;
    tracing::info!(path = %path.display(), "wrote parents");
    Ok(path)
}
