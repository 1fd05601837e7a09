//! Human readable reports: host dumps, host lists, the path overview and
//! the check catalog table. Everything is returned as text for stdout.

use std::path::Path;

use crate::catalog::CheckCatalog;
use crate::config::PathsConfig;
use crate::engine::{Engine, EngineError, SnmpCredentials};
use crate::rules::hosttags_match_taglist;

// ── tables ──────────────────────────────────────────────────────

fn format_row<'a>(indent: &str, widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = indent.to_owned();
    for (i, (cell, &width)) in cells.zip(widths).enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&format!("{cell:<width$}"));
    }
    line.push('\n');
    line
}

/// Left aligned columns separated by one space, with a dashed line below
/// the headers. Trailing padding is kept so columns line up.
pub fn format_table(headers: &[&str], rows: &[Vec<String>], indent: &str) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = format_row(indent, &widths, headers.iter().copied());
    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format_row(indent, &widths, dashes.iter().map(String::as_str)));
    for row in rows {
        out.push_str(&format_row(indent, &widths, row.iter().map(String::as_str)));
    }
    out
}

// ── dump ────────────────────────────────────────────────────────

fn describe_credentials(credentials: &SnmpCredentials) -> String {
    match credentials {
        SnmpCredentials::Community(community) => format!("community: '{community}'"),
        SnmpCredentials::V3 { level, user, .. } => format!("v3: {level}, user '{user}'"),
    }
}

fn field(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!("{:<24}{value}\n", format!("{label}:")));
}

/// Summary and service table of one host or cluster.
pub fn dump_host(engine: &Engine, host: &str) -> Result<String, EngineError> {
    let topology = engine.topology();
    let is_cluster = topology.is_cluster(host);
    let mut out = String::from("\n");
    if is_cluster {
        out.push_str(&format!("{host} (cluster of {})\n", topology.nodes_of(host).join(",")));
    } else {
        out.push_str(&format!("{host}\n"));
    }

    field(&mut out, "Tags", &topology.tags_of(host).join(", "));
    let parents = if is_cluster {
        topology.nodes_of(host).to_vec()
    } else {
        engine.parents_of(host)
    };
    if !parents.is_empty() {
        field(&mut out, "Parents", &parents.join(", "));
    }
    field(&mut out, "Host groups", &engine.hostgroups_of(host).join(", "));
    field(&mut out, "Contact groups", &engine.host_contactgroups_of(&[host]).join(", "));

    let agent_type = if engine.is_snmp_host(host) {
        let bulk = if engine.is_bulkwalk_host(host) { "yes" } else { "no" };
        format!(
            "SNMP ({}, bulk walk: {bulk})",
            describe_credentials(&engine.snmp_credentials(host)?)
        )
    } else if engine.is_tcp_host(host) {
        format!("TCP (port: {})", engine.config().settings.agent_port)
    } else {
        "PING only".to_owned()
    };
    field(&mut out, "Type of agent", &agent_type);

    let aggregated = engine.host_is_aggregated(host);
    if aggregated {
        let summary = engine.summary_hostname(host);
        field(&mut out, "Is aggregated", "yes");
        field(&mut out, "Summary host", &summary);
        field(&mut out, "Summary host groups", &engine.summary_hostgroups_of(host).join(", "));
        field(
            &mut out,
            "Summary contact groups",
            &engine.host_contactgroups_of(&[summary.as_str()]).join(", "),
        );
    } else {
        field(&mut out, "Is aggregated", "no");
    }

    out.push_str("Services:\n");
    let with_deps = !engine.config().rules.service_dependencies.is_empty();
    let mut headers = vec![
        "checktype",
        "item",
        "params",
        "description",
        "groups",
        "summarized to",
        "groups",
    ];
    if with_deps {
        headers.push("depends on");
    }

    let rows: Vec<Vec<String>> = engine
        .sorted_check_table(host)?
        .into_iter()
        .map(|entry| {
            let (summarized, summary_groups) = match engine
                .aggregated_service_name(host, &entry.description)
                .filter(|_| aggregated)
            {
                Some(name) => {
                    let groups = engine.summary_service_groups_of(host, &name).join(",");
                    (name, groups)
                }
                None => (String::new(), String::new()),
            };
            let mut row = vec![
                entry.check_type,
                entry.item.to_string(),
                entry.params.to_string(),
                entry.description.clone(),
                engine.service_groups_of(host, &entry.description).join(","),
                summarized,
                summary_groups,
            ];
            if with_deps {
                row.push(entry.deps.join(","));
            }
            row
        })
        .collect();
    out.push_str(&format_table(&headers, &rows, "  "));
    Ok(out)
}

/// Dump the given hosts, or every host and active cluster when empty.
/// Hosts that cannot be evaluated are reported and skipped.
pub fn dump_hosts(engine: &Engine, hosts: &[String]) -> String {
    let mut hosts: Vec<String> = if hosts.is_empty() {
        let topology = engine.topology();
        topology
            .all_hosts()
            .iter()
            .chain(topology.active_clusters())
            .cloned()
            .collect()
    } else {
        hosts.to_vec()
    };
    hosts.sort();
    hosts.dedup();

    let mut out = String::new();
    for host in &hosts {
        match dump_host(engine, host) {
            Ok(text) => out.push_str(&text),
            Err(e) => tracing::warn!(host = %host, error = %e, "cannot dump host"),
        }
    }
    out
}

// ── host lists ──────────────────────────────────────────────────

/// Active hosts and clusters, restricted to members of `hostgroups` when
/// any are given.
pub fn list_hosts(engine: &Engine, hostgroups: &[String]) -> Vec<String> {
    engine
        .active_hosts_and_clusters()
        .into_iter()
        .filter(|host| {
            hostgroups.is_empty()
                || engine
                    .hostgroups_of(host)
                    .iter()
                    .any(|group| hostgroups.contains(group))
        })
        .collect()
}

/// Active hosts and clusters whose tags satisfy `tags` (`!tag` negates).
pub fn list_hosts_with_tags(engine: &Engine, tags: &[String]) -> Vec<String> {
    engine
        .active_hosts_and_clusters()
        .into_iter()
        .filter(|host| hosttags_match_taglist(engine.topology().tags_of(host), tags))
        .collect()
}

// ── paths ───────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Installation,
    Configuration,
    Runtime,
    Pipe,
    Local,
}

/// Overview of every directory and file in use, grouped by who owns it.
pub fn show_paths(paths: &PathsConfig) -> String {
    use PathKind::*;
    let mut entries: Vec<(&Path, bool, PathKind, &str)> = Vec::new();
    let derived = [
        paths.conf_d(),
        paths.autochecks_dir(),
        paths.precompiled_dir(),
        paths.snmpwalks_dir(),
        paths.counters_dir(),
        paths.cache_dir(),
        paths.logwatch_dir(),
        paths.nagios_objects_file(),
    ];
    let [conf_d, autochecks, precompiled, snmpwalks, counters, cache, logwatch, objects] = &derived;

    entries.extend([
        (paths.modules_dir.as_path(), true, Installation, "Main components of check_mk"),
        (paths.checks_dir.as_path(), true, Installation, "Checks"),
        (paths.nagios_startscript.as_path(), false, Installation, "Startscript for Nagios daemon"),
        (paths.nagios_binary.as_path(), false, Installation, "Path to Nagios executable"),
        (paths.config_dir.as_path(), true, Configuration, "Directory that contains main.toml"),
        (conf_d.as_path(), true, Configuration, "Directory containing further *.toml files"),
        (paths.nagios_config_file.as_path(), false, Configuration, "Main configuration file of Nagios"),
        (paths.var_dir.as_path(), true, Runtime, "Base working directory for variable data"),
        (autochecks.as_path(), true, Runtime, "Checks found by inventory"),
        (precompiled.as_path(), true, Runtime, "Precompiled host checks"),
        (snmpwalks.as_path(), true, Runtime, "Stored snmpwalks (output of snmpwalk)"),
        (counters.as_path(), true, Runtime, "Current state of performance counters"),
        (cache.as_path(), true, Runtime, "Cached output from agents"),
        (logwatch.as_path(), true, Runtime, "Unacknowledged logfiles of logwatch extension"),
        (objects.as_path(), false, Runtime, "File into which Nagios configuration is written"),
        (paths.nagios_command_pipe.as_path(), false, Pipe, "Nagios command pipe"),
    ]);
    if let Some(local) = &paths.local_checks_dir {
        entries.push((local.as_path(), true, Local, "Locally installed checks"));
    }

    let mut out = String::new();
    for (title, kind) in [
        ("Files copied or created during installation", Installation),
        ("Configuration files edited by you", Configuration),
        ("Data created by Nagios/Check_MK at runtime", Runtime),
        ("Sockets and pipes", Pipe),
        ("Locally installed addons", Local),
    ] {
        if kind != Installation {
            out.push('\n');
        }
        out.push_str(title);
        out.push('\n');
        for (path, is_dir, _, description) in entries.iter().filter(|e| e.2 == kind) {
            let slash = if *is_dir { "/" } else { "" };
            out.push_str(&format!("  {description:<47}: {}{slash}\n", path.display()));
        }
    }
    out
}

// ── check catalog ───────────────────────────────────────────────

/// Table of all check types.
pub fn list_checks(catalog: &CheckCatalog) -> String {
    let mut out = String::from(
        "Available check types:\n\n\
         \x20                     plugin   perf-  in- \n\
         Name                  type     data   vent.  service description\n\
         -------------------------------------------------------------------------\n",
    );
    for plugin in catalog.iter() {
        let transport = if plugin.uses_snmp() { "snmp" } else { "tcp " };
        let perfdata = if plugin.has_perfdata { "yes" } else { "no" };
        let inventory = if plugin.discovery.is_some() { "yes" } else { "no" };
        out.push_str(&format!(
            "{:<19}   {transport}     {perfdata:<3}    {inventory:<3}    {}\n",
            plugin.name, plugin.description
        ));
    }
    out
}
