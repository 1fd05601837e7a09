//! Shipped check types.

use super::{
    CheckPlugin, CheckVariable, Discovered, DiscoveryContext, PrecompileHook, ScanContext,
    Transport,
};
use crate::literal::{Item, Value};

const CPU: Transport = Transport::Agent { section: "cpu" };

pub(super) fn plugins() -> Vec<CheckPlugin> {
    vec![
        CheckPlugin {
            name: "cpu.loads",
            description: "CPU load",
            has_perfdata: true,
            transport: CPU,
            scan: None,
            discovery: Some(inventory_cpu_load),
            variables: &[CheckVariable {
                name: "cpuload_default_levels",
                default: "(5.0, 10.0)",
            }],
            precompile: None,
        },
        CheckPlugin {
            name: "cpu.threads",
            description: "Number of threads",
            has_perfdata: true,
            transport: CPU,
            scan: None,
            discovery: Some(inventory_cpu_threads),
            variables: &[CheckVariable {
                name: "threads_default_levels",
                default: "(2000, 4000)",
            }],
            precompile: None,
        },
        CheckPlugin {
            name: "df",
            description: "fs_%s",
            has_perfdata: true,
            transport: Transport::Agent { section: "df" },
            scan: None,
            discovery: Some(inventory_df),
            variables: &[
                CheckVariable {
                    name: "filesystem_default_levels",
                    default: "(80, 90)",
                },
                CheckVariable {
                    name: "df_magicnumber_normsize",
                    default: "20",
                },
                CheckVariable {
                    name: "df_lowest_warning_level",
                    default: "50",
                },
                CheckVariable {
                    name: "df_lowest_critical_level",
                    default: "60",
                },
                CheckVariable {
                    name: "inventory_df_exclude_fs",
                    default: "['nfs', 'smbfs', 'cifs', 'iso9660']",
                },
                CheckVariable {
                    name: "inventory_df_exclude_mountpoints",
                    default: "['/dev']",
                },
                CheckVariable {
                    name: "inventory_df_check_params",
                    default: "'filesystem_default_levels'",
                },
            ],
            precompile: Some(PrecompileHook::FilesystemLevels),
        },
        CheckPlugin {
            name: "mem.used",
            description: "Memory used",
            has_perfdata: true,
            transport: Transport::Agent { section: "mem" },
            scan: None,
            discovery: Some(inventory_mem_used),
            variables: &[CheckVariable {
                name: "memused_default_levels",
                default: "(150.0, 200.0)",
            }],
            precompile: None,
        },
        CheckPlugin {
            name: "uptime",
            description: "Uptime",
            has_perfdata: true,
            transport: Transport::Agent { section: "uptime" },
            scan: None,
            discovery: Some(inventory_single),
            variables: &[],
            precompile: None,
        },
        CheckPlugin {
            name: "kernel",
            description: "Kernel %s",
            has_perfdata: true,
            transport: Transport::Agent { section: "kernel" },
            scan: None,
            discovery: Some(inventory_kernel),
            variables: &[CheckVariable {
                name: "kernel_default_levels",
                default: "None",
            }],
            precompile: None,
        },
        CheckPlugin {
            name: "logwatch",
            description: "LOG %s",
            has_perfdata: false,
            transport: Transport::Agent { section: "logwatch" },
            scan: None,
            discovery: Some(inventory_logwatch),
            variables: &[],
            precompile: None,
        },
        CheckPlugin {
            name: "mongodb_counters",
            description: "MongoDB Counters %s",
            has_perfdata: true,
            transport: Transport::Agent {
                section: "mongodb_counters",
            },
            scan: None,
            discovery: Some(inventory_mongodb_counters),
            variables: &[],
            precompile: None,
        },
        CheckPlugin {
            name: "if",
            description: "NIC %s",
            has_perfdata: true,
            transport: Transport::Snmp {
                base_oid: ".1.3.6.1.2.1.2.2.1",
                columns: &["1", "2", "3", "5", "8"],
            },
            scan: None,
            discovery: Some(inventory_if),
            variables: &[],
            precompile: None,
        },
        CheckPlugin {
            name: "snmp_uptime",
            description: "Uptime",
            has_perfdata: true,
            transport: Transport::Snmp {
                base_oid: ".1.3.6.1.2.1.1",
                columns: &["3.0"],
            },
            scan: Some(scan_has_sysobjectid),
            discovery: Some(inventory_single),
            variables: &[],
            precompile: None,
        },
        CheckPlugin {
            name: "snmp_info",
            description: "SNMP Info",
            has_perfdata: false,
            transport: Transport::Snmp {
                base_oid: ".1.3.6.1.2.1.1",
                columns: &["1.0", "4.0", "5.0", "6.0"],
            },
            scan: None,
            discovery: Some(inventory_single),
            variables: &[],
            precompile: None,
        },
    ]
}

// ── Scan predicates ─────────────────────────────────────────────

fn scan_has_sysobjectid(ctx: &ScanContext<'_>) -> bool {
    ctx.sys_object_id.is_some_and(|oid| !oid.is_empty())
}

// ── Discovery ───────────────────────────────────────────────────

fn inventory_single(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    if ctx.lines.is_empty() {
        return Vec::new();
    }
    vec![Discovered::new(Item::None, "None")]
}

fn inventory_cpu_load(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    match ctx.lines.first() {
        Some(line) if line.len() >= 3 => {
            vec![Discovered::new(Item::None, "cpuload_default_levels")]
        }
        _ => Vec::new(),
    }
}

fn inventory_cpu_threads(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    match ctx.lines.first() {
        Some(line) if line.len() >= 4 => {
            vec![Discovered::new(Item::None, "threads_default_levels")]
        }
        _ => Vec::new(),
    }
}

fn string_list(ctx: &DiscoveryContext<'_>, name: &str) -> Vec<String> {
    ctx.variables
        .get(name)
        .and_then(Value::as_seq)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect()
        })
        .unwrap_or_default()
}

/// `df -PT` lines: device, type, size, used, available, percent, mount
/// point. Mount points may contain blanks.
fn inventory_df(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    let exclude_fs = string_list(ctx, "inventory_df_exclude_fs");
    let exclude_mp = string_list(ctx, "inventory_df_exclude_mountpoints");
    let params = ctx
        .variables
        .get("inventory_df_check_params")
        .and_then(Value::as_str)
        .unwrap_or("filesystem_default_levels")
        .to_owned();
    let mut found: Vec<Discovered> = Vec::new();
    for line in ctx.lines {
        let Some(fs_type) = line.get(1) else {
            continue;
        };
        if line.len() < 7 || exclude_fs.contains(fs_type) {
            continue;
        }
        if line.get(2).is_some_and(|size| size == "0") {
            continue;
        }
        let mountpoint = line.get(6..).unwrap_or_default().join(" ");
        if exclude_mp.contains(&mountpoint) {
            continue;
        }
        let item = Item::Str(mountpoint);
        if found.iter().all(|d| d.item != item) {
            found.push(Discovered::new(item, params.clone()));
        }
    }
    found
}

fn inventory_mem_used(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    let has = |key: &str| ctx.lines.iter().any(|l| l.first().is_some_and(|k| k == key));
    if has("MemTotal:") && has("SwapTotal:") {
        vec![Discovered::new(Item::None, "memused_default_levels")]
    } else {
        Vec::new()
    }
}

const KERNEL_COUNTERS: &[(&str, &str)] = &[
    ("ctxt", "Context Switches"),
    ("processes", "Process Creations"),
    ("pgmajfault", "Major Page Faults"),
];

fn inventory_kernel(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    KERNEL_COUNTERS
        .iter()
        .filter(|(counter, _)| {
            ctx.lines
                .iter()
                .skip(1)
                .any(|l| l.first().is_some_and(|k| k == counter))
        })
        .map(|(_, item)| Discovered::new(Item::from(*item), "kernel_default_levels"))
        .collect()
}

/// Log files appear as `[[[file name]]]` lines.
fn inventory_logwatch(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    ctx.lines
        .iter()
        .filter_map(|l| {
            let text = l.join(" ");
            text.strip_prefix("[[[")
                .and_then(|rest| rest.strip_suffix("]]]"))
                .map(str::to_owned)
        })
        .map(|file| Discovered::new(Item::Str(file), "None"))
        .collect()
}

fn inventory_mongodb_counters(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    if ctx.lines.is_empty() {
        return Vec::new();
    }
    let mut found = vec![Discovered::new(Item::from("Operations"), "None")];
    if ctx
        .lines
        .iter()
        .any(|l| l.first().is_some_and(|k| k == "opcountersRepl"))
    {
        found.push(Discovered::new(Item::from("Replica Operations"), "None"));
    }
    found
}

/// Rows: index, description, type, speed, operational status. Loopback
/// interfaces (type 24) and interfaces that are not up are skipped.
fn inventory_if(ctx: &DiscoveryContext<'_>) -> Vec<Discovered> {
    ctx.lines
        .iter()
        .filter_map(|row| match row.as_slice() {
            [index, _descr, if_type, speed, oper_status] if if_type != "24" && oper_status == "1" => {
                let speed = match speed.parse::<i64>() {
                    Ok(n) => Value::Int(n),
                    Err(_) => Value::Str(speed.clone()),
                };
                let params = Value::Tuple(vec![speed, Value::Str("1".to_owned())]);
                Some(Discovered::new(Item::Str(index.clone()), params.to_string()))
            }
            _ => None,
        })
        .collect()
}
