//! Check plugin catalog.
//!
//! Each check type is described by a [`CheckPlugin`] capability record:
//! plain data plus optional function pointers for SNMP detection and
//! service discovery. The [`CheckCatalog`] is built once at startup and
//! passed by reference to the engine, the renderer and discovery.

mod builtin;

use std::collections::BTreeMap;

use crate::literal::{Item, Value};

// ---------------------------------------------------------------------------
// Capability record
// ---------------------------------------------------------------------------

/// Where a check type gets its data from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// A `<<<section>>>` of the agent output.
    Agent {
        /// Section name.
        section: &'static str,
    },
    /// An SNMP table.
    Snmp {
        /// Base OID of the table.
        base_oid: &'static str,
        /// Column suffixes appended to `base_oid`.
        columns: &'static [&'static str],
    },
}

/// Answers available to SNMP scan predicates.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    /// `sysDescr.0`.
    pub sys_descr: &'a str,
    /// `sysObjectID.0`, if the device answered.
    pub sys_object_id: Option<&'a str>,
}

/// Input of a discovery function.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryContext<'a> {
    /// Check type being discovered.
    pub check_type: &'a str,
    /// Section lines (agent) or table rows (SNMP), already split.
    pub lines: &'a [Vec<String>],
    /// Effective check variables.
    pub variables: &'a BTreeMap<String, Value>,
}

/// One discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovered {
    /// Item of the new service.
    pub item: Item,
    /// Parameters as literal source, e.g. `cpuload_default_levels`.
    pub paramstring: String,
}

impl Discovered {
    /// A discovered service.
    pub fn new(item: Item, paramstring: impl Into<String>) -> Self {
        Self {
            item,
            paramstring: paramstring.into(),
        }
    }
}

/// SNMP detection predicate.
pub type ScanFn = fn(&ScanContext<'_>) -> bool;

/// Discovery function.
pub type DiscoveryFn = fn(&DiscoveryContext<'_>) -> Vec<Discovered>;

/// Parameter rewriting applied when precompiling host checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecompileHook {
    /// Replace `filesystem_default_levels` with the first matching
    /// `filesystem_levels` entry for the mount point.
    FilesystemLevels,
}

/// A check configuration variable declared by a plugin.
#[derive(Debug, Clone, Copy)]
pub struct CheckVariable {
    /// Variable name.
    pub name: &'static str,
    /// Default value as literal source.
    pub default: &'static str,
}

/// Capability record of one check type.
#[derive(Debug, Clone)]
pub struct CheckPlugin {
    /// Check type, e.g. `cpu.loads`.
    pub name: &'static str,
    /// Default service description; `%s` takes the item.
    pub description: &'static str,
    /// Whether the check produces performance data.
    pub has_perfdata: bool,
    /// Data source.
    pub transport: Transport,
    /// SNMP detection; SNMP plugins without one are always tried.
    pub scan: Option<ScanFn>,
    /// Discovery; `None` means the type cannot be inventorised.
    pub discovery: Option<DiscoveryFn>,
    /// Configuration variables with their defaults.
    pub variables: &'static [CheckVariable],
    /// Parameter rewriting at precompile time.
    pub precompile: Option<PrecompileHook>,
}

impl CheckPlugin {
    /// Whether data comes from SNMP.
    pub fn uses_snmp(&self) -> bool {
        matches!(self.transport, Transport::Snmp { .. })
    }

    /// Name of the plugin source file: the check type up to the first `.`.
    pub fn file_name(&self) -> &'static str {
        self.name.split('.').next().unwrap_or(self.name)
    }

    /// Agent section or SNMP base name this plugin reads.
    pub fn section(&self) -> &'static str {
        match self.transport {
            Transport::Agent { section } => section,
            Transport::Snmp { .. } => self.file_name(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Statically built table of all known check types.
#[derive(Debug, Clone)]
pub struct CheckCatalog {
    plugins: BTreeMap<&'static str, CheckPlugin>,
}

impl Default for CheckCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CheckCatalog {
    /// Catalog of the shipped check types.
    pub fn builtin() -> Self {
        Self::from_plugins(builtin::plugins())
    }

    /// Catalog of arbitrary plugins; later duplicates replace earlier ones.
    pub fn from_plugins(plugins: impl IntoIterator<Item = CheckPlugin>) -> Self {
        Self {
            plugins: plugins.into_iter().map(|p| (p.name, p)).collect(),
        }
    }

    /// Look up a check type.
    pub fn get(&self, check_type: &str) -> Option<&CheckPlugin> {
        self.plugins.get(check_type)
    }

    /// All plugins sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &CheckPlugin> {
        self.plugins.values()
    }

    /// Whether any plugin declares `name`.
    pub fn declares_variable(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    /// Declaration of a check variable.
    pub fn variable(&self, name: &str) -> Option<&CheckVariable> {
        self.plugins
            .values()
            .flat_map(|p| p.variables.iter())
            .find(|v| v.name == name)
    }

    /// Default values of every declared variable. A default that is not
    /// a valid literal is reported and skipped.
    pub fn variable_defaults(&self) -> BTreeMap<String, Value> {
        let mut defaults = BTreeMap::new();
        for var in self.plugins.values().flat_map(|p| p.variables.iter()) {
            match Value::parse(var.default) {
                Ok(value) => {
                    defaults.insert(var.name.to_owned(), value);
                }
                Err(e) => tracing::error!(variable = var.name, error = %e, "invalid default"),
            }
        }
        defaults
    }

    /// Check types that support discovery, sorted. With `include_snmp`
    /// false only agent based types are returned.
    pub fn inventorable(&self, include_snmp: bool) -> Vec<&'static str> {
        self.plugins
            .values()
            .filter(|p| p.discovery.is_some() && (include_snmp || !p.uses_snmp()))
            .map(|p| p.name)
            .collect()
    }

    /// SNMP check types for a device: those whose predicate holds, then
    /// those without a predicate.
    pub fn snmp_scan(&self, ctx: &ScanContext<'_>) -> Vec<&'static str> {
        let mut found: Vec<&'static str> = self
            .plugins
            .values()
            .filter(|p| p.uses_snmp())
            .filter(|p| p.scan.is_some_and(|scan| scan(ctx)))
            .map(|p| p.name)
            .collect();
        found.extend(
            self.plugins
                .values()
                .filter(|p| p.uses_snmp() && p.scan.is_none())
                .map(|p| p.name),
        );
        found
    }
}
