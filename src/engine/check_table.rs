//! Per-host check tables.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::literal::{Item, Value};

/// Key of a check table entry.
pub type CheckKey = (String, Item);

/// What a host checks for one `(check_type, item)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    /// Parameters as declared; variable references are kept.
    pub params: Value,
    /// Rendered service description.
    pub description: String,
    /// Descriptions this service depends upon.
    pub deps: Vec<String>,
}

/// Check table of one host, ordered by check type and item.
pub type CheckTable = BTreeMap<CheckKey, ServiceSpec>;

/// A flattened check table row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckEntry {
    /// Check type.
    pub check_type: String,
    /// Service item.
    pub item: Item,
    /// Parameters.
    pub params: Value,
    /// Service description.
    pub description: String,
    /// Descriptions this service depends upon.
    pub deps: Vec<String>,
}

impl CheckEntry {
    /// Flatten a table entry.
    pub fn new(key: &CheckKey, spec: &ServiceSpec) -> Self {
        Self {
            check_type: key.0.clone(),
            item: key.1.clone(),
            params: spec.params.clone(),
            description: spec.description.clone(),
            deps: spec.deps.clone(),
        }
    }
}

/// Drop every dependency that names no service of the table.
pub fn prune_dangling_deps(table: &mut CheckTable) {
    let descriptions: HashSet<String> = table.values().map(|s| s.description.clone()).collect();
    for spec in table.values_mut() {
        spec.deps.retain(|d| descriptions.contains(d));
    }
}
