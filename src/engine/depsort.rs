//! Dependency ordering of a host's services.

use std::collections::HashSet;

use super::check_table::{CheckEntry, CheckTable};
use super::EngineError;

/// Order a check table so that every service comes after the services it
/// depends upon.
///
/// Entries are first sorted by description. Each pass then moves every
/// entry whose dependencies are all outside the remaining set, keeping the
/// sorted order within the pass. A pass that moves nothing means a cycle.
pub fn topo_sort(host: &str, table: &CheckTable) -> Result<Vec<CheckEntry>, EngineError> {
    let mut unsorted: Vec<CheckEntry> = table
        .iter()
        .map(|(key, spec)| CheckEntry::new(key, spec))
        .collect();
    unsorted.sort_by(|a, b| a.description.cmp(&b.description));

    let mut sorted = Vec::with_capacity(unsorted.len());
    while !unsorted.is_empty() {
        let pending: HashSet<String> = unsorted.iter().map(|e| e.description.clone()).collect();
        let (ready, left): (Vec<CheckEntry>, Vec<CheckEntry>) = unsorted
            .into_iter()
            .partition(|e| e.deps.iter().all(|d| !pending.contains(d)));
        if ready.is_empty() {
            let mut descriptions: Vec<String> = pending.into_iter().collect();
            descriptions.sort();
            return Err(EngineError::CyclicDependency {
                host: host.to_owned(),
                descriptions,
            });
        }
        sorted.extend(ready);
        unsorted = left;
    }
    Ok(sorted)
}
