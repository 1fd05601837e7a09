//! Extra-configuration lookups.
//!
//! Unlike host lists, which stop at the first matching entry, the
//! resolvers here walk the whole rule list and collect every payload whose
//! predicates hold, in rule order.

use super::matcher::hosttags_match_taglist;
use super::{
    BinaryHostList, BooleanServiceRule, DependencyRule, HostFacts, HostRule, ServiceRule,
};

/// All payloads of host rules matching `host`, in rule order.
pub fn host_extra_conf<'r, T>(host: &HostFacts<'_>, rules: &'r [HostRule<T>]) -> Vec<&'r T> {
    rules
        .iter()
        .filter(|r| hosttags_match_taglist(host.tags, &r.tags) && r.hosts.matches(host))
        .map(|r| &r.value)
        .collect()
}

/// All payloads of service rules matching `host` and `description`, in
/// rule order.
pub fn service_extra_conf<'r, T>(
    host: &HostFacts<'_>,
    description: &str,
    rules: &'r [ServiceRule<T>],
) -> Vec<&'r T> {
    rules
        .iter()
        .filter(|r| {
            hosttags_match_taglist(host.tags, &r.tags)
                && r.hosts.matches(host)
                && r.services.matches(description)
        })
        .map(|r| &r.value)
        .collect()
}

/// Evaluate a binary host list. A plain name list is a membership test;
/// rule lists are decided by the first matching entry.
pub fn in_binary_hostlist(host: &HostFacts<'_>, list: &BinaryHostList) -> bool {
    match list {
        BinaryHostList::Names(names) => names
            .iter()
            .any(|n| super::matcher::strip_tags(n) == host.name),
        BinaryHostList::Rules(rules) => rules
            .iter()
            .find(|r| hosttags_match_taglist(host.tags, &r.tags) && r.hosts.matches(host))
            .is_some_and(|r| !r.negate),
    }
}

/// Evaluate a boolean service rule list; first matching entry decides.
pub fn in_boolean_serviceconf_list(
    host: &HostFacts<'_>,
    description: &str,
    rules: &[BooleanServiceRule],
) -> bool {
    rules
        .iter()
        .find(|r| {
            hosttags_match_taglist(host.tags, &r.tags)
                && r.hosts.matches(host)
                && r.services.matches(description)
        })
        .is_some_and(|r| !r.negate)
}

/// Descriptions the service `description` depends upon. Every matching
/// pattern of every applicable rule contributes one entry.
pub fn service_deps(
    host: &HostFacts<'_>,
    description: &str,
    rules: &[DependencyRule],
) -> Vec<String> {
    let mut deps = Vec::new();
    for rule in rules {
        if !(hosttags_match_taglist(host.tags, &rule.tags) && rule.hosts.matches(host)) {
            continue;
        }
        for pattern in &rule.patterns {
            if let Some(group) = pattern.search(description) {
                deps.push(fill_from_group(&rule.name, group.as_deref()));
            }
        }
    }
    deps
}

/// Substitute a captured group into a `%s` template. Falls back to the
/// plain template when there is no group or the template does not take
/// exactly one argument.
pub fn fill_from_group(template: &str, group: Option<&str>) -> String {
    group
        .and_then(|g| fill_template(template, g))
        .unwrap_or_else(|| template.to_owned())
}

/// `template % (arg,)` for templates using `%s` and `%%` only. Returns
/// `None` when the template does not consume exactly one argument.
pub fn fill_template(template: &str, arg: &str) -> Option<String> {
    let mut out = String::with_capacity(template.len().saturating_add(arg.len()));
    let mut used = false;
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') if !used => {
                out.push_str(arg);
                used = true;
            }
            _ => return None,
        }
    }
    used.then_some(out)
}
