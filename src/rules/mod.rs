//! Rule shapes used throughout the configuration.
//!
//! Every extra-configuration list is an ordered sequence of predicate guarded
//! rules. The predicates are a host tag list, a host list and, for service
//! level rules, a list of service description patterns. Rules are parsed
//! once when the configuration is loaded so that shape errors and invalid
//! regular expressions surface before any host is processed.

pub mod matcher;
pub mod parse;
pub mod resolver;

use regex::Regex;

use crate::literal::{Item, Value};

pub use matcher::{hosttags_match_taglist, strip_tags, HostFacts};
pub use resolver::{
    host_extra_conf, in_binary_hostlist, in_boolean_serviceconf_list, service_deps,
    service_extra_conf,
};

/// Marker that negates a binary host list entry or boolean service rule.
pub const NEGATE: &str = "@negate";

/// Host list marker matching every host.
pub const ALL_HOSTS: &str = "@all";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while turning raw configuration values into rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// A rule does not have one of the accepted shapes.
    #[error("invalid entry '{rule}' in {list}: {reason}")]
    Shape {
        /// Name of the configuration list.
        list: String,
        /// The offending rule, rendered as a literal.
        rule: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A service pattern is not a valid regular expression.
    #[error("invalid regular expression '{pattern}' in {list}: {source}")]
    Regex {
        /// Name of the configuration list.
        list: String,
        /// The pattern as written.
        pattern: String,
        /// Compiler error.
        #[source]
        source: regex::Error,
    },

    /// A host list contains an empty host name.
    #[error("empty hostname in host list {hosts} of {list}")]
    EmptyHostname {
        /// Name of the configuration list.
        list: String,
        /// The host list, rendered as a literal.
        hosts: String,
    },

    /// The legacy `[""]` host list.
    #[error("invalid empty entry [ \"\" ] in {0}")]
    EmptyHostList(String),
}

// ---------------------------------------------------------------------------
// Host and service lists
// ---------------------------------------------------------------------------

/// One entry of a host list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEntry {
    /// `@all`.
    All,
    /// `@cluster`: matches cluster hosts.
    Cluster,
    /// `@physical`: matches hosts that are not clusters.
    Physical,
    /// Any other `@` marker. Never matches.
    Marker(String),
    /// A host name, tags already stripped, optionally negated with `!`.
    Name {
        /// Untagged host name.
        name: String,
        /// Whether a match excludes the host.
        negate: bool,
    },
}

/// Ordered host list. The first matching entry decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostList {
    /// Entries in configuration order.
    pub entries: Vec<HostEntry>,
}

impl HostList {
    /// Host list consisting of `@all` only.
    pub fn all() -> Self {
        Self {
            entries: vec![HostEntry::All],
        }
    }

    /// Host list of plain host names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|n| HostEntry::Name {
                    name: strip_tags(n.as_ref()).to_owned(),
                    negate: false,
                })
                .collect(),
        }
    }
}

/// A service description pattern, anchored at the start of the description.
#[derive(Debug, Clone)]
pub struct ServicePattern {
    /// Pattern as written, without the `!` prefix.
    pub source: String,
    /// Whether a match excludes the service.
    pub negate: bool,
    regex: Regex,
}

impl ServicePattern {
    /// Compile a pattern. A leading `!` negates it.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let (negate, source) = match pattern.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, pattern),
        };
        Ok(Self {
            source: source.to_owned(),
            negate,
            regex: Regex::new(&format!("^(?:{source})"))?,
        })
    }

    /// Whether the pattern matches at the start of `description`.
    pub fn is_match(&self, description: &str) -> bool {
        self.regex.is_match(description)
    }
}

/// Ordered list of service patterns. The first matching pattern decides.
#[derive(Debug, Clone, Default)]
pub struct ServiceList {
    /// Patterns in configuration order.
    pub patterns: Vec<ServicePattern>,
}

/// An unanchored pattern searched anywhere in a description. Used by
/// service dependencies and aggregations, whose templates take the last
/// capture group.
#[derive(Debug, Clone)]
pub struct SearchPattern {
    /// Pattern as written.
    pub source: String,
    regex: Regex,
}

impl SearchPattern {
    /// Compile an unanchored pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: pattern.to_owned(),
            regex: Regex::new(pattern)?,
        })
    }

    /// Search `description`. On a match returns the text of the last
    /// capture group: `Some(None)` when the pattern has no groups and
    /// `Some(Some("None"))` when the last group did not participate.
    pub fn search(&self, description: &str) -> Option<Option<String>> {
        let caps = self.regex.captures(description)?;
        let groups = caps.len();
        if groups <= 1 {
            return Some(None);
        }
        let last = caps
            .get(groups.saturating_sub(1))
            .map_or_else(|| "None".to_owned(), |m| m.as_str().to_owned());
        Some(Some(last))
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// `(value, [tags], hosts)`: host level extra configuration.
#[derive(Debug, Clone)]
pub struct HostRule<T> {
    /// Payload returned on match.
    pub value: T,
    /// Required host tags (`!tag` = must be absent).
    pub tags: Vec<String>,
    /// Host list predicate.
    pub hosts: HostList,
}

/// `(value, [tags], hosts, services)`: service level extra configuration.
#[derive(Debug, Clone)]
pub struct ServiceRule<T> {
    /// Payload returned on match.
    pub value: T,
    /// Required host tags.
    pub tags: Vec<String>,
    /// Host list predicate.
    pub hosts: HostList,
    /// Service description patterns.
    pub services: ServiceList,
}

/// One entry of a rule-style binary host list.
#[derive(Debug, Clone)]
pub struct BinaryRule {
    /// Answer `false` instead of `true` when this entry matches.
    pub negate: bool,
    /// Required host tags.
    pub tags: Vec<String>,
    /// Host list predicate.
    pub hosts: HostList,
}

/// A yes/no host classification such as `snmp_hosts`.
#[derive(Debug, Clone)]
pub enum BinaryHostList {
    /// Plain list of (possibly tagged) host names.
    Names(Vec<String>),
    /// Rules, first match decides.
    Rules(Vec<BinaryRule>),
}

impl Default for BinaryHostList {
    fn default() -> Self {
        BinaryHostList::Rules(Vec::new())
    }
}

impl BinaryHostList {
    /// Whether the list has no entries at all.
    pub fn is_empty(&self) -> bool {
        match self {
            BinaryHostList::Names(names) => names.is_empty(),
            BinaryHostList::Rules(rules) => rules.is_empty(),
        }
    }

    /// Default of `snmp_hosts`: hosts tagged `snmp`.
    pub fn default_snmp_hosts() -> Self {
        BinaryHostList::Rules(vec![BinaryRule {
            negate: false,
            tags: vec!["snmp".to_owned()],
            hosts: HostList::all(),
        }])
    }

    /// Default of `tcp_hosts`: hosts tagged `tcp`, else not `snmp`, else
    /// not `ping`.
    pub fn default_tcp_hosts() -> Self {
        BinaryHostList::Rules(vec![
            BinaryRule {
                negate: false,
                tags: vec!["tcp".to_owned()],
                hosts: HostList::all(),
            },
            BinaryRule {
                negate: true,
                tags: vec!["snmp".to_owned()],
                hosts: HostList::all(),
            },
            BinaryRule {
                negate: false,
                tags: vec!["!ping".to_owned()],
                hosts: HostList::all(),
            },
        ])
    }

    /// Default of `scanparent_hosts`: every host.
    pub fn all_hosts() -> Self {
        BinaryHostList::Rules(vec![BinaryRule {
            negate: false,
            tags: Vec::new(),
            hosts: HostList::all(),
        }])
    }
}

/// `(NEGATE?, [tags], hosts, services)`: boolean service classification
/// such as `ignored_services` or `clustered_services`.
#[derive(Debug, Clone)]
pub struct BooleanServiceRule {
    /// Answer `false` instead of `true` when this entry matches.
    pub negate: bool,
    /// Required host tags.
    pub tags: Vec<String>,
    /// Host list predicate.
    pub hosts: HostList,
    /// Service description patterns.
    pub services: ServiceList,
}

/// `(depname, [tags], hosts, patterns)`: a service dependency.
#[derive(Debug, Clone)]
pub struct DependencyRule {
    /// Description of the service depended upon; `%s` takes the last
    /// capture group of the matching pattern.
    pub name: String,
    /// Required host tags.
    pub tags: Vec<String>,
    /// Host list predicate.
    pub hosts: HostList,
    /// Unanchored patterns searched in the dependent description.
    pub patterns: Vec<SearchPattern>,
}

/// `(aggrname, [tags], hosts, pattern)`: a service aggregation.
#[derive(Debug, Clone)]
pub struct AggregationRule {
    /// Aggregated service name; `%s` takes the last capture group.
    pub name: String,
    /// Required host tags.
    pub tags: Vec<String>,
    /// Host list predicate.
    pub hosts: HostList,
    /// Unanchored pattern searched in the service description.
    pub pattern: SearchPattern,
}

/// A legacy active check: `(command, description, has_perfdata)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCheck {
    /// Nagios check command.
    pub command: String,
    /// Service description.
    pub description: String,
    /// Whether the performance data template is used.
    pub has_perfdata: bool,
}

/// Host selector of a check declaration.
#[derive(Debug, Clone)]
pub enum CheckHosts {
    /// A single host name (tags stripped).
    Single(String),
    /// A host list.
    List(HostList),
}

/// `(hosts, check_type, item, params)` or
/// `([tags], hosts, check_type, item, params)`.
#[derive(Debug, Clone)]
pub struct CheckDeclaration {
    /// Required host tags.
    pub tags: Vec<String>,
    /// Host selector.
    pub hosts: CheckHosts,
    /// Check type name.
    pub check_type: String,
    /// Service item.
    pub item: Item,
    /// Parameters, possibly referring to configuration variables.
    pub params: Value,
}
