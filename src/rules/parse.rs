//! Building typed rules from configuration values.
//!
//! Each rule may be written positionally, as an array in the legacy tuple
//! shape, or as an inline table with named fields:
//!
//! ```toml
//! host_groups = [
//!     ["web", ["www"], ["@all"]],
//!     { value = "db", tags = ["db"], hosts = ["@all"] },
//! ]
//! ```
//!
//! Arity is checked strictly. Errors carry the offending rule rendered as
//! a literal.

use toml::Value as Toml;

use super::{
    AggregationRule, BinaryHostList, BinaryRule, BooleanServiceRule, CheckDeclaration, CheckHosts,
    DependencyRule, HostEntry, HostList, HostRule, LegacyCheck, RuleError, SearchPattern,
    ServiceList, ServicePattern, ServiceRule, NEGATE,
};
use crate::literal::{Item, Value};
use crate::rules::matcher::strip_tags;

/// Payload types a rule can carry.
pub trait RuleValue: Sized {
    /// Convert the payload; `None` if the value has the wrong type.
    fn from_toml(value: &Toml) -> Option<Self>;
}

impl RuleValue for String {
    fn from_toml(value: &Toml) -> Option<Self> {
        value.as_str().map(str::to_owned)
    }
}

impl RuleValue for Value {
    fn from_toml(value: &Toml) -> Option<Self> {
        Some(Value::from_toml(value))
    }
}

impl RuleValue for Vec<String> {
    fn from_toml(value: &Toml) -> Option<Self> {
        match value {
            Toml::String(s) => Some(vec![s.clone()]),
            Toml::Array(items) => items
                .iter()
                .map(|i| i.as_str().map(str::to_owned))
                .collect(),
            _ => None,
        }
    }
}

impl RuleValue for LegacyCheck {
    fn from_toml(value: &Toml) -> Option<Self> {
        match value {
            Toml::Array(items) => match items.as_slice() {
                [command, description, perf] => Some(LegacyCheck {
                    command: command.as_str()?.to_owned(),
                    description: description.as_str()?.to_owned(),
                    has_perfdata: perf.as_bool()?,
                }),
                _ => None,
            },
            Toml::Table(t) => Some(LegacyCheck {
                command: t.get("command")?.as_str()?.to_owned(),
                description: t.get("description")?.as_str()?.to_owned(),
                has_perfdata: match t.get("perfdata") {
                    Some(v) => v.as_bool()?,
                    None => false,
                },
            }),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Parse a host list such as `["srv1", "!srv2", "@all"]`.
pub fn host_list(list: &str, value: &Toml) -> Result<HostList, RuleError> {
    Ctx { list }.host_list(value, value)
}

/// Parse a list of strings, e.g. a tag list.
pub fn string_list(list: &str, value: &Toml) -> Result<Vec<String>, RuleError> {
    Ctx { list }.strings(value, value, "must be a list of strings")
}

/// Parse `(value, [tags], hosts)` rules.
pub fn host_rules<T: RuleValue>(list: &str, raw: &[Toml]) -> Result<Vec<HostRule<T>>, RuleError> {
    let ctx = Ctx { list };
    raw.iter().map(|r| ctx.host_rule(r)).collect()
}

/// Parse `(value, [tags], hosts, services)` rules.
pub fn service_rules<T: RuleValue>(
    list: &str,
    raw: &[Toml],
) -> Result<Vec<ServiceRule<T>>, RuleError> {
    let ctx = Ctx { list };
    raw.iter().map(|r| ctx.service_rule(r)).collect()
}

/// Parse a binary host list: either plain host names or
/// `(NEGATE?, [tags]?, hosts)` entries.
pub fn binary_host_list(list: &str, raw: &[Toml]) -> Result<BinaryHostList, RuleError> {
    let ctx = Ctx { list };
    if matches!(raw.first(), Some(Toml::String(s)) if s != NEGATE) {
        let names = raw
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| ctx.shape(v, "expected a host name"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(BinaryHostList::Names(names));
    }
    raw.iter()
        .map(|r| ctx.binary_rule(r))
        .collect::<Result<Vec<_>, _>>()
        .map(BinaryHostList::Rules)
}

/// Parse `(NEGATE?, [tags]?, hosts, services)` rules.
pub fn boolean_service_rules(
    list: &str,
    raw: &[Toml],
) -> Result<Vec<BooleanServiceRule>, RuleError> {
    let ctx = Ctx { list };
    raw.iter().map(|r| ctx.boolean_service_rule(r)).collect()
}

/// Parse `(depname, [tags]?, hosts, patterns)` rules.
pub fn dependency_rules(list: &str, raw: &[Toml]) -> Result<Vec<DependencyRule>, RuleError> {
    let ctx = Ctx { list };
    raw.iter().map(|r| ctx.dependency_rule(r)).collect()
}

/// Parse `(aggrname, [tags]?, hosts, pattern)` rules.
pub fn aggregation_rules(list: &str, raw: &[Toml]) -> Result<Vec<AggregationRule>, RuleError> {
    let ctx = Ctx { list };
    raw.iter().map(|r| ctx.aggregation_rule(r)).collect()
}

/// Parse explicit check declarations.
///
/// TOML has no null: the item is omitted in table form, or written as an
/// empty array `[]` in positional form, to mean "no item".
pub fn check_declarations(list: &str, raw: &[Toml]) -> Result<Vec<CheckDeclaration>, RuleError> {
    let ctx = Ctx { list };
    raw.iter().map(|r| ctx.check_declaration(r)).collect()
}

// ---------------------------------------------------------------------------
// Parser context
// ---------------------------------------------------------------------------

struct Ctx<'a> {
    list: &'a str,
}

impl Ctx<'_> {
    fn shape(&self, rule: &Toml, reason: &str) -> RuleError {
        RuleError::Shape {
            list: self.list.to_owned(),
            rule: Value::from_toml(rule).to_string(),
            reason: reason.to_owned(),
        }
    }

    fn check_keys(&self, rule: &Toml, table: &toml::Table, allowed: &[&str]) -> Result<(), RuleError> {
        match table.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(self.shape(rule, &format!("unknown field '{key}'"))),
            None => Ok(()),
        }
    }

    fn required<'v>(&self, rule: &Toml, table: &'v toml::Table, key: &str) -> Result<&'v Toml, RuleError> {
        table
            .get(key)
            .ok_or_else(|| self.shape(rule, &format!("missing field '{key}'")))
    }

    fn strings(&self, rule: &Toml, value: &Toml, reason: &str) -> Result<Vec<String>, RuleError> {
        <Vec<String> as RuleValue>::from_toml(value)
            .filter(|_| value.is_array())
            .ok_or_else(|| self.shape(rule, reason))
    }

    fn payload<T: RuleValue>(&self, rule: &Toml, value: &Toml) -> Result<T, RuleError> {
        T::from_toml(value).ok_or_else(|| self.shape(rule, "value has the wrong type"))
    }

    fn tags(&self, rule: &Toml, value: Option<&Toml>) -> Result<Vec<String>, RuleError> {
        match value {
            Some(v) => self.strings(rule, v, "host tags must be a list of strings"),
            None => Ok(Vec::new()),
        }
    }

    fn host_list(&self, rule: &Toml, value: &Toml) -> Result<HostList, RuleError> {
        let names = self.strings(rule, value, "host list must be a list of strings")?;
        if names.len() == 1 && names.first().is_some_and(String::is_empty) {
            return Err(RuleError::EmptyHostList(self.list.to_owned()));
        }
        let mut entries = Vec::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(RuleError::EmptyHostname {
                    list: self.list.to_owned(),
                    hosts: Value::from_toml(value).to_string(),
                });
            }
            entries.push(match name.as_str() {
                "@all" => HostEntry::All,
                "@cluster" => HostEntry::Cluster,
                "@physical" => HostEntry::Physical,
                marker if marker.starts_with('@') => HostEntry::Marker(marker.to_owned()),
                other => match other.strip_prefix('!') {
                    Some(negated) => HostEntry::Name {
                        name: strip_tags(negated).to_owned(),
                        negate: true,
                    },
                    None => HostEntry::Name {
                        name: strip_tags(other).to_owned(),
                        negate: false,
                    },
                },
            });
        }
        Ok(HostList { entries })
    }

    fn service_list(&self, rule: &Toml, value: &Toml) -> Result<ServiceList, RuleError> {
        let sources = self.strings(rule, value, "service list must be a list of strings")?;
        let patterns = sources
            .iter()
            .map(|p| {
                ServicePattern::new(p).map_err(|source| RuleError::Regex {
                    list: self.list.to_owned(),
                    pattern: p.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ServiceList { patterns })
    }

    fn search_pattern(&self, pattern: &str) -> Result<SearchPattern, RuleError> {
        SearchPattern::new(pattern).map_err(|source| RuleError::Regex {
            list: self.list.to_owned(),
            pattern: pattern.to_owned(),
            source,
        })
    }

    fn host_rule<T: RuleValue>(&self, rule: &Toml) -> Result<HostRule<T>, RuleError> {
        let (value, tags, hosts) = match rule {
            Toml::Array(parts) => match parts.as_slice() {
                [value, hosts] => (value, None, hosts),
                [value, tags, hosts] => (value, Some(tags), hosts),
                _ => return Err(self.shape(rule, "must have 2 or 3 entries")),
            },
            Toml::Table(t) => {
                self.check_keys(rule, t, &["value", "tags", "hosts"])?;
                (
                    self.required(rule, t, "value")?,
                    t.get("tags"),
                    self.required(rule, t, "hosts")?,
                )
            }
            _ => return Err(self.shape(rule, "must be an array or a table")),
        };
        Ok(HostRule {
            value: self.payload(rule, value)?,
            tags: self.tags(rule, tags)?,
            hosts: self.host_list(rule, hosts)?,
        })
    }

    fn service_rule<T: RuleValue>(&self, rule: &Toml) -> Result<ServiceRule<T>, RuleError> {
        let (value, tags, hosts, services) = match rule {
            Toml::Array(parts) => match parts.as_slice() {
                [value, hosts, services] => (value, None, hosts, services),
                [value, tags, hosts, services] => (value, Some(tags), hosts, services),
                _ => return Err(self.shape(rule, "must have 3 or 4 elements")),
            },
            Toml::Table(t) => {
                self.check_keys(rule, t, &["value", "tags", "hosts", "services"])?;
                (
                    self.required(rule, t, "value")?,
                    t.get("tags"),
                    self.required(rule, t, "hosts")?,
                    self.required(rule, t, "services")?,
                )
            }
            _ => return Err(self.shape(rule, "must be an array or a table")),
        };
        Ok(ServiceRule {
            value: self.payload(rule, value)?,
            tags: self.tags(rule, tags)?,
            hosts: self.host_list(rule, hosts)?,
            services: self.service_list(rule, services)?,
        })
    }

    /// Split a leading `@negate` off a positional rule.
    fn negation<'v>(&self, parts: &'v [Toml]) -> (bool, &'v [Toml]) {
        match parts.split_first() {
            Some((Toml::String(s), rest)) if s == NEGATE => (true, rest),
            _ => (false, parts),
        }
    }

    fn negate_field(&self, rule: &Toml, table: &toml::Table) -> Result<bool, RuleError> {
        match table.get("negate") {
            Some(v) => v
                .as_bool()
                .ok_or_else(|| self.shape(rule, "negate must be a boolean")),
            None => Ok(false),
        }
    }

    fn binary_rule(&self, rule: &Toml) -> Result<BinaryRule, RuleError> {
        match rule {
            Toml::Array(parts) => {
                let (negate, rest) = self.negation(parts);
                let (tags, hosts) = if !rest.is_empty() && rest.iter().all(Toml::is_str) {
                    let names: Vec<Toml> = rest.to_vec();
                    (Vec::new(), self.host_list(rule, &Toml::Array(names))?)
                } else {
                    match rest {
                        [hosts] => (Vec::new(), self.host_list(rule, hosts)?),
                        [tags, hosts] => (self.tags(rule, Some(tags))?, self.host_list(rule, hosts)?),
                        _ => return Err(self.shape(rule, "must be tuple with 1 or 2 entries")),
                    }
                };
                Ok(BinaryRule {
                    negate,
                    tags,
                    hosts,
                })
            }
            Toml::Table(t) => {
                self.check_keys(rule, t, &["negate", "tags", "hosts"])?;
                Ok(BinaryRule {
                    negate: self.negate_field(rule, t)?,
                    tags: self.tags(rule, t.get("tags"))?,
                    hosts: self.host_list(rule, self.required(rule, t, "hosts")?)?,
                })
            }
            _ => Err(self.shape(rule, "must be an array or a table")),
        }
    }

    fn boolean_service_rule(&self, rule: &Toml) -> Result<BooleanServiceRule, RuleError> {
        let (negate, tags, hosts, services) = match rule {
            Toml::Array(parts) => {
                let (negate, rest) = self.negation(parts);
                match rest {
                    [hosts, services] => (negate, None, hosts, services),
                    [tags, hosts, services] => (negate, Some(tags), hosts, services),
                    _ => return Err(self.shape(rule, "must have 2 or 3 elements")),
                }
            }
            Toml::Table(t) => {
                self.check_keys(rule, t, &["negate", "tags", "hosts", "services"])?;
                (
                    self.negate_field(rule, t)?,
                    t.get("tags"),
                    self.required(rule, t, "hosts")?,
                    self.required(rule, t, "services")?,
                )
            }
            _ => return Err(self.shape(rule, "must be an array or a table")),
        };
        Ok(BooleanServiceRule {
            negate,
            tags: self.tags(rule, tags)?,
            hosts: self.host_list(rule, hosts)?,
            services: self.service_list(rule, services)?,
        })
    }

    fn dependency_rule(&self, rule: &Toml) -> Result<DependencyRule, RuleError> {
        let (name, tags, hosts, patterns) = match rule {
            Toml::Array(parts) => match parts.as_slice() {
                [name, hosts, patterns] => (name, None, hosts, patterns),
                [name, tags, hosts, patterns] => (name, Some(tags), hosts, patterns),
                _ => return Err(self.shape(rule, "must have 3 or 4 entries")),
            },
            Toml::Table(t) => {
                self.check_keys(rule, t, &["value", "tags", "hosts", "services"])?;
                (
                    self.required(rule, t, "value")?,
                    t.get("tags"),
                    self.required(rule, t, "hosts")?,
                    self.required(rule, t, "services")?,
                )
            }
            _ => return Err(self.shape(rule, "must be an array or a table")),
        };
        let name: String = self.payload(rule, name)?;
        let patterns = self
            .strings(rule, patterns, "patterns must be a list of strings")?
            .iter()
            .map(|p| self.search_pattern(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DependencyRule {
            name,
            tags: self.tags(rule, tags)?,
            hosts: self.host_list(rule, hosts)?,
            patterns,
        })
    }

    fn aggregation_rule(&self, rule: &Toml) -> Result<AggregationRule, RuleError> {
        let (name, tags, hosts, pattern) = match rule {
            Toml::Array(parts) => match parts.as_slice() {
                [name, hosts, pattern] => (name, None, hosts, pattern),
                [name, tags, hosts, pattern] => (name, Some(tags), hosts, pattern),
                _ => return Err(self.shape(rule, "must have 3 or 4 entries")),
            },
            Toml::Table(t) => {
                self.check_keys(rule, t, &["value", "tags", "hosts", "pattern"])?;
                (
                    self.required(rule, t, "value")?,
                    t.get("tags"),
                    self.required(rule, t, "hosts")?,
                    self.required(rule, t, "pattern")?,
                )
            }
            _ => return Err(self.shape(rule, "must be an array or a table")),
        };
        let name: String = self.payload(rule, name)?;
        let pattern = pattern
            .as_str()
            .ok_or_else(|| self.shape(rule, "service specification must be a string"))?;
        Ok(AggregationRule {
            name,
            tags: self.tags(rule, tags)?,
            hosts: self.host_list(rule, hosts)?,
            pattern: self.search_pattern(pattern)?,
        })
    }

    fn check_hosts(&self, rule: &Toml, value: &Toml) -> Result<CheckHosts, RuleError> {
        match value {
            Toml::String(name) => Ok(CheckHosts::Single(strip_tags(name).to_owned())),
            Toml::Array(_) => Ok(CheckHosts::List(self.host_list(rule, value)?)),
            _ => Err(self.shape(rule, "must be single hostname or list of hostnames")),
        }
    }

    fn item(&self, rule: &Toml, value: Option<&Toml>) -> Result<Item, RuleError> {
        match value {
            None => Ok(Item::None),
            Some(Toml::Array(a)) if a.is_empty() => Ok(Item::None),
            Some(Toml::String(s)) => Ok(Item::Str(s.clone())),
            Some(Toml::Integer(i)) => Ok(Item::Int(*i)),
            Some(_) => Err(self.shape(rule, "item must be a string, an integer or []")),
        }
    }

    fn check_declaration(&self, rule: &Toml) -> Result<CheckDeclaration, RuleError> {
        match rule {
            Toml::Array(parts) => {
                let (tags, hosts, check_type, item, params) = match parts.as_slice() {
                    [hosts, ct, item, params] => (None, hosts, ct, item, params),
                    [tags, hosts, ct, item, params] => {
                        if !tags.is_array() {
                            return Err(self.shape(
                                rule,
                                "first entry must be list of host tags",
                            ));
                        }
                        (Some(tags), hosts, ct, item, params)
                    }
                    other => {
                        return Err(self.shape(
                            rule,
                            &format!("it has {} entries, but must have 4 or 5", other.len()),
                        ))
                    }
                };
                Ok(CheckDeclaration {
                    tags: self.tags(rule, tags)?,
                    hosts: self.check_hosts(rule, hosts)?,
                    check_type: self.payload(rule, check_type)?,
                    item: self.item(rule, Some(item))?,
                    params: Value::from_toml(params),
                })
            }
            Toml::Table(t) => {
                self.check_keys(
                    rule,
                    t,
                    &["tags", "hosts", "check_type", "item", "params", "params_var"],
                )?;
                let params = match (t.get("params"), t.get("params_var")) {
                    (Some(_), Some(_)) => {
                        return Err(self.shape(rule, "params and params_var are exclusive"))
                    }
                    (Some(p), None) => Value::from_toml(p),
                    (None, Some(Toml::String(var))) => Value::Ref(var.clone()),
                    (None, Some(_)) => {
                        return Err(self.shape(rule, "params_var must be a variable name"))
                    }
                    (None, None) => Value::None,
                };
                Ok(CheckDeclaration {
                    tags: self.tags(rule, t.get("tags"))?,
                    hosts: self.check_hosts(rule, self.required(rule, t, "hosts")?)?,
                    check_type: self.payload(rule, self.required(rule, t, "check_type")?)?,
                    item: self.item(rule, t.get("item"))?,
                    params,
                })
            }
            _ => Err(self.shape(rule, "must be an array or a table")),
        }
    }
}
