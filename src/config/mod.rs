//! Configuration loading and validation.
//!
//! The configuration lives in a directory (`$CMK_CONFIG_DIR` or
//! `/etc/check_mk`). Files are read in order: `main.toml`, every
//! `conf.d/*.toml` sorted by name, then `final.toml`. Later files extend
//! earlier ones: arrays are appended, tables are merged key by key and
//! scalars are replaced.
//!
//! Precedence for paths: env vars > config files > defaults.

pub mod paths;
pub mod rules;
pub mod settings;

use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value as Toml;

use crate::catalog::CheckCatalog;
use crate::literal::Value;
use crate::rules::{strip_tags, RuleError};

pub use paths::PathsConfig;
pub use rules::Rules;
pub use settings::{GroupDefinitions, Settings};

/// Name of the file written by `scan-parents` below `conf.d`.
pub const PARENTS_FILE: &str = "parents.toml";

/// Variables that are no longer supported, with their replacement.
const REMOVED_VARIABLES: &[(&str, &str)] = &[
    ("host_notification_periods", "extra_host_conf['notification_period']"),
    ("service_notification_periods", "extra_service_conf['notification_period']"),
    (
        "summary_host_notification_periods",
        "extra_summary_host_conf['notification_period']",
    ),
    (
        "summary_service_notification_periods",
        "extra_summary_service_conf['notification_period']",
    ),
];

// ── Errors ──────────────────────────────────────────────────────

/// Errors raised while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML.
    #[error("syntax error in {}: {source}", .path.display())]
    Syntax {
        /// Offending file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: toml::de::Error,
    },

    /// A known variable has a value of the wrong type.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Top-level keys that are not configuration variables.
    #[error("invalid configuration variable(s): {}", .0.join(", "))]
    UnknownVariables(Vec<String>),

    /// A variable that was removed and must not be set any more.
    #[error("{name} is not longer supported. Please use {replacement} instead.")]
    RemovedVariable {
        /// Removed variable.
        name: String,
        /// What to use instead.
        replacement: String,
    },

    /// A `[variables]` entry no check plugin declares.
    #[error("invalid check configuration variable '{0}'")]
    UnknownCheckVariable(String),

    /// A host name occurs twice in `all_hosts` and `clusters`.
    #[error("duplicate host '{0}' in all_hosts or clusters")]
    DuplicateHost(String),

    /// `snmp_communities` given as a table instead of a rule list.
    #[error("snmp_communities must be a list of rules, not a table")]
    SnmpCommunitiesDict,

    /// A rule has an invalid shape.
    #[error(transparent)]
    Rule(#[from] RuleError),
}

// ── Loader ──────────────────────────────────────────────────────

/// Loader switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Ignore `conf.d/parents.toml`; used while scanning for parents.
    pub skip_parents_file: bool,
}

/// Everything read from the configuration directory.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Filesystem layout.
    pub paths: PathsConfig,
    /// Scalar settings.
    pub settings: Settings,
    /// Hosts, checks and rule tables.
    pub rules: Rules,
    /// Check plugin variables set in `[variables]`.
    pub variables: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    paths: PathsConfig,
    variables: BTreeMap<String, Toml>,
    #[serde(flatten)]
    settings: Settings,
    #[serde(flatten)]
    rules: rules::RawRules,
    #[serde(flatten)]
    unknown: BTreeMap<String, Toml>,
}

impl Config {
    /// Load from `$CMK_CONFIG_DIR` (or the default directory) with
    /// environment overrides applied.
    pub fn load(catalog: &CheckCatalog, options: LoadOptions) -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let dir = PathsConfig::config_dir_with(env);
        Self::load_from_dir(&dir, catalog, options, env)
    }

    /// Load from `dir` using a custom env resolver (for testing).
    pub fn load_from_dir(
        dir: &Path,
        catalog: &CheckCatalog,
        options: LoadOptions,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        let mut files = Vec::new();
        let main = dir.join("main.toml");
        if main.exists() {
            files.push(main);
        } else {
            tracing::info!(dir = %dir.display(), "no main.toml found, using defaults");
        }
        files.extend(conf_d_files(&dir.join("conf.d"), options)?);
        let last = dir.join("final.toml");
        if last.exists() {
            files.push(last);
        }
        for path in &files {
            tracing::debug!(path = %path.display(), "reading configuration file");
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let table: toml::Table =
                toml::from_str(&text).map_err(|source| ConfigError::Syntax {
                    path: path.clone(),
                    source,
                })?;
            merge(&mut merged, table);
        }
        let mut config = Self::from_table(merged, catalog)?;
        config.paths.config_dir = dir.to_path_buf();
        config.paths.apply_overrides(env);
        Ok(config)
    }

    /// Parse a single TOML document (for testing).
    pub fn from_toml(text: &str, catalog: &CheckCatalog) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(text).map_err(|source| ConfigError::Syntax {
            path: PathBuf::from("<string>"),
            source,
        })?;
        Self::from_table(table, catalog)
    }

    fn from_table(table: toml::Table, catalog: &CheckCatalog) -> Result<Self, ConfigError> {
        check_removed(&table)?;
        if matches!(table.get("snmp_communities"), Some(Toml::Table(_))) {
            return Err(ConfigError::SnmpCommunitiesDict);
        }

        let raw: RawConfig = Toml::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Invalid(e.message().to_owned()))?;
        if !raw.unknown.is_empty() {
            return Err(ConfigError::UnknownVariables(
                raw.unknown.into_keys().collect(),
            ));
        }

        let mut variables = BTreeMap::new();
        for (name, value) in &raw.variables {
            if !catalog.declares_variable(name) {
                return Err(ConfigError::UnknownCheckVariable(name.clone()));
            }
            variables.insert(name.clone(), Value::from_toml(value));
        }

        let rules = Rules::from_raw(&raw.rules)?;
        check_duplicate_hosts(&rules)?;
        if !rules.filesystem_levels.is_empty() {
            tracing::warn!(
                "filesystem_levels is deprecated; use check_parameters for df checks instead"
            );
        }

        Ok(Self {
            paths: raw.paths,
            settings: raw.settings,
            rules,
            variables,
        })
    }
}

fn conf_d_files(conf_d: &Path, options: LoadOptions) -> Result<Vec<PathBuf>, ConfigError> {
    let entries = match std::fs::read_dir(conf_d) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: conf_d.to_path_buf(),
                source,
            })
        }
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| ConfigError::Io {
                path: conf_d.to_path_buf(),
                source,
            })?
            .path();
        if path.extension() != Some(OsStr::new("toml")) {
            continue;
        }
        if options.skip_parents_file && path.file_name().is_some_and(|n| n == PARENTS_FILE) {
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Merge `next` into `acc`: arrays append, tables update key by key,
/// everything else is replaced.
fn merge(acc: &mut toml::Table, next: toml::Table) {
    for (key, value) in next {
        let replacement = match (acc.get_mut(&key), value) {
            (Some(Toml::Array(existing)), Toml::Array(more)) => {
                existing.extend(more);
                None
            }
            (Some(Toml::Table(existing)), Toml::Table(more)) => {
                existing.extend(more);
                None
            }
            (_, value) => Some(value),
        };
        if let Some(value) = replacement {
            acc.insert(key, value);
        }
    }
}

fn check_removed(table: &toml::Table) -> Result<(), ConfigError> {
    for (name, replacement) in REMOVED_VARIABLES {
        let set = match table.get(*name) {
            Some(Toml::Array(a)) => !a.is_empty(),
            Some(Toml::Table(t)) => !t.is_empty(),
            Some(_) => true,
            None => false,
        };
        if set {
            return Err(ConfigError::RemovedVariable {
                name: (*name).to_owned(),
                replacement: (*replacement).to_owned(),
            });
        }
    }
    Ok(())
}

fn check_duplicate_hosts(rules: &Rules) -> Result<(), ConfigError> {
    let mut seen = BTreeSet::new();
    let names = rules
        .all_hosts
        .iter()
        .chain(rules.clusters.keys())
        .map(|h| strip_tags(h));
    for name in names {
        if !seen.insert(name) {
            return Err(ConfigError::DuplicateHost(name.to_owned()));
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────
