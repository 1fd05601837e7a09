//! Automation sub-commands for remote configuration tools.
//!
//! Each command returns a literal [`Value`]; the binary prints it in
//! literal syntax or as JSON. Failures the caller is expected to handle are
//! [`AutomationError::Failed`]; everything else is an internal error.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::activation::{self, CoreAction};
use crate::autochecks::{self, AutocheckError, AutocheckRow};
use crate::discovery::{
    self, DataSource, DiscoveryError, InventoryOptions, ServiceState,
};
use crate::engine::{Engine, EngineError};
use crate::housekeeping::{self, HousekeepingError};
use crate::literal::{Item, Value};
use crate::rules::service_extra_conf;

/// Errors of automation commands.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    /// Expected failure with a reason for the caller.
    #[error("{0}")]
    Failed(String),

    /// Configuration could not be evaluated.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Discovery failed.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Autochecks could not be read or written.
    #[error(transparent)]
    Autochecks(#[from] AutocheckError),

    /// Host files could not be removed.
    #[error(transparent)]
    Housekeeping(#[from] HousekeepingError),
}

impl AutomationError {
    /// Process exit status: 1 for expected failures, 2 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Failed(_) => 1,
            _ => 2,
        }
    }
}

fn failed(reason: impl Into<String>) -> AutomationError {
    AutomationError::Failed(reason.into())
}

/// A parsed automation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutomationCommand {
    /// Classify the services of a host.
    TryInventory(String),
    /// Autochecks of a host.
    GetAutochecks(String),
    /// Replace the autochecks of a host with a table read from input.
    SetAutochecks(String),
    /// Remove all files of a host.
    DeleteHost(String),
    /// Regenerate, validate and activate the configuration.
    Restart,
}

impl AutomationCommand {
    /// Parse a command name and its arguments.
    pub fn parse(name: &str, args: &[String]) -> Result<Self, AutomationError> {
        let host = || {
            args.first()
                .cloned()
                .ok_or_else(|| failed(format!("Automation command '{name}' needs a host name.")))
        };
        match name {
            "try-inventory" => Ok(Self::TryInventory(host()?)),
            "get-autochecks" => Ok(Self::GetAutochecks(host()?)),
            "set-autochecks" => Ok(Self::SetAutochecks(host()?)),
            "delete-host" => Ok(Self::DeleteHost(host()?)),
            "restart" => Ok(Self::Restart),
            other => Err(failed(format!(
                "Automation command '{other}' is not implemented."
            ))),
        }
    }
}

/// Run an automation command. `input` is the standard input of the call,
/// only read by `set-autochecks`.
pub async fn run(
    engine: &Engine,
    source: &dyn DataSource,
    command: &AutomationCommand,
    input: &str,
) -> Result<Value, AutomationError> {
    tracing::debug!(?command, "running automation");
    match command {
        AutomationCommand::TryInventory(host) => {
            let rows = try_inventory(engine, source, host).await?;
            Ok(Value::List(rows.iter().map(TryInventoryRow::to_value).collect()))
        }
        AutomationCommand::GetAutochecks(host) => {
            let rows = get_autochecks(engine, host)?;
            Ok(Value::List(
                rows.into_iter()
                    .map(|ac| {
                        Value::Tuple(vec![
                            Value::Str(ac.check_type),
                            ac.item.to_value(),
                            ac.params,
                            Value::Str(ac.paramstring),
                        ])
                    })
                    .collect(),
            ))
        }
        AutomationCommand::SetAutochecks(host) => {
            set_autochecks(engine, host, input)?;
            Ok(Value::None)
        }
        AutomationCommand::DeleteHost(host) => {
            housekeeping::delete_host(&engine.config().paths, host)?;
            Ok(Value::None)
        }
        AutomationCommand::Restart => {
            activation::activate(engine, CoreAction::Restart)
                .await
                .map_err(|e| failed(e.to_string()))?;
            Ok(Value::None)
        }
    }
}

// ── try-inventory ───────────────────────────────────────────────

/// One row of `try-inventory`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TryInventoryRow {
    /// Classification.
    pub state: ServiceState,
    /// Check type, `legacy` for legacy checks.
    pub check_type: String,
    /// Item; the description for legacy checks.
    pub item: Item,
    /// Parameters as literal source.
    pub paramstring: String,
    /// Effective parameters.
    pub params: Value,
    /// Service description.
    pub description: String,
}

impl TryInventoryRow {
    /// `(state, check_type, item, paramstring, params, description)`.
    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::Str(self.state.as_str().to_owned()),
            Value::Str(self.check_type.clone()),
            self.item.to_value(),
            Value::Str(self.paramstring.clone()),
            self.params.clone(),
            Value::Str(self.description.clone()),
        ])
    }
}

/// Classify every service of a host: what discovery finds now, autochecks
/// it no longer finds, configured checks and legacy checks.
pub async fn try_inventory(
    engine: &Engine,
    source: &dyn DataSource,
    host: &str,
) -> Result<Vec<TryInventoryRow>, AutomationError> {
    if engine.lookup_ipaddress(host).is_none() {
        return Err(failed(format!("Cannot lookup IP address of host {host}")));
    }
    let options = InventoryOptions {
        check_only: true,
        include_state: true,
    };
    let hosts = [host.to_owned()];

    let mut discovered = Vec::new();
    if engine.is_snmp_host(host) {
        discovered.extend(discovery::do_snmp_scan(engine, source, &hosts, options).await?);
    }
    if engine.is_tcp_host(host) {
        for check_type in engine.catalog().inventorable(false) {
            discovered
                .extend(discovery::make_inventory(engine, source, check_type, &hosts, options).await?);
        }
    }

    let mut found: BTreeMap<(String, Item), (ServiceState, String)> = BTreeMap::new();
    for service in discovered {
        found.insert(
            (service.check_type, service.item),
            (service.state, service.paramstring),
        );
    }
    for ac in engine.autochecks().iter().filter(|ac| ac.host == host) {
        found
            .entry((ac.check_type.clone(), ac.item.clone()))
            .or_insert_with(|| (ServiceState::Vanished, ac.paramstring.clone()));
    }
    for ((check_type, item), spec) in engine.check_table(host)?.iter() {
        found
            .entry((check_type.clone(), item.clone()))
            .or_insert_with(|| (ServiceState::Manual, spec.params.to_string()));
    }
    for legacy in engine.legacy_checks_of(host) {
        found.insert(
            ("legacy".to_owned(), Item::Str(legacy.description.clone())),
            (ServiceState::Legacy, "None".to_owned()),
        );
    }

    let facts = engine.facts(host);
    let check_parameters = &engine.config().rules.check_parameters;
    let mut table = Vec::with_capacity(found.len());
    for ((check_type, item), (state, paramstring)) in found {
        if state == ServiceState::Legacy {
            let description = match &item {
                Item::Str(s) => s.clone(),
                other => other.to_string(),
            };
            table.push(TryInventoryRow {
                state,
                check_type,
                item,
                paramstring,
                params: Value::None,
                description,
            });
            continue;
        }
        let description = engine.service_description(&check_type, &item)?;
        let parsed = Value::parse(&paramstring)
            .map_err(|_| failed(format!("Invalid check parameter string '{paramstring}'")))?;
        let mut params = engine.resolve_params(&parsed)?;
        if state != ServiceState::Manual {
            if let Some(first) = service_extra_conf(&facts, &description, check_parameters).first() {
                params = (*first).clone();
            }
        }
        table.push(TryInventoryRow {
            state,
            check_type,
            item,
            paramstring,
            params,
            description,
        });
    }
    Ok(table)
}

// ── autochecks ──────────────────────────────────────────────────

fn line_error(e: AutocheckError) -> AutomationError {
    match e {
        AutocheckError::Line { .. } => failed(e.to_string()),
        other => other.into(),
    }
}

/// Reorganise the autochecks directory, then read the host's file.
pub fn get_autochecks(
    engine: &Engine,
    host: &str,
) -> Result<Vec<autochecks::Autocheck>, AutomationError> {
    let dir = engine.config().paths.autochecks_dir();
    autochecks::cleanup(&dir)?;
    autochecks::read_host_file(&dir, host).map_err(line_error)
}

/// Parse `{(check_type, item): 'paramstring', ...}`.
fn parse_autocheck_table(input: &str) -> Result<Vec<AutocheckRow>, AutomationError> {
    let invalid = || failed("Invalid autochecks table: expected {(check_type, item): 'paramstring'}");
    let value = Value::parse(input.trim()).map_err(|e| failed(format!("Invalid autochecks table: {e}")))?;
    let Value::Dict(pairs) = value else {
        return Err(invalid());
    };
    let mut rows = Vec::with_capacity(pairs.len());
    for (key, paramstring) in pairs {
        let [check_type, item] = key.as_seq().ok_or_else(invalid)? else {
            return Err(invalid());
        };
        let check_type = check_type.as_str().ok_or_else(invalid)?.to_owned();
        let item = Item::from_value(item).map_err(|_| invalid())?;
        let paramstring = paramstring.as_str().ok_or_else(invalid)?.to_owned();
        rows.push((check_type, item, paramstring));
    }
    Ok(rows)
}

/// Replace the autochecks of a host. Services that stay keep the parameter
/// text they already have.
pub fn set_autochecks(engine: &Engine, host: &str, input: &str) -> Result<(), AutomationError> {
    let mut wanted = parse_autocheck_table(input)?;
    let dir = engine.config().paths.autochecks_dir();
    autochecks::cleanup(&dir)?;
    let existing = autochecks::read_host_file(&dir, host).map_err(line_error)?;

    let mut table: Vec<AutocheckRow> = Vec::with_capacity(wanted.len());
    for ac in existing {
        if let Some(pos) = wanted
            .iter()
            .position(|(ct, item, _)| *ct == ac.check_type && *item == ac.item)
        {
            wanted.remove(pos);
            table.push((ac.check_type, ac.item, ac.paramstring));
        }
    }
    table.extend(wanted);
    let path = autochecks::write_host_file(&dir, host, &table)?;
    tracing::info!(host, checks = table.len(), path = %path.display(), "wrote autochecks");
    Ok(())
}
