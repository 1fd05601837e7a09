//! `cmk` entry point.
//!
//! Generates the Nagios object configuration, precompiles host checks,
//! inventorises services and answers automation calls. Generated artifacts
//! go to stdout; diagnostics go to stderr.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::io::Read;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use cmkbase::activation::{self, CoreAction};
use cmkbase::automation::{self, AutomationCommand, AutomationError};
use cmkbase::autochecks;
use cmkbase::catalog::CheckCatalog;
use cmkbase::config::{ConfigError, LoadOptions};
use cmkbase::discovery::{self, DataSource, LiveDataSource};
use cmkbase::engine::{Engine, EngineError};
use cmkbase::literal::Value;
use cmkbase::logging::{self, LoggingGuard};
use cmkbase::{housekeeping, nagios, parents, precompile, report};

/// Exit status for configuration and engine errors.
const CONFIG_ERROR: u8 = 3;

/// Exit status for every other failure.
const FAILURE: u8 = 1;

/// cmk: host/service rule engine and Nagios configuration compiler.
#[derive(Parser)]
#[command(name = "cmk", version, about)]
struct Cli {
    /// Log debug details to stderr (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Print the Nagios configuration of all or some hosts.
    Config {
        /// Restrict output to these hosts.
        hosts: Vec<String>,
    },
    /// Precompile host checks.
    Compile,
    /// Write the objects file and precompile host checks.
    Update,
    /// Update, validate and restart Nagios.
    Restart,
    /// Update, validate and reload Nagios.
    Reload,
    /// Inventorise services of all or some hosts.
    Inventory {
        /// Restrict inventory to these check types (comma separated).
        #[arg(long, value_delimiter = ',')]
        checks: Vec<String>,
        /// Remove existing autochecks of the check types first.
        #[arg(long)]
        redo: bool,
        /// Reorganise the autochecks directory afterwards.
        #[arg(long)]
        cleanup: bool,
        /// Hosts to inventorise; `name/ip` bypasses address lookup.
        hosts: Vec<String>,
    },
    /// Reorganise the autochecks directory into one file per host.
    CleanupAutochecks,
    /// Behave as a Nagios plugin reporting unchecked services.
    CheckInventory {
        /// Host to check.
        host: String,
    },
    /// Store complete SNMP walks for later use.
    Snmpwalk {
        /// Hosts to walk.
        hosts: Vec<String>,
    },
    /// Print the raw agent output of a host.
    AgentOutput {
        /// Host to contact.
        host: String,
        /// Address to use instead of looking it up.
        ip: Option<String>,
    },
    /// Run an automation command for remote configuration tools.
    Automation {
        /// Print the result as JSON instead of literal syntax.
        #[arg(long)]
        json: bool,
        /// Command name, e.g. `try-inventory`.
        name: String,
        /// Command arguments.
        args: Vec<String>,
    },
    /// Delete counters, cache files and logwatch files of hosts.
    Flush {
        /// Hosts to flush; all when empty.
        hosts: Vec<String>,
    },
    /// Show host summaries and service tables.
    Dump {
        /// Hosts to dump; all when empty.
        hosts: Vec<String>,
    },
    /// List active hosts, optionally of some host groups.
    ListHosts {
        /// Host groups.
        groups: Vec<String>,
    },
    /// List active hosts having all given tags.
    ListTag {
        /// Tags; `!tag` requires a tag to be absent.
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// List all directories and files in use.
    Paths,
    /// List all available check types.
    ListChecks,
    /// Find parents of hosts via traceroute.
    ScanParents {
        /// Hosts to scan; the configured list when empty.
        hosts: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("{e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

fn exit_status(e: &anyhow::Error) -> u8 {
    if e.is::<ConfigError>() || e.is::<EngineError>() {
        CONFIG_ERROR
    } else {
        FAILURE
    }
}

fn init_logging(verbose: bool, engine: Option<&Engine>) -> anyhow::Result<Option<LoggingGuard>> {
    match engine.and_then(|e| e.config().settings.debug_log.as_deref()) {
        Some(path) => logging::init_with_debug_log(verbose, path).map(Some),
        None => logging::init_cli(verbose).map(|()| None),
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if matches!(cli.command, Command::ListChecks) {
        logging::init_cli(cli.verbose)?;
        print!("{}", report::list_checks(&CheckCatalog::builtin()));
        return Ok(ExitCode::SUCCESS);
    }

    let options = LoadOptions {
        skip_parents_file: matches!(cli.command, Command::ScanParents { .. }),
    };
    let loaded = Engine::load(CheckCatalog::builtin(), options);
    let _logging_guard = init_logging(cli.verbose, loaded.as_ref().ok())?;
    let mut engine = loaded.context("error in configuration")?;

    match cli.command {
        Command::Config { hosts } => {
            let text = if hosts.is_empty() {
                nagios::render(&engine)
            } else {
                nagios::render_hosts(&engine, &hosts)
            }
            .context("cannot create configuration")?;
            print!("{text}");
        }
        Command::Compile => {
            let written = precompile::precompile_all(&engine).context("cannot precompile")?;
            info!(hosts = written.len(), "precompiled host checks");
        }
        Command::Update => {
            activation::update(&engine)?;
        }
        Command::Restart => activation::activate(&engine, CoreAction::Restart).await?,
        Command::Reload => activation::activate(&engine, CoreAction::Reload).await?,
        Command::Inventory {
            checks,
            redo,
            cleanup,
            hosts,
        } => handle_inventory(&mut engine, &checks, redo, cleanup, &hosts).await?,
        Command::CleanupAutochecks => cleanup_autochecks(&engine)?,
        Command::CheckInventory { host } => {
            let source = LiveDataSource::new(&engine);
            let check = discovery::check_inventory(&engine, &source, &host).await;
            print!("{}", check.output);
            return Ok(ExitCode::from(check.exit_code));
        }
        Command::Snmpwalk { hosts } => handle_snmpwalk(&engine, &hosts).await,
        Command::AgentOutput { host, ip } => {
            let ip = match ip {
                Some(ip) => ip,
                None => engine.require_ipaddress(&host)?,
            };
            let source = LiveDataSource::new(&engine);
            let output = source
                .agent_output(&host, &ip, 0)
                .await
                .context("Problem contacting agent")?;
            print!("{output}");
        }
        Command::Automation { json, name, args } => {
            return Ok(handle_automation(&engine, json, &name, &args).await);
        }
        Command::Flush { hosts } => {
            let hosts = if hosts.is_empty() {
                engine.active_hosts_and_clusters()
            } else {
                hosts
            };
            for host in &hosts {
                let flushed = housekeeping::flush_host(&engine.config().paths, host);
                println!("{host:<20}: {flushed}");
            }
        }
        Command::Dump { hosts } => print!("{}", report::dump_hosts(&engine, &hosts)),
        Command::ListHosts { groups } => print_lines(&report::list_hosts(&engine, &groups)),
        Command::ListTag { tags } => print_lines(&report::list_hosts_with_tags(&engine, &tags)),
        Command::Paths => print!("{}", report::show_paths(&engine.config().paths)),
        Command::ListChecks => print!("{}", report::list_checks(engine.catalog())),
        Command::ScanParents { hosts } => {
            let scan = parents::scan_parents(&engine, &hosts).await;
            let path = parents::write_parents_file(&engine, &scan)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{line}");
    }
}

fn cleanup_autochecks(engine: &Engine) -> anyhow::Result<()> {
    let stats = autochecks::cleanup(&engine.config().paths.autochecks_dir())
        .context("cannot clean up autochecks")?;
    info!(checks = stats.checks, hosts = stats.hosts, "reorganised autochecks");
    Ok(())
}

/// Inventory with optional re-inventory and cleanup.
async fn handle_inventory(
    engine: &mut Engine,
    checks: &[String],
    redo: bool,
    cleanup: bool,
    hosts: &[String],
) -> anyhow::Result<()> {
    if redo {
        discovery::remove_for_redo(engine, checks, hosts)?;
        engine.reread_autochecks()?;
    }

    let source = LiveDataSource::new(engine);
    let found = discovery::run_inventory(engine, &source, checks, hosts).await?;
    for (check_type, count) in discovery::count_by_check_type(&found) {
        println!("{check_type:<30} {count} new checks");
    }

    if cleanup || engine.config().settings.always_cleanup_autochecks {
        cleanup_autochecks(engine)?;
    }
    Ok(())
}

async fn handle_snmpwalk(engine: &Engine, hosts: &[String]) {
    if hosts.is_empty() {
        eprintln!("Please specify host names to walk on.");
        return;
    }
    let source = LiveDataSource::new(engine);
    for host in hosts {
        match source.store_walk(host).await {
            Ok(path) => info!(host = %host, path = %path.display(), "stored walk"),
            Err(e) => warn!(host = %host, error = %e, "Error walking {host}"),
        }
    }
}

/// Run an automation command; expected failures exit 1, others 2.
async fn handle_automation(engine: &Engine, json: bool, name: &str, args: &[String]) -> ExitCode {
    let result: Result<Value, AutomationError> = async {
        let command = AutomationCommand::parse(name, args)?;
        let mut input = String::new();
        if matches!(command, AutomationCommand::SetAutochecks(_)) {
            std::io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| AutomationError::Failed(format!("Cannot read input: {e}")))?;
        }
        let source = LiveDataSource::new(engine);
        automation::run(engine, &source, &command, &input).await
    }
    .await;

    match result {
        Ok(value) if json => match serde_json::to_string(&value) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{e}");
                ExitCode::from(2)
            }
        },
        Ok(value) => {
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
