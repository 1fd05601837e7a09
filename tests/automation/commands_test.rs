//! Coverage for try-inventory and the autochecks automation calls.

use std::path::Path;

use cmkbase::automation::{self, AutomationCommand, AutomationError};
use cmkbase::autochecks;
use cmkbase::discovery::ServiceState;
use cmkbase::engine::Engine;
use cmkbase::literal::{Item, Value};

use crate::common::{engine_in, FakeSource, LINUX_AGENT};

const SITE: &str = r#"
all_hosts = ["srv1"]
checks = [["srv1", "mongodb_counters", "Operations", [1, 2]]]
ignored_services = [[["srv1"], ["fs_/var"]]]
legacy_checks = [[["check_http!80", "HTTP", true], ["srv1"]]]

[ipaddresses]
srv1 = "10.0.0.1"
"#;

const SRV1_AUTOCHECKS: &str = "[\n  (\"srv1\", \"df\", '/', filesystem_default_levels),\n  (\"srv1\", \"kernel\", 'Context Switches', kernel_default_levels),\n]\n";

fn tempdir() -> tempfile::TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temp dir: {e}"),
    }
}

/// Engine over [`SITE`] with the autochecks of srv1 spread over an
/// inventory file.
fn site(var: &Path) -> Engine {
    let dir = var.join("autochecks");
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("cannot create autochecks dir: {e}");
    }
    if let Err(e) = std::fs::write(dir.join("df-2026-10-01_10.00.00.mk"), SRV1_AUTOCHECKS) {
        panic!("cannot write autochecks: {e}");
    }
    engine_in(var, SITE)
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

#[test]
fn commands_parse_with_host_argument() {
    assert_eq!(
        AutomationCommand::parse("try-inventory", &args(&["srv1"])).ok(),
        Some(AutomationCommand::TryInventory("srv1".to_owned()))
    );
    assert_eq!(
        AutomationCommand::parse("restart", &[]).ok(),
        Some(AutomationCommand::Restart)
    );
    match AutomationCommand::parse("get-autochecks", &[]) {
        Err(e) => {
            assert_eq!(e.exit_code(), 1);
            assert_eq!(e.to_string(), "Automation command 'get-autochecks' needs a host name.");
        }
        Ok(c) => panic!("unexpected command {c:?}"),
    }
}

#[tokio::test]
async fn try_inventory_classifies_every_service() {
    let var = tempdir();
    let engine = site(var.path());
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);

    let rows = match automation::try_inventory(&engine, &source, "srv1").await {
        Ok(rows) => rows,
        Err(e) => panic!("try-inventory should succeed: {e}"),
    };
    let summary: Vec<(ServiceState, &str, &str)> = rows
        .iter()
        .map(|r| (r.state, r.check_type.as_str(), r.description.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ServiceState::New, "cpu.loads", "CPU load"),
            (ServiceState::New, "cpu.threads", "Number of threads"),
            (ServiceState::Old, "df", "fs_/"),
            (ServiceState::Ignored, "df", "fs_/var/log"),
            (ServiceState::Vanished, "kernel", "Kernel Context Switches"),
            (ServiceState::Legacy, "legacy", "HTTP"),
            (ServiceState::New, "mem.used", "Memory used"),
            (ServiceState::Manual, "mongodb_counters", "MongoDB Counters Operations"),
            (ServiceState::New, "uptime", "Uptime"),
        ]
    );

    let manual = rows.iter().find(|r| r.state == ServiceState::Manual);
    assert_eq!(manual.map(|r| r.paramstring.as_str()), Some("(1, 2)"));
    let old = rows.iter().find(|r| r.state == ServiceState::Old);
    assert_eq!(
        old.map(|r| r.params.clone()),
        Some(Value::Tuple(vec![Value::Int(80), Value::Int(90)]))
    );
}

#[tokio::test]
async fn try_inventory_applies_check_parameters() {
    let var = tempdir();
    let text = format!("check_parameters = [[[95, 98], [\"srv1\"], [\"fs_/var\"]]]\n{SITE}");
    let engine = engine_in(var.path(), &text);
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);

    let rows = match automation::try_inventory(&engine, &source, "srv1").await {
        Ok(rows) => rows,
        Err(e) => panic!("try-inventory should succeed: {e}"),
    };
    let var_log = rows.iter().find(|r| r.item == Item::from("/var/log"));
    assert_eq!(var_log.map(|r| r.params.to_string()), Some("(95, 98)".to_owned()));
}

#[tokio::test]
async fn try_inventory_needs_an_address() {
    let var = tempdir();
    let engine = engine_in(var.path(), "all_hosts = [\"nowhere.invalid\"]\n");
    let result = automation::try_inventory(&engine, &FakeSource::default(), "nowhere.invalid").await;
    match result {
        Err(AutomationError::Failed(reason)) => {
            assert_eq!(reason, "Cannot lookup IP address of host nowhere.invalid");
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[test]
fn get_autochecks_cleans_up_first() {
    let var = tempdir();
    let engine = site(var.path());
    let table = match automation::get_autochecks(&engine, "srv1") {
        Ok(table) => table,
        Err(e) => panic!("get-autochecks should succeed: {e}"),
    };
    let entries: Vec<(&str, &str)> = table
        .iter()
        .map(|a| (a.check_type.as_str(), a.paramstring.as_str()))
        .collect();
    assert_eq!(
        entries,
        vec![("df", "filesystem_default_levels"), ("kernel", "kernel_default_levels")]
    );
    let dir = engine.config().paths.autochecks_dir();
    assert!(autochecks::host_file(&dir, "srv1").exists());
    assert!(!dir.join("df-2026-10-01_10.00.00.mk").exists());
}

#[test]
fn set_autochecks_keeps_existing_parameter_text() {
    let var = tempdir();
    let engine = site(var.path());
    let input = "{('df', '/'): '(1, 2)', ('uptime', None): 'None'}";
    if let Err(e) = automation::set_autochecks(&engine, "srv1", input) {
        panic!("set-autochecks should succeed: {e}");
    }
    let dir = engine.config().paths.autochecks_dir();
    let table = match autochecks::read_host_file(&dir, "srv1") {
        Ok(table) => table,
        Err(e) => panic!("host file should parse: {e}"),
    };
    let entries: Vec<(&str, &str)> = table
        .iter()
        .map(|a| (a.check_type.as_str(), a.paramstring.as_str()))
        .collect();
    assert_eq!(entries, vec![("df", "filesystem_default_levels"), ("uptime", "None")]);
}

#[test]
fn set_autochecks_rejects_malformed_input() {
    let var = tempdir();
    let engine = site(var.path());
    let result = automation::set_autochecks(&engine, "srv1", "('df', '/')");
    assert!(matches!(&result, Err(e) if e.exit_code() == 1));
}

#[tokio::test]
async fn delete_host_removes_autochecks() {
    let var = tempdir();
    let engine = site(var.path());
    let source = FakeSource::default();

    let get = AutomationCommand::GetAutochecks("srv1".to_owned());
    let listed = automation::run(&engine, &source, &get, "").await;
    assert!(matches!(listed, Ok(Value::List(rows)) if rows.len() == 2));

    let delete = AutomationCommand::DeleteHost("srv1".to_owned());
    let deleted = automation::run(&engine, &source, &delete, "").await;
    assert!(matches!(deleted, Ok(Value::None)));
    let dir = engine.config().paths.autochecks_dir();
    assert!(!autochecks::host_file(&dir, "srv1").exists());
}
