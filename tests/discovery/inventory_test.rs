//! Coverage for agent based inventory and the inventory check.

use cmkbase::autochecks;
use cmkbase::discovery::{self, DiscoveryError, InventoryOptions, ServiceState};
use cmkbase::literal::Item;

use crate::common::{engine_in, FakeSource, LINUX_AGENT};

const SRV1: &str = r#"
all_hosts = ["srv1"]

[ipaddresses]
srv1 = "10.0.0.1"
"#;

fn tempdir() -> tempfile::TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temp dir: {e}"),
    }
}

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|h| (*h).to_owned()).collect()
}

#[tokio::test]
async fn new_filesystems_are_written_to_autochecks() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);

    let found = match discovery::make_inventory(
        &engine,
        &source,
        "df",
        &hosts(&["srv1"]),
        InventoryOptions::default(),
    )
    .await
    {
        Ok(found) => found,
        Err(e) => panic!("inventory should succeed: {e}"),
    };
    let items: Vec<Item> = found.iter().map(|s| s.item.clone()).collect();
    assert_eq!(items, vec![Item::from("/"), Item::from("/var/log")]);
    assert!(found.iter().all(|s| s.state == ServiceState::New));
    assert!(found.iter().all(|s| s.paramstring == "filesystem_default_levels"));

    let stored = match autochecks::read_all(&engine.config().paths.autochecks_dir()) {
        Ok(stored) => stored,
        Err(e) => panic!("written autochecks should parse: {e}"),
    };
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|a| a.host == "srv1" && a.check_type == "df"));
}

#[tokio::test]
async fn known_services_are_not_rediscovered() {
    let var = tempdir();
    let text = format!("checks = [[\"srv1\", \"df\", \"/\", [80, 90]]]\n{SRV1}");
    let engine = engine_in(var.path(), &text);
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);
    let options = InventoryOptions {
        check_only: true,
        include_state: false,
    };

    let found = discovery::make_inventory(&engine, &source, "df", &hosts(&["srv1"]), options)
        .await
        .ok()
        .map(|found| found.into_iter().map(|s| s.item).collect::<Vec<_>>());
    assert_eq!(found, Some(vec![Item::from("/var/log")]));
    assert!(!engine.config().paths.autochecks_dir().exists());
}

#[tokio::test]
async fn include_state_classifies_services() {
    let var = tempdir();
    let text = format!(
        "checks = [[\"srv1\", \"df\", \"/\", [80, 90]]]\nignored_services = [[[\"srv1\"], [\"fs_/var\"]]]\n{SRV1}"
    );
    let engine = engine_in(var.path(), &text);
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);
    let options = InventoryOptions {
        check_only: true,
        include_state: true,
    };

    let found = match discovery::make_inventory(&engine, &source, "df", &hosts(&["srv1"]), options)
        .await
    {
        Ok(found) => found,
        Err(e) => panic!("inventory should succeed: {e}"),
    };
    let states: Vec<ServiceState> = found.iter().map(|s| s.state).collect();
    assert_eq!(states, vec![ServiceState::Old, ServiceState::Ignored]);
}

#[tokio::test]
async fn unreachable_hosts_only_fail_when_checking() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let source = FakeSource::default();

    let skipped = discovery::make_inventory(
        &engine,
        &source,
        "uptime",
        &hosts(&["srv1"]),
        InventoryOptions::default(),
    )
    .await;
    assert_eq!(skipped.ok().map(|found| found.len()), Some(0));

    let checked = discovery::make_inventory(
        &engine,
        &source,
        "uptime",
        &hosts(&["srv1"]),
        InventoryOptions {
            check_only: true,
            include_state: false,
        },
    )
    .await;
    assert!(matches!(checked, Err(DiscoveryError::Host { host, .. }) if host == "srv1"));
}

#[tokio::test]
async fn unknown_check_type_is_rejected() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let source = FakeSource::default();
    let result =
        discovery::make_inventory(&engine, &source, "nosuch", &[], InventoryOptions::default())
            .await;
    assert!(matches!(result, Err(DiscoveryError::UnknownCheckType(name)) if name == "nosuch"));
}

#[tokio::test]
async fn clustered_services_are_inventorised_for_the_cluster() {
    let var = tempdir();
    let text = r#"
all_hosts = ["node1"]
clustered_services = [[["node1"], ["fs_/$"]]]

[clusters]
db = ["node1"]

[ipaddresses]
node1 = "10.0.0.11"
"#;
    let engine = engine_in(var.path(), text);
    let source = FakeSource::with_agent("node1", LINUX_AGENT);
    let found = match discovery::make_inventory(
        &engine,
        &source,
        "df",
        &hosts(&["node1"]),
        InventoryOptions::default(),
    )
    .await
    {
        Ok(found) => found,
        Err(e) => panic!("inventory should succeed: {e}"),
    };
    let owners: Vec<(&str, String)> = found
        .iter()
        .map(|s| (s.host.as_str(), s.item.to_string()))
        .collect();
    assert_eq!(
        owners,
        vec![("db", "'/'".to_owned()), ("node1", "'/var/log'".to_owned())]
    );
}

#[tokio::test]
async fn run_inventory_covers_given_types() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);

    let found = match discovery::run_inventory(
        &engine,
        &source,
        &hosts(&["df", "uptime"]),
        &hosts(&["srv1"]),
    )
    .await
    {
        Ok(found) => found,
        Err(e) => panic!("inventory should succeed: {e}"),
    };
    let counts = discovery::count_by_check_type(&found);
    assert_eq!(counts.get("df"), Some(&2));
    assert_eq!(counts.get("uptime"), Some(&1));
    assert_eq!(counts.len(), 2);
}

#[test]
fn selected_check_types_default_to_everything_inventorable() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let all = discovery::selected_check_types(&engine, &[]);
    assert!(all.contains(&"df".to_owned()));
    assert!(all.contains(&"if".to_owned()));
    assert_eq!(
        discovery::selected_check_types(&engine, &hosts(&["uptime"])),
        vec!["uptime".to_owned()]
    );
}

#[test]
fn remove_for_redo_drops_selected_types() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let dir = engine.config().paths.autochecks_dir();
    if let Err(e) = std::fs::create_dir_all(&dir) {
        panic!("cannot create autochecks dir: {e}");
    }
    let text = "[\n  (\"srv1\", \"df\", '/', filesystem_default_levels),\n  (\"srv1\", \"uptime\", None, None),\n]\n";
    if let Err(e) = std::fs::write(dir.join("srv1.mk"), text) {
        panic!("cannot write autochecks: {e}");
    }

    let removed = discovery::remove_for_redo(&engine, &hosts(&["df"]), &hosts(&["srv1"]));
    assert_eq!(removed.ok(), Some(1));
    let left = autochecks::read_all(&dir)
        .ok()
        .map(|left| left.into_iter().map(|a| a.check_type).collect::<Vec<_>>());
    assert_eq!(left, Some(vec!["uptime".to_owned()]));
}

#[tokio::test]
async fn inventory_check_lists_unchecked_services() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let source = FakeSource::with_agent("srv1", LINUX_AGENT);

    let result = discovery::check_inventory(&engine, &source, "srv1").await;
    assert_eq!(result.exit_code, 1);
    assert_eq!(
        result.output,
        "WARNING - 6 unchecked services (cpu.loads:1, cpu.threads:1, df:2, mem.used:1, uptime:1)\n\
         cpu.loads: CPU load\n\
         cpu.threads: Number of threads\n\
         df: fs_/\n\
         df: fs_/var/log\n\
         mem.used: Memory used\n\
         uptime: Uptime\n"
    );
    assert!(!engine.config().paths.autochecks_dir().exists());
}

#[tokio::test]
async fn inventory_check_is_ok_when_everything_is_monitored() {
    let var = tempdir();
    let text = format!("checks = [[\"srv1\", \"uptime\", [], []]]\n{SRV1}");
    let engine = engine_in(var.path(), &text);
    let source = FakeSource::with_agent("srv1", "<<<uptime>>>\n12345.6 7890.1\n");

    let result = discovery::check_inventory(&engine, &source, "srv1").await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "OK - no unchecked services found\n");
}

#[tokio::test]
async fn inventory_check_severity_is_configurable() {
    let var = tempdir();
    let text = format!("inventory_check_severity = 2\n{SRV1}");
    let engine = engine_in(var.path(), &text);
    let source = FakeSource::with_agent("srv1", "<<<uptime>>>\n12345.6 7890.1\n");

    let result = discovery::check_inventory(&engine, &source, "srv1").await;
    assert_eq!(result.exit_code, 2);
    assert!(result.output.starts_with("CRITICAL - 1 unchecked services (uptime:1)\n"));
}

#[tokio::test]
async fn inventory_check_reports_unreachable_hosts_as_unknown() {
    let var = tempdir();
    let engine = engine_in(var.path(), SRV1);
    let result = discovery::check_inventory(&engine, &FakeSource::default(), "srv1").await;
    assert_eq!(result.exit_code, 3);
    assert!(result.output.starts_with("UNKNOWN - Host 'srv1': "));
}
