//! Coverage for SNMP scanning and SNMP table inventory.

use std::collections::HashMap;

use cmkbase::discovery::{self, InventoryOptions, WalkRow};
use cmkbase::literal::Item;

use crate::common::{engine_in, FakeSource};

const SWITCHES: &str = r#"
all_hosts = ["sw1|snmp", "sw2|snmp", "srv1"]

[ipaddresses]
sw1 = "10.0.1.1"
sw2 = "10.0.1.2"
srv1 = "10.0.0.1"
"#;

fn row(oid: &str, value: &str) -> WalkRow {
    (oid.to_owned(), value.to_owned())
}

fn switch_source() -> FakeSource {
    let mut source = FakeSource::default();
    source.gets.insert(
        "sw1".to_owned(),
        HashMap::from([
            (".1.3.6.1.2.1.1.1.0".to_owned(), "Cisco IOS".to_owned()),
            (".1.3.6.1.2.1.1.2.0".to_owned(), ".1.3.6.1.4.1.9.1.516".to_owned()),
        ]),
    );
    source.walks.insert(
        "sw1".to_owned(),
        vec![
            row("1.3.6.1.2.1.1.3.0", "123456"),
            row("1.3.6.1.2.1.2.2.1.1.1", "1"),
            row("1.3.6.1.2.1.2.2.1.1.2", "2"),
            row("1.3.6.1.2.1.2.2.1.2.1", "lo"),
            row("1.3.6.1.2.1.2.2.1.2.2", "eth0"),
            row("1.3.6.1.2.1.2.2.1.3.1", "24"),
            row("1.3.6.1.2.1.2.2.1.3.2", "6"),
            row("1.3.6.1.2.1.2.2.1.5.1", "10000000"),
            row("1.3.6.1.2.1.2.2.1.5.2", "100000000"),
            row("1.3.6.1.2.1.2.2.1.8.1", "1"),
            row("1.3.6.1.2.1.2.2.1.8.2", "1"),
        ],
    );
    source
}

fn tempdir() -> tempfile::TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temp dir: {e}"),
    }
}

#[tokio::test]
async fn scan_lists_predicate_matches_first() {
    let var = tempdir();
    let engine = engine_in(var.path(), SWITCHES);
    let source = switch_source();
    let found = discovery::snmp_scan(&engine, &source, "sw1", "10.0.1.1").await;
    assert_eq!(found, vec!["snmp_uptime", "if", "snmp_info"]);
}

#[tokio::test]
async fn silent_devices_support_nothing() {
    let var = tempdir();
    let engine = engine_in(var.path(), SWITCHES);
    let found = discovery::snmp_scan(&engine, &switch_source(), "sw2", "10.0.1.2").await;
    assert!(found.is_empty());
}

#[tokio::test]
async fn scan_inventorises_detected_types() {
    let var = tempdir();
    let engine = engine_in(var.path(), SWITCHES);
    let source = switch_source();

    let found = match discovery::do_snmp_scan(&engine, &source, &[], InventoryOptions::default())
        .await
    {
        Ok(found) => found,
        Err(e) => panic!("scan should succeed: {e}"),
    };
    let summary: Vec<(&str, &str, Item, &str)> = found
        .iter()
        .map(|s| {
            (
                s.host.as_str(),
                s.check_type.as_str(),
                s.item.clone(),
                s.paramstring.as_str(),
            )
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            ("sw1", "snmp_uptime", Item::None, "None"),
            ("sw1", "if", Item::from("2"), "(100000000, '1')"),
        ]
    );

    let written = match std::fs::read_dir(engine.config().paths.autochecks_dir()) {
        Ok(entries) => entries.count(),
        Err(e) => panic!("autochecks should be written: {e}"),
    };
    assert_eq!(written, 2);
}

#[test]
fn table_rows_follow_the_first_column() {
    let columns = vec![
        (
            "1.3.6.1.2.1.2.2.1.1".to_owned(),
            vec![row("1.3.6.1.2.1.2.2.1.1.1", "1"), row("1.3.6.1.2.1.2.2.1.1.2", "2")],
        ),
        (
            "1.3.6.1.2.1.2.2.1.2".to_owned(),
            vec![row("1.3.6.1.2.1.2.2.1.2.2", "eth0")],
        ),
    ];
    assert_eq!(
        discovery::snmp_table(&columns),
        vec![
            vec!["1".to_owned(), String::new()],
            vec!["2".to_owned(), "eth0".to_owned()],
        ]
    );
}
