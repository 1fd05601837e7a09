//! Coverage for reading, rewriting and cleaning up autochecks files.

use std::path::Path;

use chrono::{Local, TimeZone};
use cmkbase::autochecks::{self, AutocheckError, CleanupStats};
use cmkbase::literal::{Item, Value};

fn write(dir: &Path, name: &str, text: &str) {
    if let Err(e) = std::fs::write(dir.join(name), text) {
        panic!("cannot write {name}: {e}");
    }
}

fn tempdir() -> tempfile::TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temp dir: {e}"),
    }
}

const DF_FILE: &str = "# df-2026-10-01_10.00.00.mk\n[\n  (\"srv1\", \"df\", '/', filesystem_default_levels),\n  (\"srv2\", \"df\", '/var', (80, 90)),\n]\n";
const CPU_FILE: &str = "[\n  (\"srv1\", \"cpu.loads\", None, cpuload_default_levels),\n]\n";

#[test]
fn read_all_keeps_variable_references() {
    let dir = tempdir();
    write(dir.path(), "df-2026-10-01_10.00.00.mk", DF_FILE);
    write(dir.path(), "cpu.loads-2026-10-01_10.00.00.mk", CPU_FILE);
    write(dir.path(), "notes.txt", "ignored");

    let all = match autochecks::read_all(dir.path()) {
        Ok(all) => all,
        Err(e) => panic!("autochecks should parse: {e}"),
    };
    assert_eq!(all.len(), 3);
    let first = all.first().map(|a| (a.check_type.as_str(), a.item.clone()));
    assert_eq!(first, Some(("cpu.loads", Item::None)));
    let root = all.iter().find(|a| a.item == Item::from("/"));
    assert_eq!(
        root.map(|a| a.params.clone()),
        Some(Value::Ref("filesystem_default_levels".to_owned()))
    );
}

#[test]
fn missing_directory_has_no_autochecks() {
    let dir = tempdir();
    let all = autochecks::read_all(&dir.path().join("absent"));
    assert_eq!(all.ok().map(|a| a.len()), Some(0));
}

#[test]
fn syntax_errors_name_the_file() {
    let dir = tempdir();
    write(dir.path(), "broken.mk", "[\n  (\"srv1\", \"df\",\n");
    match autochecks::read_all(dir.path()) {
        Err(AutocheckError::Syntax { path, .. }) => {
            assert!(path.ends_with("broken.mk"));
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}

#[test]
fn cleanup_groups_entries_per_host() {
    let dir = tempdir();
    write(dir.path(), "df-2026-10-01_10.00.00.mk", DF_FILE);
    write(dir.path(), "cpu.loads-2026-10-01_10.00.00.mk", CPU_FILE);

    let stats = autochecks::cleanup(dir.path()).ok();
    assert_eq!(stats, Some(CleanupStats { checks: 3, hosts: 2 }));
    assert!(autochecks::host_file(dir.path(), "srv1").exists());
    assert!(autochecks::host_file(dir.path(), "srv2").exists());
    assert!(!dir.path().join("df-2026-10-01_10.00.00.mk").exists());

    let srv1 = match std::fs::read_to_string(autochecks::host_file(dir.path(), "srv1")) {
        Ok(text) => text,
        Err(e) => panic!("host file should exist: {e}"),
    };
    assert_eq!(
        srv1,
        "[\n  (\"srv1\", \"cpu.loads\", None, cpuload_default_levels),\n  (\"srv1\", \"df\", '/', filesystem_default_levels),\n]\n"
    );
}

#[test]
fn remove_autochecks_of_deletes_emptied_files() {
    let dir = tempdir();
    write(dir.path(), "df-2026-10-01_10.00.00.mk", DF_FILE);
    write(dir.path(), "cpu.loads-2026-10-01_10.00.00.mk", CPU_FILE);

    let removed = autochecks::remove_autochecks_of(dir.path(), "srv1", &["df", "cpu.loads"]);
    assert_eq!(removed.ok(), Some(2));
    assert!(!dir.path().join("cpu.loads-2026-10-01_10.00.00.mk").exists());

    let left = match autochecks::read_all(dir.path()) {
        Ok(left) => left,
        Err(e) => panic!("remaining file should parse: {e}"),
    };
    assert_eq!(left.len(), 1);
    assert_eq!(left.first().map(|a| a.host.as_str()), Some("srv2"));
}

#[test]
fn host_file_round_trip_keeps_parameter_text() {
    let dir = tempdir();
    let rows = vec![
        ("df".to_owned(), Item::from("/"), "filesystem_default_levels".to_owned()),
        ("cpu.loads".to_owned(), Item::None, "(5.0, 10.0)".to_owned()),
    ];
    let path = match autochecks::write_host_file(dir.path(), "srv1", &rows) {
        Ok(path) => path,
        Err(e) => panic!("host file should be written: {e}"),
    };
    assert!(path.ends_with("srv1.mk"));

    let table = match autochecks::read_host_file(dir.path(), "srv1") {
        Ok(table) => table,
        Err(e) => panic!("host file should parse: {e}"),
    };
    let paramstrings: Vec<&str> = table.iter().map(|a| a.paramstring.as_str()).collect();
    assert_eq!(paramstrings, vec!["filesystem_default_levels", "(5.0, 10.0)"]);
    assert_eq!(table.last().map(|a| a.item.clone()), Some(Item::None));
}

#[test]
fn bad_line_in_host_file_is_reported() {
    let dir = tempdir();
    write(dir.path(), "srv1.mk", "[\n  (\"srv1\", \"df\"),\n]\n");
    assert!(matches!(
        autochecks::read_host_file(dir.path(), "srv1"),
        Err(AutocheckError::Line { line: 2, .. })
    ));
}

#[test]
fn inventory_files_never_overwrite() {
    let dir = tempdir();
    let now = match Local.with_ymd_and_hms(2026, 10, 19, 8, 30, 0).single() {
        Some(now) => now,
        None => panic!("timestamp should be unambiguous"),
    };
    let lines = vec![autochecks::inventory_line("srv1", "uptime", &Item::None, "None")];
    let first = autochecks::write_inventory_file(dir.path(), "uptime", now, &lines).ok();
    let second = autochecks::write_inventory_file(dir.path(), "uptime", now, &lines).ok();

    let name = |p: Option<std::path::PathBuf>| {
        p.and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
    };
    assert_eq!(name(first).as_deref(), Some("uptime-2026-10-19_08.30.00.mk"));
    assert_eq!(name(second).as_deref(), Some("uptime-2026-10-19_08.30.00.x.mk"));
    assert_eq!(autochecks::read_all(dir.path()).ok().map(|a| a.len()), Some(2));
}

#[test]
fn remove_all_empties_the_directory() {
    let dir = tempdir();
    write(dir.path(), "a.mk", CPU_FILE);
    write(dir.path(), "b.mk", CPU_FILE);
    assert_eq!(autochecks::remove_all(dir.path()).ok(), Some(2));
    assert_eq!(autochecks::read_all(dir.path()).ok().map(|a| a.len()), Some(0));
}
