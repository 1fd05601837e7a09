//! Coverage for check tables, descriptions and dependency ordering.

use cmkbase::autochecks::Autocheck;
use cmkbase::catalog::CheckCatalog;
use cmkbase::engine::{Engine, EngineError};
use cmkbase::literal::{Item, Value};

use crate::common::{config, engine};

const HOSTS: &str = r#"
all_hosts = ["srv1|linux", "srv2|linux|prod", "win1|windows"]
checks = [
    ["srv1", "df", "/", [80, 90]],
    [["linux"], ["@all"], "cpu.loads", [], [5.0, 10.0]],
    [["prod"], ["@all"], "mem.used", [], [150.0, 200.0]],
    { hosts = ["srv2"], check_type = "kernel", item = "Context Switches", params_var = "kernel_default_levels" },
]

[ipaddresses]
srv1 = "10.0.0.1"
srv2 = "10.0.0.2"
win1 = "10.0.0.3"
"#;

fn key(check_type: &str, item: Item) -> (String, Item) {
    (check_type.to_owned(), item)
}

#[test]
fn tags_and_host_lists_select_checks() {
    let engine = engine(HOSTS);
    let srv1 = match engine.check_table("srv1") {
        Ok(table) => table,
        Err(e) => panic!("check table should build: {e}"),
    };
    assert_eq!(srv1.len(), 2);
    assert!(srv1.contains_key(&key("df", Item::from("/"))));
    assert!(srv1.contains_key(&key("cpu.loads", Item::None)));

    let srv2 = match engine.check_table("srv2") {
        Ok(table) => table,
        Err(e) => panic!("check table should build: {e}"),
    };
    assert!(srv2.contains_key(&key("mem.used", Item::None)));
    assert!(srv2.contains_key(&key("kernel", Item::from("Context Switches"))));
    assert!(!srv2.contains_key(&key("df", Item::from("/"))));

    let win1 = match engine.check_table("win1") {
        Ok(table) => table,
        Err(e) => panic!("check table should build: {e}"),
    };
    assert!(win1.is_empty());
}

#[test]
fn descriptions_follow_plugin_templates() {
    let engine = engine(HOSTS);
    let table = match engine.check_table("srv2") {
        Ok(table) => table,
        Err(e) => panic!("check table should build: {e}"),
    };
    let descriptions: Vec<&str> = table.values().map(|s| s.description.as_str()).collect();
    assert!(descriptions.contains(&"CPU load"));
    assert!(descriptions.contains(&"Memory used"));
    assert!(descriptions.contains(&"Kernel Context Switches"));
}

#[test]
fn illegal_characters_are_removed_from_items() {
    let engine = engine("");
    let description = match engine.service_description("df", &Item::from("/mnt/it's")) {
        Ok(d) => d,
        Err(e) => panic!("description should render: {e}"),
    };
    assert_eq!(description, "fs_/mnt/its");
}

#[test]
fn service_descriptions_override_templates() {
    let engine = engine(
        r#"
[service_descriptions]
df = "Filesystem %s"
"cpu.loads" = "Load"
"#,
    );
    assert_eq!(
        engine.service_description("df", &Item::from("/var")).ok().as_deref(),
        Some("Filesystem /var")
    );
    assert_eq!(
        engine.service_description("cpu.loads", &Item::None).ok().as_deref(),
        Some("Load")
    );
}

#[test]
fn unknown_check_type_is_an_error() {
    let engine = engine("");
    assert!(matches!(
        engine.service_description("nosuch", &Item::None),
        Err(EngineError::UnknownCheckType(name)) if name == "nosuch"
    ));
}

#[test]
fn configured_checks_win_over_autochecks() {
    let autochecks = vec![
        Autocheck {
            host: "srv1".to_owned(),
            check_type: "df".to_owned(),
            item: Item::from("/"),
            params: Value::Ref("filesystem_default_levels".to_owned()),
            paramstring: "filesystem_default_levels".to_owned(),
        },
        Autocheck {
            host: "srv1".to_owned(),
            check_type: "df".to_owned(),
            item: Item::from("/var"),
            params: Value::Ref("filesystem_default_levels".to_owned()),
            paramstring: "filesystem_default_levels".to_owned(),
        },
    ];
    let engine = match Engine::new(config(HOSTS), CheckCatalog::builtin(), autochecks) {
        Ok(engine) => engine,
        Err(e) => panic!("engine should build: {e}"),
    };
    let table = match engine.check_table("srv1") {
        Ok(table) => table,
        Err(e) => panic!("check table should build: {e}"),
    };
    let root = table.get(&key("df", Item::from("/"))).map(|s| s.params.clone());
    assert_eq!(root, Some(Value::Tuple(vec![Value::Int(80), Value::Int(90)])));
    let var = table.get(&key("df", Item::from("/var"))).map(|s| s.params.clone());
    assert_eq!(var, Some(Value::Ref("filesystem_default_levels".to_owned())));
}

#[test]
fn check_parameters_replace_autocheck_params() {
    let autochecks = vec![Autocheck {
        host: "srv1".to_owned(),
        check_type: "df".to_owned(),
        item: Item::from("/home"),
        params: Value::Ref("filesystem_default_levels".to_owned()),
        paramstring: "filesystem_default_levels".to_owned(),
    }];
    let text = format!("check_parameters = [[[95, 98], [\"srv1\"], [\"fs_/home\"]]]\n{HOSTS}");
    let engine = match Engine::new(config(&text), CheckCatalog::builtin(), autochecks) {
        Ok(engine) => engine,
        Err(e) => panic!("engine should build: {e}"),
    };
    let table = match engine.check_table("srv1") {
        Ok(table) => table,
        Err(e) => panic!("check table should build: {e}"),
    };
    assert_eq!(
        table.get(&key("df", Item::from("/home"))).map(|s| s.params.to_string()),
        Some("(95, 98)".to_owned())
    );
}

#[test]
fn unknown_parameter_variable_is_rejected() {
    let text = r#"
all_hosts = ["srv1"]
checks = [{ hosts = "srv1", check_type = "uptime", params_var = "no_such_levels" }]
"#;
    let result = Engine::new(config(text), CheckCatalog::builtin(), Vec::new());
    assert!(matches!(result, Err(EngineError::Literal(_))));
}

#[test]
fn dependencies_order_the_table() {
    let text = r#"
all_hosts = ["srv1"]
checks = [
    ["srv1", "cpu.loads", [], "cpuload_default_levels"],
    ["srv1", "df", "/", [80, 90]],
    ["srv1", "uptime", [], []],
]
service_dependencies = [
    ["Uptime", ["srv1"], ["^CPU"]],
    ["CPU load", ["srv1"], ["^fs_"]],
    ["Nonexistent", ["srv1"], ["^Uptime"]],
]
"#;
    let engine = engine(text);
    let sorted = match engine.sorted_check_table("srv1") {
        Ok(sorted) => sorted,
        Err(e) => panic!("table should sort: {e}"),
    };
    let order: Vec<&str> = sorted.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(order, vec!["Uptime", "CPU load", "fs_/"]);
    let uptime = sorted.iter().find(|e| e.description == "Uptime");
    assert_eq!(uptime.map(|e| e.deps.is_empty()), Some(true));
}

#[test]
fn cyclic_dependencies_are_reported() {
    let text = r#"
all_hosts = ["srv1"]
checks = [
    ["srv1", "cpu.loads", [], []],
    ["srv1", "uptime", [], []],
]
service_dependencies = [
    ["Uptime", ["srv1"], ["^CPU"]],
    ["CPU load", ["srv1"], ["^Uptime"]],
]
"#;
    let engine = engine(text);
    match engine.sorted_check_table("srv1") {
        Err(EngineError::CyclicDependency { host, descriptions }) => {
            assert_eq!(host, "srv1");
            assert_eq!(descriptions, vec!["CPU load".to_owned(), "Uptime".to_owned()]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}
