//! Coverage for host lists, extra configuration and service patterns.

use cmkbase::rules::{
    host_extra_conf, in_binary_hostlist, in_boolean_serviceconf_list, parse, service_deps,
    service_extra_conf, HostFacts, RuleError,
};

fn raw(text: &str) -> Vec<toml::Value> {
    let table: toml::Table = match toml::from_str(&format!("r = {text}")) {
        Ok(table) => table,
        Err(e) => panic!("test rules should be valid TOML: {e}"),
    };
    match table.get("r") {
        Some(toml::Value::Array(items)) => items.clone(),
        other => panic!("expected an array, got {other:?}"),
    }
}

fn tags(t: &[&str]) -> Vec<String> {
    t.iter().map(|s| (*s).to_owned()).collect()
}

fn host<'a>(name: &'a str, tags: &'a [String]) -> HostFacts<'a> {
    HostFacts {
        name,
        tags,
        is_cluster: false,
    }
}

#[test]
fn first_host_list_entry_decides() {
    let list = match parse::host_list("test", &toml::Value::Array(raw(r#"["!a", "a"]"#))) {
        Ok(list) => list,
        Err(e) => panic!("host list should parse: {e}"),
    };
    let none = tags(&[]);
    assert!(!list.matches(&host("a", &none)));
    assert!(!list.matches(&host("b", &none)));
}

#[test]
fn markers_distinguish_clusters() {
    let list = match parse::host_list("test", &toml::Value::Array(raw(r#"["@cluster"]"#))) {
        Ok(list) => list,
        Err(e) => panic!("host list should parse: {e}"),
    };
    let none = tags(&[]);
    let cluster = HostFacts {
        name: "db",
        tags: &none,
        is_cluster: true,
    };
    assert!(list.matches(&cluster));
    assert!(!list.matches(&host("srv1", &none)));
}

#[test]
fn host_rules_return_every_match_in_order() {
    let rules = match parse::host_rules::<String>(
        "host_groups",
        &raw(r#"[["a", ["@all"]], ["b", ["linux"], ["@all"]], ["c", ["other"]], ["d", ["!win"], ["srv1"]]]"#),
    ) {
        Ok(rules) => rules,
        Err(e) => panic!("rules should parse: {e}"),
    };
    let linux = tags(&["linux"]);
    let found: Vec<&str> = host_extra_conf(&host("srv1", &linux), &rules)
        .into_iter()
        .map(String::as_str)
        .collect();
    assert_eq!(found, vec!["a", "b", "d"]);
}

#[test]
fn service_patterns_are_anchored_and_negatable() {
    let rules = match parse::service_rules::<String>(
        "service_groups",
        &raw(r#"[["no-tmp", ["@all"], ["!fs_/tmp", "fs_"]], ["cpu", ["@all"], ["CPU"]], ["load", ["@all"], ["load"]]]"#),
    ) {
        Ok(rules) => rules,
        Err(e) => panic!("rules should parse: {e}"),
    };
    let none = tags(&[]);
    let srv1 = host("srv1", &none);
    let values = |description: &str| -> Vec<String> {
        service_extra_conf(&srv1, description, &rules)
            .into_iter()
            .cloned()
            .collect()
    };
    assert_eq!(values("fs_/var"), vec!["no-tmp"]);
    assert!(values("fs_/tmp").is_empty());
    assert_eq!(values("CPU load"), vec!["cpu"]);
}

#[test]
fn binary_lists_accept_names_or_rules() {
    let none = tags(&[]);
    let names = match parse::binary_host_list("bulkwalk_hosts", &raw(r#"["sw1|snmp", "sw2"]"#)) {
        Ok(list) => list,
        Err(e) => panic!("list should parse: {e}"),
    };
    assert!(in_binary_hostlist(&host("sw1", &none), &names));
    assert!(!in_binary_hostlist(&host("sw3", &none), &names));

    let rules = match parse::binary_host_list(
        "only_hosts",
        &raw(r#"[["@negate", ["old1"]], [["@all"]]]"#),
    ) {
        Ok(list) => list,
        Err(e) => panic!("list should parse: {e}"),
    };
    assert!(!in_binary_hostlist(&host("old1", &none), &rules));
    assert!(in_binary_hostlist(&host("new1", &none), &rules));
}

#[test]
fn boolean_service_rules_stop_at_first_match() {
    let rules = match parse::boolean_service_rules(
        "ignored_services",
        &raw(r#"[["@negate", ["@all"], ["fs_/var/log"]], [["@all"], ["fs_/var"]]]"#),
    ) {
        Ok(rules) => rules,
        Err(e) => panic!("rules should parse: {e}"),
    };
    let none = tags(&[]);
    let srv1 = host("srv1", &none);
    assert!(in_boolean_serviceconf_list(&srv1, "fs_/var/spool", &rules));
    assert!(!in_boolean_serviceconf_list(&srv1, "fs_/var/log", &rules));
    assert!(!in_boolean_serviceconf_list(&srv1, "CPU load", &rules));
}

#[test]
fn dependencies_take_the_last_capture_group() {
    let rules = match parse::dependency_rules(
        "service_dependencies",
        &raw(r#"[["NFS mount %s", ["@all"], ["fs_(/mnt/.*)"]], ["Uptime", ["srv2"], ["CPU"]]]"#),
    ) {
        Ok(rules) => rules,
        Err(e) => panic!("rules should parse: {e}"),
    };
    let none = tags(&[]);
    assert_eq!(
        service_deps(&host("srv1", &none), "fs_/mnt/data", &rules),
        vec!["NFS mount /mnt/data"]
    );
    assert!(service_deps(&host("srv1", &none), "CPU load", &rules).is_empty());
    assert_eq!(service_deps(&host("srv2", &none), "CPU load", &rules), vec!["Uptime"]);
}

#[test]
fn malformed_rules_name_the_list() {
    match parse::host_rules::<String>("host_groups", &raw(r#"[["a", ["b"], ["c"], ["d"]]]"#)) {
        Err(e @ RuleError::Shape { .. }) => assert!(e.to_string().contains("in host_groups")),
        other => panic!("expected a shape error, got {other:?}"),
    }
    assert!(matches!(
        parse::service_rules::<String>("service_groups", &raw(r#"[["g", ["@all"], ["("]]]"#)),
        Err(RuleError::Regex { .. })
    ));
    assert!(matches!(
        parse::host_rules::<String>("host_groups", &raw(r#"[["g", [""]]]"#)),
        Err(RuleError::EmptyHostList(_))
    ));
}
