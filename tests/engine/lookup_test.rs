//! Coverage for host classification and extra configuration lookups.

use crate::common::engine;

const TOPOLOGY: &str = r#"
all_hosts = ["node1|linux|prod", "node2|linux|prod", "web1|linux", "sw1|snmp", "ups1|ping", "old1|linux"]
only_hosts = [["@negate", ["old1"]], [["@all"]]]
host_groups = [
    ["linux", ["linux"], ["@all"]],
    ["production", ["prod"], ["@all"]],
    { value = "network", hosts = ["sw1"] },
]
host_contactgroups = [["admins", ["@all"]], ["dbas", ["prod"], ["@all"]]]
parents = [["sw1", ["web1"]], ["sw1,unknown", ["node1"]]]
service_groups = [["filesystems", ["@all"], ["fs_"]]]
service_contactgroups = [["storage", ["prod"], ["@all"], ["fs_/var"]]]
ignored_services = [[["web1"], ["fs_/tmp"]]]
ignored_checks = [[["kernel"], ["linux"], ["@all"]]]
ignored_checktypes = ["logwatch"]
clustered_services = [[["node1", "node2"], ["fs_/data"]]]
datasource_programs = [["/usr/bin/fetch <HOST> <IP>", ["web1"]]]
legacy_checks = [[["check_http!80", "HTTP", true], ["web1"]]]

[clusters]
"db|prod" = ["node1", "node2"]

[extra_host_conf]
notification_period = [["24x7", ["prod"], ["@all"]], ["workhours", ["@all"]]]

[extra_service_conf]
check_interval = [[5, ["@all"], ["CPU"]]]
"#;

#[test]
fn only_hosts_limits_active_hosts() {
    let engine = engine(TOPOLOGY);
    let active = engine.active_hosts_and_clusters();
    assert!(!active.contains(&"old1".to_owned()));
    assert_eq!(active.last().map(String::as_str), Some("db"));
    assert_eq!(engine.topology().all_hosts().len(), 6);
}

#[test]
fn transports_follow_tags() {
    let engine = engine(TOPOLOGY);
    assert!(engine.is_tcp_host("web1"));
    assert!(!engine.is_snmp_host("web1"));
    assert!(engine.is_snmp_host("sw1"));
    assert!(!engine.is_tcp_host("sw1"));
    assert!(engine.is_ping_host("ups1"));
}

#[test]
fn host_rules_collect_in_order() {
    let engine = engine(TOPOLOGY);
    assert_eq!(engine.hostgroups_of("node1"), vec!["linux", "production"]);
    assert_eq!(engine.hostgroups_of("sw1"), vec!["network"]);
    assert_eq!(engine.host_contactgroups_of(&["web1", "node1"]), vec!["admins", "dbas"]);
}

#[test]
fn parents_must_be_configured_hosts() {
    let engine = engine(TOPOLOGY);
    assert_eq!(engine.parents_of("web1"), vec!["sw1"]);
    assert_eq!(engine.parents_of("node1"), vec!["sw1"]);
    assert!(engine.parents_of("sw1").is_empty());
}

#[test]
fn service_rules_match_description_prefixes() {
    let engine = engine(TOPOLOGY);
    assert_eq!(engine.service_groups_of("web1", "fs_/var"), vec!["filesystems"]);
    assert!(engine.service_groups_of("web1", "CPU load").is_empty());
    assert_eq!(engine.service_contactgroups_of("node1", "fs_/var/log"), vec!["storage"]);
    assert!(engine.service_contactgroups_of("web1", "fs_/var").is_empty());
}

#[test]
fn ignored_services_and_check_types() {
    let engine = engine(TOPOLOGY);
    assert!(engine.service_ignored("web1", "fs_/tmp"));
    assert!(!engine.service_ignored("node1", "fs_/tmp"));
    assert!(engine.checktype_ignored_for_host("web1", "kernel"));
    assert!(engine.checktype_ignored_for_host("sw1", "logwatch"));
    assert!(!engine.checktype_ignored_for_host("sw1", "kernel"));
}

#[test]
fn clustered_services_move_to_the_cluster() {
    let engine = engine(TOPOLOGY);
    assert_eq!(engine.host_of_clustered_service("node1", "fs_/data"), "db");
    assert_eq!(engine.host_of_clustered_service("node1", "fs_/"), "node1");
    assert_eq!(engine.host_of_clustered_service("web1", "fs_/data"), "web1");
}

#[test]
fn datasource_program_substitutes_host_and_address() {
    let engine = engine(TOPOLOGY);
    assert_eq!(
        engine.datasource_program("web1", "10.1.1.1").as_deref(),
        Some("/usr/bin/fetch web1 10.1.1.1")
    );
    assert_eq!(engine.datasource_program("node1", "10.1.1.2"), None);
}

#[test]
fn legacy_checks_and_extra_conf() {
    let engine = engine(TOPOLOGY);
    let legacy = engine.legacy_checks_of("web1");
    assert_eq!(legacy.len(), 1);
    assert_eq!(legacy.first().map(|l| l.description.as_str()), Some("HTTP"));

    let node_conf: Vec<(String, String)> = engine
        .extra_host_conf_of("node1")
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_string()))
        .collect();
    assert_eq!(node_conf, vec![("notification_period".to_owned(), "'24x7'".to_owned())]);

    let service_conf = engine.extra_service_conf_of("web1", "CPU load");
    assert_eq!(service_conf.len(), 1);
}

#[test]
fn explicit_addresses_skip_resolution() {
    let engine = engine(
        r#"
all_hosts = ["srv1"]

[ipaddresses]
srv1 = "192.168.1.10"
"#,
    );
    assert_eq!(engine.lookup_ipaddress("srv1").as_deref(), Some("192.168.1.10"));
    assert_eq!(engine.require_ipaddress("srv1").ok().as_deref(), Some("192.168.1.10"));
}
