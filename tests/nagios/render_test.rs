//! Coverage for the Nagios object renderer.

use cmkbase::engine::EngineError;
use cmkbase::nagios;

use crate::common::engine;

const SITE: &str = r##"
all_hosts = ["srv1|linux", "node1|linux", "node2|linux", "ups1|ping"]
checks = [
    ["srv1", "df", "/var/log", [80, 90]],
    ["srv1", "cpu.loads", [], [5.0, 10.0]],
    ["srv1", "logwatch", "/var/log/messages", []],
]
host_groups = [["linux", ["linux"], ["@all"]]]
host_contactgroups = [["admins", ["@all"]]]
service_groups = [["filesystems", ["@all"], ["fs_"]]]
parents = [["srv1", ["ups1"]]]
legacy_checks = [[["check_http!80", "HTTP", true], ["srv1"]]]
define_hostgroups = true
define_servicegroups = true
define_contactgroups = true
extra_nagios_conf = "# custom tail\n"

[clusters]
"db.invalid" = ["node1", "node2"]

[ipaddresses]
srv1 = "10.0.0.1"
node1 = "10.0.0.11"
node2 = "10.0.0.12"
ups1 = "10.0.0.99"

[extra_host_conf]
notification_period = [["24x7", ["srv1"]]]
"##;

fn render(text: &str) -> String {
    match nagios::render(&engine(text)) {
        Ok(out) => out,
        Err(e) => panic!("configuration should render: {e}"),
    }
}

#[test]
fn output_starts_with_header() {
    assert!(render(SITE).starts_with("#\n# Created by Check_MK. Do not edit.\n#\n\n"));
}

#[test]
fn host_block_carries_address_tags_and_groups() {
    let out = render(SITE);
    assert!(out.contains(
        "define host {\n  host_name\t\t\tsrv1\n  use\t\t\t\tcheck_mk_host\n  address\t\t\t10.0.0.1\n  _TAGS\t\t\t\tlinux\n  host_groups\t\t\t+linux\n  contact_groups\t\t+admins\n"
    ));
    assert!(out.contains("  alias\t\t\t\tsrv1\n  notification_period           24x7\n}\n"));
    assert!(out.contains("  host_name\t\t\tups1\n"));
    assert!(out.contains("  parents\t\t\tsrv1\n"));
}

#[test]
fn hosts_without_groups_join_the_default_group() {
    let out = render(SITE);
    assert!(out.contains("  _TAGS\t\t\t\tping\n  host_groups\t\t\t+check_mk\n"));
}

#[test]
fn passive_services_use_perf_template_when_plugin_has_perfdata() {
    let out = render(SITE);
    assert!(out.contains(
        "define service {\n  use\t\t\t\tcheck_mk_passive_perf\n  host_name\t\t\tsrv1\n  service_description\t\tfs_/var/log\n  service_groups\t\t+filesystems\n  check_command\t\t\tcheck_mk-df\n}\n"
    ));
    assert!(out.contains("  service_description\t\tCPU load\n"));
}

#[test]
fn logwatch_services_link_to_the_viewer() {
    let out = render(SITE);
    assert!(out.contains(
        "  notes_url\t\t\t/nagios/logwatch.php?host=srv1&file=/var/log/messages\n"
    ));
}

#[test]
fn active_legacy_and_ping_services() {
    let out = render(SITE);
    assert!(out.contains("  host_name\t\t\tsrv1\n  service_description\t\tCheck_MK\n"));
    assert!(out.contains(
        "  use\t\t\t\tcheck_mk_perf,check_mk_default\n  host_name\t\t\tsrv1\n  service_description\t\tHTTP\n  check_command\t\t\tcheck_http!80\n  active_checks_enabled\t\t1\n"
    ));
    assert!(out.contains("define service {\n  use\t\t\t\tcheck_mk_pingonly\n  host_name\t\t\tups1\n}\n"));
}

#[test]
fn clusters_list_nodes_as_parents() {
    let out = render(SITE);
    assert!(out.contains("  host_name\t\t\tdb.invalid\n  use\t\t\t\tcheck_mk_cluster\n  address\t\t\t0.0.0.0\n"));
    assert!(out.contains("  _NODEIPS\t\t\t10.0.0.11 10.0.0.12\n  parents\t\t\tnode1,node2\n"));
    assert!(out.contains("  alias\t\t\t\tcluster of node1, node2\n"));
}

#[test]
fn groups_and_commands_are_defined_once() {
    let out = render(SITE);
    assert_eq!(out.matches("hostgroup_name\t\tlinux\n").count(), 1);
    assert_eq!(out.matches("servicegroup_name\t\tfilesystems\n").count(), 1);
    assert_eq!(out.matches("contactgroup_name\t\tadmins\n").count(), 1);
    assert_eq!(out.matches("command_name\t\t\tcheck_mk-df\n").count(), 1);
    assert!(out.contains("command_name\t\t\tcheck_mk-logwatch\n"));
    assert!(out.ends_with("# extra_nagios_conf\n\n# custom tail\n"));
}

#[test]
fn rendering_is_deterministic() {
    assert_eq!(render(SITE), render(SITE));
}

#[test]
fn summary_hosts_receive_aggregated_services() {
    let text = r#"
all_hosts = ["srv1"]
checks = [
    ["srv1", "df", "/", [80, 90]],
    ["srv1", "df", "/var", [80, 90]],
]
service_aggregations = [["Filesystems", ["@all"], "^fs_"]]

[ipaddresses]
srv1 = "10.0.0.1"
"#;
    let out = render(text);
    assert!(out.contains("  host_name\t\t\tsrv1-s\n  use\t\t\t\tcheck_mk_host-summary\n"));
    assert!(out.contains("  __REALNAME\t\t\tsrv1\n  parents\t\t\tsrv1\n"));
    assert_eq!(
        out.matches("  host_name\t\t\tsrv1-s\n  service_description\t\tFilesystems\n").count(),
        1
    );
}

#[test]
fn dependencies_render_before_the_service() {
    let text = r#"
all_hosts = ["srv1"]
checks = [
    ["srv1", "df", "/", [80, 90]],
    ["srv1", "uptime", [], []],
]
service_dependencies = [["Uptime", ["srv1"], ["^fs_"]]]

[ipaddresses]
srv1 = "10.0.0.1"
"#;
    let out = render(text);
    assert!(out.contains(
        "define servicedependency {\n    use\t\t\t\tcheck_mk\n    host_name\t\t\tsrv1\n    service_description\tUptime\n    dependent_host_name\tsrv1\n    dependent_service_description fs_/\n}\n"
    ));
}

#[test]
fn duplicate_descriptions_abort_rendering() {
    let text = r#"
all_hosts = ["srv1"]
checks = [
    ["srv1", "uptime", [], []],
    ["srv1", "snmp_uptime", [], []],
]

[ipaddresses]
srv1 = "10.0.0.1"
"#;
    match nagios::render(&engine(text)) {
        Err(EngineError::DuplicateDescription { host, description, .. }) => {
            assert_eq!(host, "srv1");
            assert_eq!(description, "Uptime");
        }
        other => panic!("expected duplicate description, got {other:?}"),
    }
}

#[test]
fn host_without_address_is_an_error() {
    let text = "all_hosts = [\"nowhere.invalid\"]\n";
    assert!(matches!(
        nagios::render(&engine(text)),
        Err(EngineError::NoIpAddress(host)) if host == "nowhere.invalid"
    ));
}

#[test]
fn selected_hosts_only() {
    let out = match nagios::render_hosts(&engine(SITE), &["ups1".to_owned()]) {
        Ok(out) => out,
        Err(e) => panic!("configuration should render: {e}"),
    };
    assert!(out.contains("  host_name\t\t\tups1\n"));
    assert!(!out.contains("  host_name\t\t\tsrv1\n"));
}

#[test]
fn clashing_legacy_checks_name_the_first_command() {
    let text = r#"
all_hosts = ["srv1"]
legacy_checks = [
    [["check_http!80", "Web", true], ["srv1"]],
    [["check_https!443", "Web", false], ["srv1"]],
]

[ipaddresses]
srv1 = "10.0.0.1"
"#;
    match nagios::render(&engine(text)) {
        Err(EngineError::DuplicateLegacyDescription {
            first_check_type,
            first_item,
            command,
            ..
        }) => {
            assert_eq!(first_check_type, "legacy(check_http!80)");
            assert_eq!(first_item, "None");
            assert_eq!(command, "check_https!443");
        }
        other => panic!("expected a legacy duplicate, got {other:?}"),
    }
}
