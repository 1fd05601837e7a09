//! Coverage for rejected configuration documents.

use cmkbase::catalog::CheckCatalog;
use cmkbase::config::{Config, ConfigError};
use cmkbase::literal::Value;

fn parse(text: &str) -> Result<Config, ConfigError> {
    Config::from_toml(text, &CheckCatalog::builtin())
}

#[test]
fn unknown_variables_are_listed() {
    match parse("all_hosts = []\nall_hostz = []\nfoo = 1\n") {
        Err(ConfigError::UnknownVariables(names)) => {
            assert_eq!(names, vec!["all_hostz".to_owned(), "foo".to_owned()]);
        }
        other => panic!("expected unknown variables, got {other:?}"),
    }
}

#[test]
fn removed_variables_name_their_replacement() {
    let err = match parse("host_notification_periods = [[\"24x7\", [\"@all\"]]]\n") {
        Err(e) => e,
        Ok(_) => panic!("removed variable should be rejected"),
    };
    assert!(matches!(err, ConfigError::RemovedVariable { .. }));
    assert_eq!(
        err.to_string(),
        "host_notification_periods is not longer supported. Please use extra_host_conf['notification_period'] instead."
    );
}

#[test]
fn empty_removed_variables_are_tolerated() {
    assert!(parse("host_notification_periods = []\n").is_ok());
}

#[test]
fn duplicate_hosts_are_rejected() {
    assert!(matches!(
        parse("all_hosts = [\"srv1|linux\", \"srv1\"]\n"),
        Err(ConfigError::DuplicateHost(host)) if host == "srv1"
    ));
    let clash = "all_hosts = [\"db\"]\n\n[clusters]\n\"db|prod\" = [\"node1\"]\n";
    assert!(matches!(parse(clash), Err(ConfigError::DuplicateHost(host)) if host == "db"));
}

#[test]
fn snmp_communities_must_be_rules() {
    assert!(matches!(
        parse("[snmp_communities]\nsw1 = \"secret\"\n"),
        Err(ConfigError::SnmpCommunitiesDict)
    ));
}

#[test]
fn check_variables_must_be_declared() {
    assert!(matches!(
        parse("[variables]\nno_such_levels = [1, 2]\n"),
        Err(ConfigError::UnknownCheckVariable(name)) if name == "no_such_levels"
    ));

    let config = match parse("[variables]\nfilesystem_default_levels = [85, 95]\n") {
        Ok(config) => config,
        Err(e) => panic!("declared variable should load: {e}"),
    };
    assert_eq!(
        config.variables.get("filesystem_default_levels"),
        Some(&Value::Tuple(vec![Value::Int(85), Value::Int(95)]))
    );
}

#[test]
fn wrongly_typed_settings_are_invalid() {
    assert!(matches!(parse("agent_port = \"x\"\n"), Err(ConfigError::Invalid(_))));
}

#[test]
fn malformed_rules_are_reported() {
    assert!(matches!(
        parse("host_groups = [[\"linux\"]]\n"),
        Err(ConfigError::Rule(_))
    ));
}
