//! Coverage for objects file generation, validation and rollback.

use std::path::Path;

use cmkbase::activation::{self, ActivationError, CoreAction};
use cmkbase::engine::Engine;

use crate::common::engine_in;

fn tempdir() -> tempfile::TempDir {
    match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temp dir: {e}"),
    }
}

/// Ping-only site whose core is played by `validator` and `startscript`.
fn site(root: &Path, validator: &str, startscript: &str) -> Engine {
    let modules = root.join("modules");
    if let Err(e) = std::fs::create_dir_all(&modules) {
        panic!("cannot create modules dir: {e}");
    }
    if let Err(e) = std::fs::write(modules.join("check_mk_base.py"), "import sys\n") {
        panic!("cannot write base module: {e}");
    }
    let text = format!(
        r#"
all_hosts = ["ups1|ping"]

[ipaddresses]
ups1 = "10.0.0.99"

[paths]
modules_dir = "{modules}"
nagios_binary = "{validator}"
nagios_startscript = "{startscript}"
"#,
        modules = modules.display(),
    );
    engine_in(&root.join("var"), &text)
}

fn read(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => panic!("cannot read {}: {e}", path.display()),
    }
}

#[test]
fn create_config_writes_objects_file() {
    let root = tempdir();
    let engine = site(root.path(), "true", "true");
    let path = match activation::create_config(&engine) {
        Ok(path) => path,
        Err(e) => panic!("objects file should be written: {e}"),
    };
    assert_eq!(path, root.path().join("var/check_mk_objects.cfg"));
    assert!(read(&path).contains("  host_name\t\t\tups1\n"));
}

#[test]
fn update_precompiles_hosts() {
    let root = tempdir();
    let engine = site(root.path(), "true", "true");
    assert!(activation::update(&engine).is_ok());
    assert!(root.path().join("var/precompiled/ups1").exists());
}

#[tokio::test]
async fn valid_configuration_replaces_backup() {
    let root = tempdir();
    let engine = site(root.path(), "true", "true");
    let objects = engine.config().paths.nagios_objects_file();
    if let Err(e) = std::fs::create_dir_all(root.path().join("var")) {
        panic!("cannot create var dir: {e}");
    }
    if let Err(e) = std::fs::write(&objects, "# previous\n") {
        panic!("cannot write objects file: {e}");
    }

    let result = activation::activate(&engine, CoreAction::Reload).await;
    assert!(result.is_ok(), "activation failed: {result:?}");
    assert!(read(&objects).contains("ups1"));
    assert!(!activation::backup_path(&objects).exists());
}

#[tokio::test]
async fn invalid_configuration_is_rolled_back() {
    let root = tempdir();
    let engine = site(root.path(), "false", "true");
    let objects = engine.config().paths.nagios_objects_file();
    if let Err(e) = std::fs::create_dir_all(root.path().join("var")) {
        panic!("cannot create var dir: {e}");
    }
    if let Err(e) = std::fs::write(&objects, "# previous\n") {
        panic!("cannot write objects file: {e}");
    }

    let result = activation::activate(&engine, CoreAction::Restart).await;
    assert!(matches!(result, Err(ActivationError::InvalidConfig { .. })));
    assert_eq!(read(&objects), "# previous\n");
    assert!(!activation::backup_path(&objects).exists());
    assert!(!root.path().join("var/precompiled/ups1").exists());
}

#[tokio::test]
async fn invalid_first_configuration_is_removed() {
    let root = tempdir();
    let engine = site(root.path(), "false", "true");
    let result = activation::activate(&engine, CoreAction::Restart).await;
    assert!(matches!(result, Err(ActivationError::InvalidConfig { .. })));
    assert!(!engine.config().paths.nagios_objects_file().exists());
}

#[tokio::test]
async fn failing_startscript_is_reported() {
    let root = tempdir();
    let engine = site(root.path(), "true", "false");
    match activation::activate(&engine, CoreAction::Restart).await {
        Err(e @ ActivationError::Core { .. }) => assert_eq!(e.to_string(), "Cannot restart Nagios"),
        other => panic!("expected a core failure, got {other:?}"),
    }
}
