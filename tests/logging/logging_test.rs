//! Coverage for log filter defaults and the debug log file.

use cmkbase::logging;

#[test]
fn verbose_switches_to_debug() {
    assert_eq!(logging::default_directive(true), "debug");
    assert_eq!(logging::default_directive(false), "info");
}

#[test]
fn debug_log_directory_is_created_and_installed_once() {
    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("cannot create temp dir: {e}"),
    };
    let path = dir.path().join("log/nested/cmk-debug.log");
    let guard = logging::init_with_debug_log(false, &path);
    assert!(guard.is_ok());
    assert!(dir.path().join("log/nested").is_dir());

    let again = logging::init_cli(false);
    assert!(again.is_err_and(|e| e.to_string().contains("failed to install log subscriber")));
}

#[test]
fn debug_log_needs_a_file_name() {
    let guard = logging::init_with_debug_log(false, std::path::Path::new("/"));
    assert!(guard.is_err());
}
