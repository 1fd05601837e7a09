//! Filesystem layout.
//!
//! Defaults follow the classic `/etc/check_mk` + `/var/lib/check_mk`
//! layout. Directories below `var_dir` are derived from it unless set
//! explicitly, so overriding `var_dir` alone moves all runtime state.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default configuration directory.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/check_mk";

/// Paths used by the compiler, discovery and housekeeping.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory holding `main.toml`, `conf.d/` and `final.toml`. Set by
    /// the loader, not by the file.
    #[serde(skip)]
    pub config_dir: PathBuf,
    /// Shipped check plugin sources.
    pub checks_dir: PathBuf,
    /// Shipped runtime modules (`check_mk_base.py`, `snmp.py`).
    pub modules_dir: PathBuf,
    /// Locally installed check plugins, preferred over `checks_dir`.
    pub local_checks_dir: Option<PathBuf>,
    /// Base directory for runtime state.
    pub var_dir: PathBuf,
    /// Autocheck files (default `<var_dir>/autochecks`).
    pub autochecks_dir: Option<PathBuf>,
    /// Stored SNMP walks (default `<var_dir>/snmpwalks`).
    pub snmpwalks_dir: Option<PathBuf>,
    /// Precompiled host checks (default `<var_dir>/precompiled`).
    pub precompiled_dir: Option<PathBuf>,
    /// Counter state files (default `<var_dir>/counters`).
    pub counters_dir: Option<PathBuf>,
    /// Cached agent output (default `<var_dir>/cache`).
    pub cache_dir: Option<PathBuf>,
    /// Unacknowledged logwatch messages (default `<var_dir>/logwatch`).
    pub logwatch_dir: Option<PathBuf>,
    /// Generated objects file (default `<var_dir>/check_mk_objects.cfg`).
    pub nagios_objects_file: Option<PathBuf>,
    /// External command pipe of the monitoring core.
    pub nagios_command_pipe: PathBuf,
    /// Init script used for restart and reload.
    pub nagios_startscript: PathBuf,
    /// Monitoring core binary, used for config validation.
    pub nagios_binary: PathBuf,
    /// Main configuration file of the monitoring core.
    pub nagios_config_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            checks_dir: PathBuf::from("/usr/share/check_mk/checks"),
            modules_dir: PathBuf::from("/usr/share/check_mk/modules"),
            local_checks_dir: None,
            var_dir: PathBuf::from("/var/lib/check_mk"),
            autochecks_dir: None,
            snmpwalks_dir: None,
            precompiled_dir: None,
            counters_dir: None,
            cache_dir: None,
            logwatch_dir: None,
            nagios_objects_file: None,
            nagios_command_pipe: PathBuf::from("/var/log/nagios/rw/nagios.cmd"),
            nagios_startscript: PathBuf::from("/etc/init.d/nagios"),
            nagios_binary: PathBuf::from("/usr/sbin/nagios"),
            nagios_config_file: PathBuf::from("/etc/nagios/nagios.cfg"),
        }
    }
}

impl PathsConfig {
    /// Resolve the configuration directory: `$CMK_CONFIG_DIR` or the
    /// default.
    pub fn config_dir_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("CMK_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR))
    }

    /// Apply environment variable overrides (env > file > defaults).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("CMK_VAR_DIR") {
            self.var_dir = PathBuf::from(v);
        }
        if let Some(v) = env("CMK_CHECKS_DIR") {
            self.checks_dir = PathBuf::from(v);
        }
        if let Some(v) = env("CMK_MODULES_DIR") {
            self.modules_dir = PathBuf::from(v);
        }
        if let Some(v) = env("CMK_LOCAL_CHECKS_DIR") {
            self.local_checks_dir = Some(PathBuf::from(v));
        }
        if self.local_checks_dir.is_none() {
            if let Some(root) = env("OMD_ROOT") {
                self.local_checks_dir = Some(Path::new(&root).join("local/share/check_mk/checks"));
            }
        }
    }

    fn under_var(&self, explicit: &Option<PathBuf>, name: &str) -> PathBuf {
        explicit.clone().unwrap_or_else(|| self.var_dir.join(name))
    }

    /// `conf.d` below the configuration directory.
    pub fn conf_d(&self) -> PathBuf {
        self.config_dir.join("conf.d")
    }

    /// Directory of autocheck files.
    pub fn autochecks_dir(&self) -> PathBuf {
        self.under_var(&self.autochecks_dir, "autochecks")
    }

    /// Directory of stored SNMP walks.
    pub fn snmpwalks_dir(&self) -> PathBuf {
        self.under_var(&self.snmpwalks_dir, "snmpwalks")
    }

    /// Directory of precompiled host checks.
    pub fn precompiled_dir(&self) -> PathBuf {
        self.under_var(&self.precompiled_dir, "precompiled")
    }

    /// Directory of counter files.
    pub fn counters_dir(&self) -> PathBuf {
        self.under_var(&self.counters_dir, "counters")
    }

    /// Directory of cached agent output.
    pub fn cache_dir(&self) -> PathBuf {
        self.under_var(&self.cache_dir, "cache")
    }

    /// Directory of logwatch messages.
    pub fn logwatch_dir(&self) -> PathBuf {
        self.under_var(&self.logwatch_dir, "logwatch")
    }

    /// Generated objects file.
    pub fn nagios_objects_file(&self) -> PathBuf {
        self.under_var(&self.nagios_objects_file, "check_mk_objects.cfg")
    }

    /// Locate the source file of a check plugin. Local plugins win.
    pub fn find_check_plugin(&self, file_name: &str) -> Option<PathBuf> {
        if let Some(local) = &self.local_checks_dir {
            let path = local.join(file_name);
            if path.exists() {
                return Some(path);
            }
        }
        let path = self.checks_dir.join(file_name);
        path.exists().then_some(path)
    }
}
