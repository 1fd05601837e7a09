//! Nagios object configuration.
//!
//! [`render`] writes `define host`, `define service`, dependency, group
//! and command blocks for a set of hosts. Group and command names are
//! collected while hosts are written and defined once at the end. The
//! collection starts empty on every call, so rendering is deterministic.

mod hostdefs;
mod servicedefs;

use std::collections::BTreeSet;

use crate::engine::{Engine, EngineError};
use crate::literal::Value;

const SEPARATOR: &str = "# ------------------------------------------------------------\n";

/// Render the configuration of every active host and cluster.
pub fn render(engine: &Engine) -> Result<String, EngineError> {
    render_hosts(engine, &engine.active_hosts_and_clusters())
}

/// Render the configuration of the given hosts.
pub fn render_hosts(engine: &Engine, hosts: &[String]) -> Result<String, EngineError> {
    let mut renderer = Renderer::new(engine);
    renderer.out.push_str("#\n# Created by Check_MK. Do not edit.\n#\n\n");
    for host in hosts {
        renderer.host(host)?;
    }
    renderer.hostgroups();
    renderer.servicegroups();
    renderer.contactgroups();
    renderer.commands();

    let extra = &engine.config().settings.extra_nagios_conf;
    if !extra.is_empty() {
        renderer.out.push_str("\n# extra_nagios_conf\n\n");
        renderer.out.push_str(extra);
    }
    tracing::debug!(hosts = hosts.len(), bytes = renderer.out.len(), "rendered nagios configuration");
    Ok(renderer.out)
}

/// Output buffer plus the names that still need a definition.
struct Renderer<'e> {
    engine: &'e Engine,
    out: String,
    hostgroups: BTreeSet<String>,
    servicegroups: BTreeSet<String>,
    contactgroups: BTreeSet<String>,
    checknames: BTreeSet<String>,
}

impl<'e> Renderer<'e> {
    fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            out: String::new(),
            hostgroups: BTreeSet::new(),
            servicegroups: BTreeSet::new(),
            contactgroups: BTreeSet::new(),
            checknames: BTreeSet::new(),
        }
    }

    fn host(&mut self, host: &str) -> Result<(), EngineError> {
        self.out.push_str(&format!(
            "\n# ----------------------------------------------------\n# {host}\n# ----------------------------------------------------\n"
        ));
        if self.engine.config().settings.generate_hostconf {
            self.hostdefs(host)?;
        }
        self.servicedefs(host)
    }

    /// Service level contact groups, service groups and
    /// `extra_service_conf` of a service.
    fn extra_service_conf(&mut self, host: &str, description: &str) -> String {
        let engine = self.engine;
        let mut conf = String::new();

        let contactgroups = engine.service_contactgroups_of(host, description);
        if !contactgroups.is_empty() {
            conf.push_str(&format!("  contact_groups\t\t+{}\n", contactgroups.join(",")));
        }
        self.contactgroups.extend(contactgroups);

        let servicegroups = engine.service_groups_of(host, description);
        if !servicegroups.is_empty() {
            conf.push_str(&format!("  service_groups\t\t+{}\n", servicegroups.join(",")));
            if engine.config().settings.define_servicegroups.enabled() {
                self.servicegroups.extend(servicegroups);
            }
        }
        conf.push_str(&extra_conf(&engine.extra_service_conf_of(host, description)));
        conf
    }

    fn hostgroups(&mut self) {
        let engine = self.engine;
        let settings = &engine.config().settings;
        if settings.define_hostgroups.enabled() {
            self.out.push('\n');
            self.out.push_str(SEPARATOR);
            self.out.push_str("# Host groups (controlled by define_hostgroups)\n");
            self.out.push_str(SEPARATOR);
            for group in &self.hostgroups {
                self.out.push_str(&format!(
                    "\ndefine hostgroup {{\n  hostgroup_name\t\t{group}\n  alias\t\t\t\t{}\n}}\n",
                    settings.define_hostgroups.alias(group)
                ));
            }
        } else if self.hostgroups.contains(&settings.default_host_group) {
            self.out.push_str(&format!(
                "\ndefine hostgroup {{\n  hostgroup_name\t\t{}\n  alias\t\t\t\tCheck_MK default hostgroup\n}}\n",
                settings.default_host_group
            ));
        }
    }

    fn servicegroups(&mut self) {
        let engine = self.engine;
        let definitions = &engine.config().settings.define_servicegroups;
        if !definitions.enabled() {
            return;
        }
        self.out.push('\n');
        self.out.push_str(SEPARATOR);
        self.out.push_str("# Service groups (controlled by define_servicegroups)\n");
        self.out.push_str(SEPARATOR);
        for group in &self.servicegroups {
            self.out.push_str(&format!(
                "\ndefine servicegroup {{\n  servicegroup_name\t\t{group}\n  alias\t\t\t\t{}\n}}\n",
                definitions.alias(group)
            ));
        }
    }

    fn contactgroups(&mut self) {
        let engine = self.engine;
        let definitions = &engine.config().settings.define_contactgroups;
        if !definitions.enabled() {
            return;
        }
        self.out.push('\n');
        self.out.push_str(SEPARATOR);
        self.out.push_str("# Contact groups (controlled by define_contactgroups)\n");
        self.out.push_str(SEPARATOR);
        self.out.push('\n');
        for group in &self.contactgroups {
            self.out.push_str(&format!(
                "\ndefine contactgroup {{\n  contactgroup_name\t\t{group}\n  alias\t\t\t\t{}\n}}\n",
                definitions.alias(group)
            ));
        }
    }

    fn commands(&mut self) {
        let engine = self.engine;
        let settings = &engine.config().settings;
        if !settings.generate_dummy_commands {
            return;
        }
        self.out.push('\n');
        self.out.push_str(SEPARATOR);
        self.out.push_str("# Dummy check commands (controlled by generate_dummy_commands)\n");
        self.out.push_str(SEPARATOR);
        self.out.push('\n');
        for check_type in &self.checknames {
            self.out.push_str(&format!(
                "define command {{\n  command_name\t\t\tcheck_mk-{check_type}\n  command_line\t\t\t{}\n}}\n\n",
                settings.dummy_check_commandline
            ));
        }
    }
}

/// `  key                           value` lines of extra configuration.
fn extra_conf(entries: &[(&str, &Value)]) -> String {
    entries
        .iter()
        .map(|(key, value)| format!("  {key:<29} {}\n", plain(value)))
        .collect()
}

/// A value as plain text: strings without quotes, everything else as a
/// literal.
fn plain(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Percent-encode everything but ASCII letters, digits, `_.-` and `/`.
fn url_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-' | b'/') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
