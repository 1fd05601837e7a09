//! `define service` blocks: passive checks, aggregated services, the active
//! `Check_MK` service, legacy checks and the PING fallback.

use std::collections::{BTreeSet, HashMap};

use crate::engine::EngineError;
use crate::literal::Item;

use super::{extra_conf, url_quote, Renderer};

impl Renderer<'_> {
    pub(super) fn servicedefs(&mut self, host: &str) -> Result<(), EngineError> {
        let engine = self.engine;
        let settings = &engine.config().settings;
        let table = engine.check_table(host)?;
        let aggregated = engine.host_is_aggregated(host);

        // description -> (check type, item literal) of the service that claimed it
        let mut used: HashMap<&str, (String, String)> = HashMap::new();
        let mut aggregated_services: BTreeSet<String> = BTreeSet::new();
        let mut have_service = false;

        for ((check_type, item), spec) in table.iter() {
            let description = spec.description.as_str();
            if let Some((first_type, first_item)) = used.get(description) {
                return Err(EngineError::DuplicateDescription {
                    host: host.to_owned(),
                    description: description.to_owned(),
                    first_check_type: first_type.clone(),
                    first_item: first_item.clone(),
                    second_check_type: check_type.clone(),
                    second_item: item.to_string(),
                });
            }
            used.insert(description, (check_type.clone(), item.to_string()));

            let template = if engine.plugin(check_type)?.has_perfdata {
                &settings.passive_service_template_perf
            } else {
                &settings.passive_service_template
            };

            let notes_url = if check_type == "logwatch" {
                let file = match item {
                    Item::Str(s) => s.clone(),
                    other => other.to_string(),
                };
                let url = settings
                    .logwatch_notes_url
                    .replacen("%s", &url_quote(host), 1)
                    .replacen("%s", &url_quote(&file), 1);
                format!("  notes_url\t\t\t{url}\n")
            } else {
                String::new()
            };

            for dep in &spec.deps {
                self.out.push_str(&format!(
                    "define servicedependency {{\n    use\t\t\t\t{}\n    host_name\t\t\t{host}\n    service_description\t{dep}\n    dependent_host_name\t{host}\n    dependent_service_description {description}\n}}\n\n",
                    settings.service_dependency_template
                ));
            }

            if aggregated {
                if let Some(name) = engine.aggregated_service_name(host, description) {
                    aggregated_services.insert(name);
                }
            }

            let extra = self.extra_service_conf(host, description);
            self.out.push_str(&format!(
                "define service {{\n  use\t\t\t\t{template}\n  host_name\t\t\t{host}\n  service_description\t\t{description}\n{notes_url}{extra}  check_command\t\t\tcheck_mk-{check_type}\n}}\n\n"
            ));
            self.checknames.insert(check_type.clone());
            have_service = true;
        }

        if aggregated {
            self.aggregated_services(host, have_service, aggregated_services);
        }

        if have_service {
            let extra = self.extra_service_conf(host, "Check_MK");
            self.out.push_str(&format!(
                "\n# Active checks\n\ndefine service {{\n  use\t\t\t\t{}\n  host_name\t\t\t{host}\n{extra}  service_description\t\tCheck_MK\n}}\n",
                settings.active_service_template
            ));
            if let Some(interval) = settings.inventory_check_interval {
                if !engine.topology().is_cluster(host) {
                    let extra = self.extra_service_conf(host, "Check_MK inventory");
                    self.out.push_str(&format!(
                        "\ndefine service {{\n  use\t\t\t\t{}\n  host_name\t\t\t{host}\n  normal_check_interval\t\t{interval}\n{extra}  service_description\t\tCheck_MK inventory\n}}\n\ndefine servicedependency {{\n  use\t\t\t\t{}\n  host_name\t\t\t{host}\n  service_description\t\tCheck_MK\n  dependent_host_name\t\t{host}\n  dependent_service_description\tCheck_MK inventory\n}}\n",
                        settings.inventory_check_template, settings.service_dependency_template
                    ));
                }
            }
        }

        let legacy = engine.legacy_checks_of(host);
        if !legacy.is_empty() {
            self.out.push_str("\n\n# Legacy checks\n");
        }
        for check in legacy.iter().copied() {
            let description = check.description.as_str();
            if let Some((first_type, first_item)) = used.get(description) {
                return Err(EngineError::DuplicateLegacyDescription {
                    host: host.to_owned(),
                    description: description.to_owned(),
                    first_check_type: first_type.clone(),
                    first_item: first_item.clone(),
                    command: check.command.clone(),
                });
            }
            used.insert(
                description,
                (format!("legacy({})", check.command), Item::None.to_string()),
            );

            let extra = self.extra_service_conf(host, description);
            let perf = if check.has_perfdata { "check_mk_perf," } else { "" };
            self.out.push_str(&format!(
                "\ndefine service {{\n  use\t\t\t\t{perf}check_mk_default\n  host_name\t\t\t{host}\n  service_description\t\t{description}\n  check_command\t\t\t{}\n  active_checks_enabled\t\t1\n{extra}}}\n",
                check.command
            ));
        }

        if !have_service && legacy.is_empty() {
            let extra = self.extra_service_conf(host, "PING");
            self.out.push_str(&format!(
                "\ndefine service {{\n  use\t\t\t\t{}\n{extra}  host_name\t\t\t{host}\n}}\n\n",
                settings.pingonly_template
            ));
        }
        Ok(())
    }

    /// Services of the summary host.
    fn aggregated_services(&mut self, host: &str, have_service: bool, mut names: BTreeSet<String>) {
        let engine = self.engine;
        let settings = &engine.config().settings;
        let summary = engine.summary_hostname(host);

        self.out.push_str("\n# Aggregated services\n\n");
        if settings.aggregate_check_mk && have_service {
            names.insert("Check_MK".to_owned());
        } else if !have_service {
            // A ping-only host gets its own ping on the summary host.
            let extra = self.extra_service_conf(host, "PING");
            self.out.push_str(&format!(
                "\ndefine service {{\n  use\t\t\t\t{}\n{extra}  host_name\t\t\t{summary}\n}}\n\n",
                settings.pingonly_template
            ));
        }

        for description in &names {
            let groups = engine.summary_service_groups_of(host, description);
            let groups_line = if groups.is_empty() {
                String::new()
            } else {
                format!("  service_groups\t\t\t+{}\n", groups.join(","))
            };
            if settings.define_servicegroups.enabled() {
                self.servicegroups.extend(groups);
            }

            let contacts = engine.summary_service_contactgroups_of(host, description);
            let contacts_line = if contacts.is_empty() {
                String::new()
            } else {
                format!("  contact_groups\t\t\t+{}\n", contacts.join(","))
            };
            self.contactgroups.extend(contacts);

            let extra = extra_conf(&engine.extra_summary_service_conf_of(host, description));
            self.out.push_str(&format!(
                "define service {{\n  use\t\t\t\t{}\n  host_name\t\t\t{summary}\n{groups_line}{contacts_line}{extra}  service_description\t\t{description}\n}}\n\n",
                settings.summary_service_template
            ));
        }
    }
}
