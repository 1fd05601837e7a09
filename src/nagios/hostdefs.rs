//! `define host` blocks for hosts, clusters and summary hosts.

use crate::engine::EngineError;

use super::{extra_conf, Renderer};

impl Renderer<'_> {
    pub(super) fn hostdefs(&mut self, host: &str) -> Result<(), EngineError> {
        let engine = self.engine;
        let settings = &engine.config().settings;
        let topology = engine.topology();
        let is_cluster = topology.is_cluster(host);

        let ip = engine.lookup_ipaddress(host);
        if ip.is_none() && !is_cluster {
            return Err(EngineError::NoIpAddress(host.to_owned()));
        }
        let address = ip.as_deref().unwrap_or("0.0.0.0");
        let template = if is_cluster {
            &settings.cluster_template
        } else {
            &settings.host_template
        };
        let tags = topology.tags_of(host).join(" ");

        let mut alias = host.to_owned();
        self.out.push_str("\ndefine host {\n");
        self.out.push_str(&format!("  host_name\t\t\t{host}\n"));
        self.out.push_str(&format!("  use\t\t\t\t{template}\n"));
        self.out.push_str(&format!("  address\t\t\t{address}\n"));
        self.out.push_str(&format!("  _TAGS\t\t\t\t{tags}\n"));

        // Nagios requires every host to be in at least one group.
        let groups = self.host_groups(engine.hostgroups_of(host));
        self.out.push_str(&format!("  host_groups\t\t\t+{groups}\n"));

        let contactgroups = engine.host_contactgroups_of(&[host]);
        if !contactgroups.is_empty() {
            self.out
                .push_str(&format!("  contact_groups\t\t+{}\n", contactgroups.join(",")));
            self.contactgroups.extend(contactgroups.iter().cloned());
        }

        let mut node_ips = Vec::new();
        if is_cluster {
            let nodes = topology.nodes_of(host);
            for node in nodes {
                if !topology.all_hosts().contains(node) {
                    return Err(EngineError::NodeNotInAllHosts {
                        node: node.clone(),
                        cluster: host.to_owned(),
                    });
                }
                node_ips.push(engine.require_ipaddress(node)?);
            }
            alias = format!("cluster of {}", nodes.join(", "));
            self.out
                .push_str(&format!("  _NODEIPS\t\t\t{}\n", node_ips.join(" ")));
            self.out.push_str(&format!("  parents\t\t\t{}\n", nodes.join(",")));
            if ip.is_some() {
                self.out.push_str("  check_command\t\t\tcheck-mk-ping\n");
            }
        } else {
            let parents = engine.parents_of(host);
            if !parents.is_empty() {
                self.out
                    .push_str(&format!("  parents\t\t\t{}\n", parents.join(",")));
            }
        }

        self.out.push_str(&format!("  alias\t\t\t\t{alias}\n"));
        // Custom configuration comes last so it overrides everything above.
        self.out.push_str(&extra_conf(&engine.extra_host_conf_of(host)));
        self.out.push_str("}\n");

        if engine.host_is_aggregated(host) {
            self.out.push_str("\ndefine host {\n");
            self.out.push_str(&format!(
                "  host_name\t\t\t{}\n",
                engine.summary_hostname(host)
            ));
            self.out.push_str(&format!("  use\t\t\t\t{template}-summary\n"));
            self.out.push_str(&format!("  alias\t\t\t\tSummary of {alias}\n"));
            self.out.push_str(&format!("  address\t\t\t{address}\n"));
            self.out.push_str(&format!("  _TAGS\t\t\t\t{tags}\n"));
            self.out.push_str(&format!("  __REALNAME\t\t\t{host}\n"));
            self.out.push_str(&format!("  parents\t\t\t{host}\n"));

            let groups = self.host_groups(engine.summary_hostgroups_of(host));
            self.out.push_str(&format!("  host_groups\t\t\t+{groups}\n"));

            if !contactgroups.is_empty() {
                self.out
                    .push_str(&format!("  contact_groups\t\t+{}\n", contactgroups.join(",")));
            }
            if is_cluster {
                self.out
                    .push_str(&format!("  _NODEIPS\t\t\t{}\n", node_ips.join(" ")));
            }
            self.out
                .push_str(&extra_conf(&engine.extra_summary_host_conf_of(host)));
            self.out.push_str("}\n");
        }
        self.out.push('\n');
        Ok(())
    }

    /// The `host_groups` value of a host: its groups, or the default group
    /// when it has none. Groups that need a definition are remembered.
    fn host_groups(&mut self, groups: Vec<String>) -> String {
        let engine = self.engine;
        let settings = &engine.config().settings;
        if groups.is_empty() {
            self.hostgroups.insert(settings.default_host_group.clone());
            return settings.default_host_group.clone();
        }
        let joined = groups.join(",");
        if settings.define_hostgroups.enabled() {
            self.hostgroups.extend(groups);
        }
        joined
    }
}
