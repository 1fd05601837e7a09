//! Service aggregation onto summary hosts.

use crate::rules::resolver::{fill_from_group, fill_template};
use crate::rules::{hosttags_match_taglist, in_binary_hostlist};

use super::Engine;

impl Engine {
    /// Whether `host` has a summary host: some aggregation rule applies
    /// and the host is not listed in `non_aggregated_hosts`.
    pub fn host_is_aggregated(&self, host: &str) -> bool {
        let rules = &self.config.rules;
        if rules.service_aggregations.is_empty() {
            return false;
        }
        let facts = self.facts(host);
        if in_binary_hostlist(&facts, &rules.non_aggregated_hosts) {
            return false;
        }
        rules
            .service_aggregations
            .iter()
            .any(|r| hosttags_match_taglist(facts.tags, &r.tags) && r.hosts.matches(&facts))
    }

    /// Name of the aggregated service `description` belongs to, if any.
    /// The first applicable rule whose pattern is found in the description
    /// decides.
    pub fn aggregated_service_name(&self, host: &str, description: &str) -> Option<String> {
        let facts = self.facts(host);
        self.config
            .rules
            .service_aggregations
            .iter()
            .filter(|r| hosttags_match_taglist(facts.tags, &r.tags) && r.hosts.matches(&facts))
            .find_map(|r| {
                r.pattern
                    .search(description)
                    .map(|group| fill_from_group(&r.name, group.as_deref()))
            })
    }

    /// Name of the summary host of `host`.
    pub fn summary_hostname(&self, host: &str) -> String {
        let template = &self.config.settings.aggr_summary_hostname;
        fill_template(template, host).unwrap_or_else(|| template.clone())
    }
}
