//! Agent output parsing.
//!
//! Agent output is a sequence of sections introduced by `<<<name>>>`
//! headers. A header may carry a field separator as `<<<name:sep(9)>>>`,
//! given as a character code; otherwise lines are split on whitespace.

use std::collections::BTreeMap;

/// Lines of every section, split into fields. Repeated sections are
/// concatenated.
pub type AgentSections = BTreeMap<String, Vec<Vec<String>>>;

/// Parse agent output. Lines before the first header and empty lines are
/// dropped.
pub fn parse_agent_output(output: &str) -> AgentSections {
    let mut sections = AgentSections::new();
    let mut current: Option<(String, Option<char>)> = None;

    for raw in output.lines() {
        let line = raw.trim();
        if let Some(header) = line
            .strip_prefix("<<<")
            .and_then(|rest| rest.strip_suffix(">>>"))
        {
            let (name, separator) = parse_header(header);
            sections.entry(name.clone()).or_default();
            current = Some((name, separator));
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let Some((name, separator)) = &current else {
            continue;
        };
        let fields: Vec<String> = match separator {
            Some(sep) => raw
                .trim_end_matches(['\r', '\n'])
                .split(*sep)
                .map(str::to_owned)
                .collect(),
            None => line.split_whitespace().map(str::to_owned).collect(),
        };
        sections.entry(name.clone()).or_default().push(fields);
    }
    sections
}

fn parse_header(header: &str) -> (String, Option<char>) {
    let mut parts = header.split(':');
    let name = parts.next().unwrap_or_default().to_owned();
    let separator = parts.find_map(|option| {
        option
            .strip_prefix("sep(")
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|code| code.parse::<u32>().ok())
            .and_then(char::from_u32)
    });
    (name, separator)
}
