//! Persisted autochecks.
//!
//! The autochecks directory holds `*.mk` files, each a literal list of
//! `(host, check_type, item, params)` tuples, one tuple per line.
//! Parameters are kept as written: a bare variable reference such as
//! `filesystem_default_levels` stays a reference until a check table is
//! built. Rewrites work line by line so untouched entries keep their text.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::literal::{quote, Item, LiteralError, Value};

/// Errors reading or writing autochecks files.
#[derive(Debug, thiserror::Error)]
pub enum AutocheckError {
    /// Filesystem failure.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file is not a valid literal.
    #[error("syntax error in file {}: {source}", .path.display())]
    Syntax {
        /// Offending file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: LiteralError,
    },

    /// An entry is not a `(host, check_type, item, params)` tuple.
    #[error("error in file {}: invalid entry {entry}", .path.display())]
    Entry {
        /// Offending file.
        path: PathBuf,
        /// The entry as a literal.
        entry: String,
    },

    /// A line of a host file cannot be parsed.
    #[error("Invalid line {line} in autochecks file {}", .path.display())]
    Line {
        /// Offending file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AutocheckError + '_ {
    move |source| AutocheckError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One persisted autocheck.
#[derive(Debug, Clone, PartialEq)]
pub struct Autocheck {
    /// Untagged host name.
    pub host: String,
    /// Check type.
    pub check_type: String,
    /// Service item.
    pub item: Item,
    /// Parameters, possibly referring to check variables.
    pub params: Value,
    /// Parameters as they appear in the file.
    pub paramstring: String,
}

impl Autocheck {
    fn from_value(path: &Path, entry: &Value) -> Result<Self, AutocheckError> {
        let invalid = || AutocheckError::Entry {
            path: path.to_path_buf(),
            entry: entry.to_string(),
        };
        let [host, check_type, item, params] = entry.as_seq().ok_or_else(invalid)? else {
            return Err(invalid());
        };
        Ok(Self {
            host: host.as_str().ok_or_else(invalid)?.to_owned(),
            check_type: check_type.as_str().ok_or_else(invalid)?.to_owned(),
            item: Item::from_value(item).map_err(|_| invalid())?,
            params: params.clone(),
            paramstring: params.to_string(),
        })
    }
}

/// Every `*.mk` file of the directory, sorted by name. A missing directory
/// has no files.
fn autocheck_files(dir: &Path) -> Result<Vec<PathBuf>, AutocheckError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir)(e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(io_error(dir))?.path();
        if path.extension().is_some_and(|e| e == "mk") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read every autochecks file.
pub fn read_all(dir: &Path) -> Result<Vec<Autocheck>, AutocheckError> {
    let mut autochecks = Vec::new();
    for path in autocheck_files(dir)? {
        let text = std::fs::read_to_string(&path).map_err(io_error(&path))?;
        let value = Value::parse(&text).map_err(|source| AutocheckError::Syntax {
            path: path.clone(),
            source,
        })?;
        let Some(entries) = value.as_seq() else {
            return Err(AutocheckError::Entry {
                path,
                entry: value.to_string(),
            });
        };
        for entry in entries {
            autochecks.push(Autocheck::from_value(&path, entry)?);
        }
    }
    tracing::debug!(count = autochecks.len(), dir = %dir.display(), "read autochecks");
    Ok(autochecks)
}

// ---------------------------------------------------------------------------
// Line level access
// ---------------------------------------------------------------------------

/// Split the top level fields of a tuple line such as
/// `  ("srv1", "df", '/var', filesystem_default_levels),`.
fn tuple_fields(line: &str) -> Option<Vec<&str>> {
    let line = line.trim();
    let line = line.strip_suffix(',').unwrap_or(line);
    let inner = line.strip_prefix('(')?.strip_suffix(')')?;

    let mut fields = Vec::new();
    let mut quote_char: Option<char> = None;
    let mut depth: usize = 0;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote_char, c) {
            (_, '\\') => escaped = true,
            (Some(q), c) if c == q => quote_char = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote_char = Some(c),
            (None, '(' | '[' | '{') => depth = depth.saturating_add(1),
            (None, ')' | ']' | '}') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                fields.push(inner.get(start..i)?.trim());
                start = i.saturating_add(1);
            }
            (None, _) => {}
        }
    }
    let last = inner.get(start..)?.trim();
    if !last.is_empty() {
        fields.push(last);
    }
    Some(fields)
}

/// Host and check type of an entry line, or `None` for other lines.
fn entry_key(line: &str) -> Option<(String, String)> {
    let fields = tuple_fields(line)?;
    let host = Value::parse(fields.first()?).ok()?;
    let check_type = Value::parse(fields.get(1)?).ok()?;
    Some((host.as_str()?.to_owned(), check_type.as_str()?.to_owned()))
}

fn write_lines(path: &Path, header: &str, lines: &[&str]) -> Result<(), AutocheckError> {
    let mut text = String::from(header);
    text.push_str("[\n");
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("]\n");
    std::fs::write(path, text).map_err(io_error(path))
}

/// Remove the autochecks of `check_types` on `host` from every file.
/// Files left without entries are deleted. Returns the number of removed
/// entries.
pub fn remove_autochecks_of(
    dir: &Path,
    host: &str,
    check_types: &[&str],
) -> Result<usize, AutocheckError> {
    let mut removed: usize = 0;
    for path in autocheck_files(dir)? {
        let text = std::fs::read_to_string(&path).map_err(io_error(&path))?;
        let mut count: usize = 0;
        let mut kept = Vec::new();
        for line in text.lines() {
            let Some((h, ct)) = entry_key(line) else {
                continue;
            };
            count = count.saturating_add(1);
            if h != host || !check_types.contains(&ct.as_str()) {
                kept.push(line);
            }
        }
        let dropped = count.saturating_sub(kept.len());
        if kept.is_empty() {
            tracing::debug!(path = %path.display(), "deleting autochecks file");
            std::fs::remove_file(&path).map_err(io_error(&path))?;
        } else if dropped > 0 {
            tracing::debug!(path = %path.display(), removed = dropped, "removing checks");
            write_lines(&path, "", &kept)?;
        }
        removed = removed.saturating_add(dropped);
    }
    Ok(removed)
}

/// Delete every autochecks file. Returns the number of deleted files.
pub fn remove_all(dir: &Path) -> Result<usize, AutocheckError> {
    let files = autocheck_files(dir)?;
    for path in &files {
        tracing::debug!(path = %path.display(), "deleting autochecks file");
        std::fs::remove_file(path).map_err(io_error(path))?;
    }
    Ok(files.len())
}

/// Outcome of [`cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Entries found.
    pub checks: usize,
    /// Hosts found.
    pub hosts: usize,
}

/// File holding the autochecks of a host after cleanup.
pub fn host_file(dir: &Path, host: &str) -> PathBuf {
    dir.join(format!("{}.mk", host.replace(':', "_")))
}

/// Reorganise the directory into one sorted `<host>.mk` per host and delete
/// every other file.
pub fn cleanup(dir: &Path) -> Result<CleanupStats, AutocheckError> {
    let files = autocheck_files(dir)?;
    let mut by_host: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut stats = CleanupStats::default();
    for path in &files {
        tracing::debug!(path = %path.display(), "scanning");
        let text = std::fs::read_to_string(path).map_err(io_error(path))?;
        for line in text.lines() {
            if let Some((host, _)) = entry_key(line) {
                by_host.entry(host).or_default().push(line.to_owned());
                stats.checks = stats.checks.saturating_add(1);
            }
        }
    }
    stats.hosts = by_host.len();
    tracing::debug!(checks = stats.checks, hosts = stats.hosts, "found autochecks");

    let mut written = Vec::with_capacity(by_host.len());
    for (host, mut lines) in by_host {
        lines.sort();
        let path = host_file(dir, &host);
        tracing::debug!(path = %path.display(), checks = lines.len(), "writing");
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        write_lines(&path, "", &refs)?;
        written.push(path);
    }
    for path in files {
        if !written.contains(&path) {
            tracing::debug!(path = %path.display(), "deleting");
            std::fs::remove_file(&path).map_err(io_error(&path))?;
        }
    }
    Ok(stats)
}

/// Parse `<host>.mk` line by line, keeping each parameter text verbatim.
/// A missing file has no entries.
pub fn read_host_file(dir: &Path, host: &str) -> Result<Vec<Autocheck>, AutocheckError> {
    let path = host_file(dir, host);
    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(&path)(e)),
    };
    let mut table = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if !line.trim_start().starts_with('(') {
            continue;
        }
        let bad_line = || AutocheckError::Line {
            path: path.clone(),
            line: index.saturating_add(1),
        };
        let fields = tuple_fields(line).ok_or_else(bad_line)?;
        let [h, ct, item, params] = fields.as_slice() else {
            return Err(bad_line());
        };
        let parse = |text: &str| Value::parse(text).map_err(|_| bad_line());
        let host_value = parse(*h)?;
        let check_type = parse(*ct)?;
        table.push(Autocheck {
            host: host_value.as_str().ok_or_else(bad_line)?.to_owned(),
            check_type: check_type.as_str().ok_or_else(bad_line)?.to_owned(),
            item: Item::from_value(&parse(*item)?).map_err(|_| bad_line())?,
            params: parse(*params)?,
            paramstring: (*params).to_owned(),
        });
    }
    Ok(table)
}

/// A row to persist: check type, item and parameter text.
pub type AutocheckRow = (String, Item, String);

/// Replace `<host>.mk`.
pub fn write_host_file(dir: &Path, host: &str, rows: &[AutocheckRow]) -> Result<PathBuf, AutocheckError> {
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    let path = host_file(dir, host);
    let header = format!("# Autochecks for host {host}, created by Check_MK automation\n");
    let lines: Vec<String> = rows
        .iter()
        .map(|(ct, item, paramstring)| {
            format!("  ({}, {}, {item}, {paramstring}),", quote(host), quote(ct))
        })
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_lines(&path, &header, &refs)?;
    Ok(path)
}

/// Entry line written by an inventory run.
pub fn inventory_line(host: &str, check_type: &str, item: &Item, paramstring: &str) -> String {
    format!("  (\"{host}\", \"{check_type}\", {item}, {paramstring}),")
}

/// Write the result of an inventory run to
/// `<check_type>-<timestamp>.mk`, appending `.x` while the name is taken.
pub fn write_inventory_file(
    dir: &Path,
    check_type: &str,
    now: DateTime<Local>,
    lines: &[String],
) -> Result<PathBuf, AutocheckError> {
    std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    let mut stem = format!("{check_type}-{}", now.format("%Y-%m-%d_%H.%M.%S"));
    while dir.join(format!("{stem}.mk")).exists() {
        stem.push_str(".x");
    }
    let path = dir.join(format!("{stem}.mk"));
    let header = format!("# {}\n", path.display());
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    write_lines(&path, &header, &refs)?;
    Ok(path)
}
