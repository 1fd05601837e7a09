//! Removing runtime state of hosts: counters, cached agent output,
//! logwatch messages, precompiled checks and autochecks.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::autochecks;
use crate::config::PathsConfig;

/// Errors while removing host state.
#[derive(Debug, thiserror::Error)]
#[error("{}: {source}", .path.display())]
pub struct HousekeepingError {
    /// File or directory involved.
    pub path: PathBuf,
    /// Underlying error.
    #[source]
    pub source: std::io::Error,
}

/// What [`flush_host`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flushed {
    /// Counter file removed.
    pub counters: bool,
    /// Cache files removed.
    pub cache_files: usize,
    /// Logwatch files removed.
    pub logfiles: usize,
}

impl Flushed {
    /// Whether anything was removed.
    pub fn is_empty(&self) -> bool {
        !self.counters && self.cache_files == 0 && self.logfiles == 0
    }
}

impl fmt::Display for Flushed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("(nothing)");
        }
        if self.counters {
            f.write_str(" counters")?;
        }
        match self.cache_files {
            0 => {}
            1 => f.write_str(" cache")?,
            n => write!(f, " cache({n})")?,
        }
        if self.logfiles > 0 {
            write!(f, " logfiles({})", self.logfiles)?;
        }
        Ok(())
    }
}

/// Remove a file or a directory tree. A missing path is not an error;
/// returns whether something was removed.
pub fn remove_path(path: &Path) -> Result<bool, HousekeepingError> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => Err(e),
    };
    result.map(|()| true).map_err(|source| HousekeepingError {
        path: path.to_path_buf(),
        source,
    })
}

/// Cache files of a host: `<host>` and `<host>.*`.
pub fn cache_files_of(cache_dir: &Path, host: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };
    let prefix = format!("{host}.");
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name == host || name.starts_with(&prefix)
        })
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Delete counters, cached agent output and logwatch files of a host.
/// Single files that cannot be removed are skipped.
pub fn flush_host(paths: &PathsConfig, host: &str) -> Flushed {
    let mut flushed = Flushed {
        counters: std::fs::remove_file(paths.counters_dir().join(host)).is_ok(),
        ..Flushed::default()
    };

    for file in cache_files_of(&paths.cache_dir(), host) {
        if std::fs::remove_file(&file).is_ok() {
            flushed.cache_files = flushed.cache_files.saturating_add(1);
        }
    }

    if let Ok(entries) = std::fs::read_dir(paths.logwatch_dir().join(host)) {
        for entry in entries.filter_map(Result::ok) {
            if std::fs::remove_file(entry.path()).is_ok() {
                flushed.logfiles = flushed.logfiles.saturating_add(1);
            }
        }
    }
    tracing::debug!(host, ?flushed, "flushed");
    flushed
}

/// Remove every file the system keeps about a host. Returns the removed
/// paths.
pub fn delete_host(paths: &PathsConfig, host: &str) -> Result<Vec<PathBuf>, HousekeepingError> {
    let precompiled = paths.precompiled_dir();
    let mut candidates = vec![
        precompiled.join(host),
        precompiled.join(format!("{host}.py")),
        autochecks::host_file(&paths.autochecks_dir(), host),
        paths.logwatch_dir().join(host),
        paths.counters_dir().join(host),
    ];
    candidates.extend(cache_files_of(&paths.cache_dir(), host));

    let mut removed = Vec::new();
    for path in candidates {
        if remove_path(&path)? {
            tracing::debug!(host, path = %path.display(), "removed");
            removed.push(path);
        }
    }
    Ok(removed)
}
