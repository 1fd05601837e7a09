//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use cmkbase::autochecks;
use cmkbase::catalog::CheckCatalog;
use cmkbase::config::Config;
use cmkbase::discovery::{DataSource, DataSourceError, WalkRow};
use cmkbase::engine::Engine;

/// Parse a configuration document or fail the test.
pub fn config(text: &str) -> Config {
    match Config::from_toml(text, &CheckCatalog::builtin()) {
        Ok(config) => config,
        Err(e) => panic!("test configuration should load: {e}"),
    }
}

/// Engine over `text` without autochecks.
pub fn engine(text: &str) -> Engine {
    match Engine::new(config(text), CheckCatalog::builtin(), Vec::new()) {
        Ok(engine) => engine,
        Err(e) => panic!("engine should build: {e}"),
    }
}

/// Engine over `text` with all runtime files below `var_dir`. Autochecks
/// already present there are read.
pub fn engine_in(var_dir: &Path, text: &str) -> Engine {
    let mut config = config(text);
    config.paths.var_dir = var_dir.to_path_buf();
    let found = match autochecks::read_all(&config.paths.autochecks_dir()) {
        Ok(found) => found,
        Err(e) => panic!("autochecks should read: {e}"),
    };
    match Engine::new(config, CheckCatalog::builtin(), found) {
        Ok(engine) => engine,
        Err(e) => panic!("engine should build: {e}"),
    }
}

/// In-memory host data.
#[derive(Debug, Default)]
pub struct FakeSource {
    /// Agent output per host.
    pub agents: HashMap<String, String>,
    /// Walk rows per host; filtered by requested OID.
    pub walks: HashMap<String, Vec<WalkRow>>,
    /// Single OID answers per host.
    pub gets: HashMap<String, HashMap<String, String>>,
}

impl FakeSource {
    /// Source answering `output` for `host`.
    pub fn with_agent(host: &str, output: &str) -> Self {
        let mut source = Self::default();
        source.agents.insert(host.to_owned(), output.to_owned());
        source
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn agent_output(
        &self,
        host: &str,
        ip: &str,
        _max_cache_age: u64,
    ) -> Result<String, DataSourceError> {
        self.agents
            .get(host)
            .cloned()
            .ok_or_else(|| DataSourceError::Connect {
                address: format!("{ip}:6556"),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })
    }

    async fn snmp_walk(&self, host: &str, _ip: &str, oid: &str) -> Result<Vec<WalkRow>, DataSourceError> {
        let oid = oid.trim_start_matches('.');
        let prefix = format!("{oid}.");
        Ok(self
            .walks
            .get(host)
            .map(|rows| {
                rows.iter()
                    .filter(|(row_oid, _)| row_oid == oid || row_oid.starts_with(&prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn snmp_get(&self, host: &str, _ip: &str, oid: &str) -> Option<String> {
        self.gets.get(host)?.get(oid).cloned()
    }
}

/// Agent output of a small Linux host.
pub const LINUX_AGENT: &str = "<<<check_mk>>>
Version: 1.1.0
<<<df>>>
/dev/sda1     ext3    1000000  500000  500000  50% /
/dev/sda2     ext3    2000000  500000  1500000 25% /var/log
nfs:/export   nfs     1000000  500000  500000  50% /mnt/nfs
<<<cpu>>>
0.10 0.20 0.30 1/200 4711
<<<mem>>>
MemTotal:  1000 kB
MemFree:    500 kB
SwapTotal:  100 kB
SwapFree:   100 kB
<<<uptime>>>
12345.6 7890.1
";
