//! Where agent output and SNMP answers come from.
//!
//! [`DataSource`] is the seam between discovery and the network. The live
//! implementation reads agent output from the cache directory, a datasource
//! program or a TCP connection, and runs net-snmp tools for SNMP. Tests use
//! an in-memory implementation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::engine::{snmp, Engine, EngineError, SnmpCommand};

/// Time allowed for an agent to deliver its output once connected.
const AGENT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Subtrees stored by `snmpwalk`: the standard MIB and the enterprises tree.
const STORED_WALK_ROOTS: &[&str] = &["", "1.3.6.1.4.1"];

/// One `oid value` pair of an SNMP walk. OIDs carry no leading dot.
pub type WalkRow = (String, String);

/// Errors while fetching data from a host.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    /// TCP connection to the agent failed.
    #[error("Cannot connect to {address}: {source}")]
    Connect {
        /// `ip:port` tried.
        address: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The agent did not answer in time.
    #[error("Timeout after {seconds:.1} seconds connecting to {address}")]
    Timeout {
        /// `ip:port` tried.
        address: String,
        /// Time waited.
        seconds: f64,
    },

    /// The agent answered nothing.
    #[error("Empty output from agent")]
    EmptyOutput,

    /// A datasource program or SNMP tool failed.
    #[error("Command '{command}' failed with exit status {status}: {stderr}")]
    Command {
        /// Command line.
        command: String,
        /// Exit status, `-1` when killed by a signal.
        status: i32,
        /// Collected standard error.
        stderr: String,
    },

    /// A stored walk that does not exist.
    #[error("No snmpwalk file {}", .0.display())]
    MissingWalk(PathBuf),

    /// Filesystem failure.
    #[error("{}: {source}", .path.display())]
    Io {
        /// File or command involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Host configuration could not be evaluated.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Source of raw host data.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Complete agent output of a host. Cached output younger than
    /// `max_cache_age` seconds may be returned instead of asking the host.
    async fn agent_output(
        &self,
        host: &str,
        ip: &str,
        max_cache_age: u64,
    ) -> Result<String, DataSourceError>;

    /// All values below `oid`, in walk order.
    async fn snmp_walk(&self, host: &str, ip: &str, oid: &str)
        -> Result<Vec<WalkRow>, DataSourceError>;

    /// Single value, `None` when the device has none.
    async fn snmp_get(&self, host: &str, ip: &str, oid: &str) -> Option<String>;
}

// ---------------------------------------------------------------------------
// Live implementation
// ---------------------------------------------------------------------------

/// Data source talking to real hosts.
#[derive(Debug)]
pub struct LiveDataSource<'e> {
    engine: &'e Engine,
    oid_cache: Mutex<HashMap<(String, String), Option<String>>>,
}

impl<'e> LiveDataSource<'e> {
    /// Data source using the settings and paths of `engine`.
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            oid_cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_file(&self, host: &str) -> PathBuf {
        self.engine.config().paths.cache_dir().join(host)
    }

    fn cached_output(&self, host: &str, max_age: u64) -> Option<String> {
        let path = self.cache_file(host);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default()
            .as_secs();
        let simulation = self.engine.config().settings.simulation_mode;
        if !simulation && age > max_age {
            return None;
        }
        let text = std::fs::read_to_string(&path).ok()?;
        tracing::debug!(host, path = %path.display(), age, "using cached agent output");
        Some(text)
    }

    fn store_cache(&self, host: &str, output: &str) {
        let path = self.cache_file(host);
        let result = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|()| std::fs::write(&path, output));
        if let Err(e) = result {
            tracing::warn!(host, path = %path.display(), error = %e, "cannot write cache file");
        }
    }

    async fn agent_via_tcp(&self, ip: &str) -> Result<String, DataSourceError> {
        let settings = &self.engine.config().settings;
        let address = format!("{ip}:{}", settings.agent_port);
        let connect_timeout = Duration::from_secs_f64(settings.tcp_connect_timeout.max(0.0));
        tracing::debug!(address = %address, "connecting to agent");

        let mut stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(DataSourceError::Connect { address, source }),
            Err(_) => {
                return Err(DataSourceError::Timeout {
                    address,
                    seconds: settings.tcp_connect_timeout,
                })
            }
        };
        let mut buf = Vec::new();
        match tokio::time::timeout(AGENT_READ_TIMEOUT, stream.read_to_end(&mut buf)).await {
            Ok(Ok(_)) => Ok(String::from_utf8_lossy(&buf).into_owned()),
            Ok(Err(source)) => Err(DataSourceError::Connect { address, source }),
            Err(_) => Err(DataSourceError::Timeout {
                address,
                seconds: AGENT_READ_TIMEOUT.as_secs_f64(),
            }),
        }
    }

    /// Walk the stored subtrees of a host into `<snmpwalks_dir>/<host>`.
    pub async fn store_walk(&self, host: &str) -> Result<PathBuf, DataSourceError> {
        let ip = self.engine.require_ipaddress(host)?;
        let command = self.engine.snmp_command(host, SnmpCommand::Walk)?;
        let dir = self.engine.config().paths.snmpwalks_dir();
        std::fs::create_dir_all(&dir).map_err(|source| DataSourceError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut out = String::new();
        for root in STORED_WALK_ROOTS {
            let line = format!("{command} -On -Ob -OQ {ip} {root}");
            let rows = parse_walk_output(&run_shell(&line).await?);
            tracing::debug!(host, root, variables = rows.len(), "walked subtree");
            for (oid, value) in rows {
                out.push_str(&format!("{oid} {value}\n"));
            }
        }
        let path = dir.join(host);
        std::fs::write(&path, out).map_err(|source| DataSourceError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    fn stored_walk(&self, host: &str, oid: &str) -> Result<Vec<WalkRow>, DataSourceError> {
        let path = self.engine.config().paths.snmpwalks_dir().join(host);
        let text = std::fs::read_to_string(&path).map_err(|_| DataSourceError::MissingWalk(path))?;
        Ok(filter_walk(&text, oid))
    }
}

#[async_trait]
impl DataSource for LiveDataSource<'_> {
    async fn agent_output(
        &self,
        host: &str,
        ip: &str,
        max_cache_age: u64,
    ) -> Result<String, DataSourceError> {
        if let Some(cached) = self.cached_output(host, max_cache_age) {
            return Ok(cached);
        }
        let output = match self.engine.datasource_program(host, ip) {
            Some(program) => {
                tracing::debug!(host, command = %program, "calling datasource program");
                run_shell(&program).await?
            }
            None => self.agent_via_tcp(ip).await?,
        };
        if output.is_empty() {
            return Err(DataSourceError::EmptyOutput);
        }
        self.store_cache(host, &output);
        Ok(output)
    }

    async fn snmp_walk(
        &self,
        host: &str,
        ip: &str,
        oid: &str,
    ) -> Result<Vec<WalkRow>, DataSourceError> {
        if self.engine.is_usewalk_host(host) {
            return self.stored_walk(host, oid);
        }
        let command = self.engine.snmp_command(host, SnmpCommand::Walk)?;
        let line = format!("{command} -OQ -OU -On -Ot {ip} {oid}");
        tracing::debug!(host, command = %line, "walking");
        Ok(parse_walk_output(&run_shell(&line).await?))
    }

    async fn snmp_get(&self, host: &str, ip: &str, oid: &str) -> Option<String> {
        let key = (host.to_owned(), oid.to_owned());
        if let Ok(cache) = self.oid_cache.lock() {
            if let Some(value) = cache.get(&key) {
                return value.clone();
            }
        }

        let value = if self.engine.is_usewalk_host(host) {
            match self.stored_walk(host, oid) {
                Ok(rows) if rows.len() == 1 => rows.into_iter().next().map(|(_, v)| v),
                _ => None,
            }
        } else {
            match self.engine.snmp_command(host, SnmpCommand::Get) {
                Ok(command) => {
                    let line = format!("{command} -On -OQ -Oe {ip} {oid} 2>/dev/null");
                    tracing::debug!(host, command = %line, "running");
                    match run_shell(&line).await {
                        Ok(out) => out.lines().next().and_then(snmp::parse_get_answer),
                        Err(_) => None,
                    }
                }
                Err(_) => None,
            }
        };
        tracing::debug!(host, oid, answer = ?value, "SNMP answer");

        if let Ok(mut cache) = self.oid_cache.lock() {
            cache.insert(key, value.clone());
        }
        value
    }
}

/// Run a command line through `sh -c` and return its standard output.
async fn run_shell(command: &str) -> Result<String, DataSourceError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|source| DataSourceError::Io {
            path: PathBuf::from(command),
            source,
        })?;
    if !output.status.success() {
        return Err(DataSourceError::Command {
            command: command.to_owned(),
            status: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `oid = value` lines. Quoted values may continue on following
/// lines until the closing quote. Quotes are removed.
pub fn parse_walk_output(output: &str) -> Vec<WalkRow> {
    let mut rows = Vec::new();
    let mut lines = output.lines();
    while let Some(line) = lines.next() {
        let Some((oid, value)) = line.trim().split_once('=') else {
            continue;
        };
        let mut value = value.trim().to_owned();
        if value.starts_with('"') {
            while value.len() < 2 || !value.ends_with('"') {
                match lines.next() {
                    Some(more) => value.push_str(more.trim()),
                    None => break,
                }
            }
        }
        let oid = oid.trim().trim_start_matches('.').to_owned();
        rows.push((oid, strip_quotes(&value)));
    }
    rows
}

fn strip_quotes(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_owned()
}

/// Rows of a stored walk at or below `oid`.
pub fn filter_walk(text: &str, oid: &str) -> Vec<WalkRow> {
    let prefix = oid.trim_start_matches('.');
    text.lines()
        .filter_map(|line| {
            let (row_oid, value) = line.split_once(' ').unwrap_or((line, ""));
            let below = row_oid == prefix
                || prefix.is_empty()
                || row_oid
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'));
            below.then(|| (row_oid.to_owned(), strip_quotes(value.trim())))
        })
        .collect()
}
