//! SNMP credentials and command lines.

use crate::literal::Value;

use super::EngineError;

/// `sysDescr.0`; a device that does not answer it is not scanned.
pub const SYS_DESCR_OID: &str = ".1.3.6.1.2.1.1.1.0";

/// `sysObjectID.0`.
pub const SYS_OBJECT_ID_OID: &str = ".1.3.6.1.2.1.1.2.0";

/// Answers of `snmpget` meaning "no value".
const NO_VALUE_PREFIXES: &[&str] = &[
    "No more variables",
    "End of MIB",
    "No Such Object available",
    "No Such Instance currently exists",
];

/// Authentication of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpCredentials {
    /// v1/v2c community string.
    Community(String),
    /// v3 user based security.
    V3 {
        /// Security level (`-l`).
        level: String,
        /// Authentication protocol (`-a`).
        auth_protocol: String,
        /// Security name (`-u`).
        user: String,
        /// Authentication pass phrase (`-A`).
        auth_password: String,
        /// Privacy protocol and pass phrase (`-x`, `-X`).
        privacy: Option<(String, String)>,
    },
}

impl SnmpCredentials {
    /// Interpret a configured value: a string, or a 4- or 6-tuple of
    /// strings.
    pub fn from_value(host: &str, value: &Value) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidSnmpCredentials {
            host: host.to_owned(),
            credentials: value.to_string(),
        };
        if let Some(community) = value.as_str() {
            return Ok(SnmpCredentials::Community(community.to_owned()));
        }
        let fields = value
            .as_seq()
            .ok_or_else(invalid)?
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()?;
        match <[String; 6]>::try_from(fields.clone()) {
            Ok([level, auth_protocol, user, auth_password, priv_protocol, priv_password]) => {
                Ok(SnmpCredentials::V3 {
                    level,
                    auth_protocol,
                    user,
                    auth_password,
                    privacy: Some((priv_protocol, priv_password)),
                })
            }
            Err(_) => match <[String; 4]>::try_from(fields) {
                Ok([level, auth_protocol, user, auth_password]) => Ok(SnmpCredentials::V3 {
                    level,
                    auth_protocol,
                    user,
                    auth_password,
                    privacy: None,
                }),
                Err(_) => Err(invalid()),
            },
        }
    }
}

/// Which net-snmp tool to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnmpCommand {
    /// Single value (`snmpget`).
    Get,
    /// Subtree (`snmpbulkwalk` / `snmpwalk`).
    Walk,
}

/// Command and authentication options, e.g.
/// `snmpbulkwalk -v2c -c 'public' -m '' -M ''`.
pub fn base_command(what: SnmpCommand, credentials: &SnmpCredentials, bulkwalk: bool) -> String {
    let mut command = match what {
        SnmpCommand::Get => "snmpget",
        SnmpCommand::Walk => "snmpbulkwalk",
    };
    let mut options = match credentials {
        SnmpCredentials::Community(community) => {
            let version = if bulkwalk {
                "-v2c"
            } else {
                if what == SnmpCommand::Walk {
                    command = "snmpwalk";
                }
                "-v1"
            };
            format!("{version} -c '{community}'")
        }
        SnmpCredentials::V3 {
            level,
            auth_protocol,
            user,
            auth_password,
            privacy,
        } => {
            let mut opts =
                format!("-v3 -l '{level}' -a '{auth_protocol}' -u '{user}' -A '{auth_password}'");
            if let Some((protocol, password)) = privacy {
                opts.push_str(&format!(" -x '{protocol}' -X '{password}'"));
            }
            opts
        }
    };
    options.push_str(" -m '' -M ''");
    format!("{command} {options}")
}

/// Value of an `snmpget -On -OQ -Oe` answer line (`oid = value`), or `None`
/// when the agent reported that there is no such value.
pub fn parse_get_answer(line: &str) -> Option<String> {
    let (_, value) = line.trim().split_once('=')?;
    let value = value.trim();
    if NO_VALUE_PREFIXES.iter().any(|p| value.starts_with(p)) {
        return None;
    }
    Some(value.to_owned())
}
