use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

/// Separator between the port and the hostname in a registry entry name.
pub const FIELD_SEPARATOR: char = '-';

/// The kinds of service a role can advertise.
///
/// Simplify and Gather live in the same process but are advertised separately:
/// Simplify is where the splitter pulls formulas from, Gather is where solvers
/// push their results to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Split,
    Solve,
    Simplify,
    Gather,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Split,
        ServiceKind::Solve,
        ServiceKind::Simplify,
        ServiceKind::Gather,
    ];

    /// Name of the registry sub-directory holding records of this kind.
    pub fn directory_name(self) -> &'static str {
        match self {
            ServiceKind::Split => "SPLIT",
            ServiceKind::Solve => "SOLVE",
            ServiceKind::Simplify => "SIMPLIFY",
            ServiceKind::Gather => "GATHER",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.directory_name())
    }
}

impl FromStr for ServiceKind {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceKind::ALL
            .into_iter()
            .find(|kind| kind.directory_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| RegistryError::InvalidRecord(format!("unknown service kind `{}`", s)))
    }
}

/// One running instance of a role, reachable at `hostname:port`.
///
/// A record with an empty hostname is never registered nor resolved; "not
/// found" is expressed with `Option::None` instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ServiceRecord {
    pub kind: ServiceKind,
    pub hostname: String,
    pub port: u16,
}

impl ServiceRecord {
    pub fn new(kind: ServiceKind, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            hostname: hostname.into(),
            port,
        }
    }

    /// Name of the zero-length marker file advertising this record: `<port>-<hostname>`.
    pub fn file_name(&self) -> Result<String, RegistryError> {
        validate_hostname(&self.hostname)?;
        Ok(encode_file_name(self.port, &self.hostname))
    }

    /// Decodes a marker file name found under the directory of `kind`.
    ///
    /// Returns `None` for names that are not `digits '-' rest`; stray files in
    /// a kind directory are not errors.
    pub fn from_file_name(kind: ServiceKind, name: &str) -> Option<Self> {
        let (port, hostname) = decode_file_name(name)?;
        Some(Self::new(kind, hostname, port))
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.kind, self.hostname, self.port)
    }
}

pub fn encode_file_name(port: u16, hostname: &str) -> String {
    format!("{}{}{}", port, FIELD_SEPARATOR, hostname)
}

/// The first `-`-separated token is the port, everything after it is the
/// hostname (which may itself contain `-`).
///
/// Only names `encode_file_name` produces are accepted, so a decoded record
/// always maps back to the file it was read from.
pub fn decode_file_name(name: &str) -> Option<(u16, String)> {
    let (port, hostname) = name.split_once(FIELD_SEPARATOR)?;

    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    validate_hostname(hostname).ok()?;

    let port = port.parse::<u16>().ok()?;
    if encode_file_name(port, hostname) != name {
        return None;
    }
    Some((port, hostname.to_string()))
}

fn validate_hostname(hostname: &str) -> Result<(), RegistryError> {
    if hostname.is_empty() {
        return Err(RegistryError::InvalidRecord("empty hostname".to_string()));
    }
    if hostname.contains(['/', '\\', '\0']) {
        return Err(RegistryError::InvalidRecord(format!(
            "hostname `{}` cannot be stored in a file name",
            hostname
        )));
    }
    Ok(())
}
