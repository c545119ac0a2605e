//! Runtime settings shared by every role process.
//!
//! The binary fills these from command-line flags and environment variables;
//! tests build them directly from the `Default` impls.

use anyhow::{Context, Result, bail};
use std::fs::File;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::bootstrap::{BootstrapConfig, ConnectionBootstrapper, EvictionPolicy};
use crate::discovery::registry::{FsRegistry, SharedRegistry};
use crate::discovery::retry::{DEFAULT_DISCOVERY_TIMEOUT_SECS, RetryPolicy};

pub const DEFAULT_REGISTRY_DIR: &str = "registry";
pub const DEFAULT_HOSTNAME: &str = "127.0.0.1";
pub const DEFAULT_EVICTION_GRACE_MS: u64 = 1000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Directory holding one sub-directory per service kind.
    pub root: PathBuf,
    /// Discovery gives up after about this many seconds of empty listings.
    pub discovery_timeout_secs: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_REGISTRY_DIR),
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
        }
    }
}

impl RegistryConfig {
    pub fn discovery_policy(&self) -> RetryPolicy {
        RetryPolicy::per_second(self.discovery_timeout_secs)
    }

    /// Opens the registry, which must already have been initialised.
    pub fn open(&self) -> Result<FsRegistry> {
        if !self.root.is_dir() {
            bail!(
                "Registry directory `{}` does not exist (run `init` first)",
                self.root.display()
            );
        }
        Ok(FsRegistry::new(&self.root))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    pub registry: RegistryConfig,
    /// Hostname other hosts use to reach this process.
    pub hostname: String,
    pub bind_ip: IpAddr,
    /// Records younger than this are not evicted when unreachable.
    pub eviction_grace: Duration,
    pub connect_timeout: Duration,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            eviction_grace: Duration::from_millis(DEFAULT_EVICTION_GRACE_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl RoleConfig {
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        BootstrapConfig {
            hostname: self.hostname.clone(),
            bind_ip: self.bind_ip,
            connect_timeout: self.connect_timeout,
            eviction: EvictionPolicy {
                min_age: self.eviction_grace,
                ..EvictionPolicy::default()
            },
        }
    }

    pub fn bootstrapper(&self) -> Result<ConnectionBootstrapper> {
        if self.hostname.trim().is_empty() {
            bail!("Hostname must not be empty");
        }
        let registry: SharedRegistry = Arc::new(self.registry.open()?);
        Ok(ConnectionBootstrapper::new(
            registry,
            self.registry.discovery_policy(),
            self.bootstrap_config(),
        ))
    }
}

/// Fails unless `path` names a readable regular file. `what` describes the
/// file in the error, e.g. "problem".
pub fn check_input_file(what: &str, path: &Path) -> Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            bail!("{} file `{}` could not be found", what, path.display())
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Could not inspect {} file `{}`", what, path.display()));
        }
    };

    if !metadata.is_file() {
        bail!("{} file `{}` is not a regular file", what, path.display());
    }

    match File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            bail!("{} file `{}` needs read permission", what, path.display())
        }
        Err(e) => Err(e).with_context(|| format!("Could not open {} file `{}`", what, path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::registry::ServiceRegistry;
    use crate::discovery::types::{ServiceKind, ServiceRecord};

    #[test]
    fn test_role_config_maps_onto_bootstrap_settings() {
        let config = RoleConfig {
            hostname: "node-7".to_string(),
            eviction_grace: Duration::from_millis(250),
            connect_timeout: Duration::from_millis(750),
            ..RoleConfig::default()
        };

        let bootstrap = config.bootstrap_config();
        assert_eq!(bootstrap.hostname, "node-7");
        assert_eq!(bootstrap.connect_timeout, Duration::from_millis(750));
        assert_eq!(bootstrap.eviction.min_age, Duration::from_millis(250));
        assert_eq!(bootstrap.bind_ip, IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let policy = config.registry.discovery_policy();
        assert_eq!(policy.max_attempts(), DEFAULT_DISCOVERY_TIMEOUT_SECS + 1);
    }

    #[test]
    fn test_bootstrapper_requires_initialised_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RoleConfig::default();
        config.registry.root = dir.path().join("missing");
        assert!(config.bootstrapper().is_err());

        config.registry.root = dir.path().to_path_buf();
        FsRegistry::init(dir.path()).unwrap();
        let boot = config.bootstrapper().unwrap();

        let record = ServiceRecord::new(ServiceKind::Solve, "node-7", 4000);
        boot.registry().register(&record).unwrap();
        assert!(dir.path().join("SOLVE").join("4000-node-7").is_file());
    }

    #[test]
    fn test_bootstrapper_rejects_empty_hostname() {
        let dir = tempfile::tempdir().unwrap();
        FsRegistry::init(dir.path()).unwrap();

        let config = RoleConfig {
            registry: RegistryConfig {
                root: dir.path().to_path_buf(),
                ..RegistryConfig::default()
            },
            hostname: "  ".to_string(),
            ..RoleConfig::default()
        };
        assert!(config.bootstrapper().is_err());
    }

    #[test]
    fn test_check_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let problem = dir.path().join("problem.cnf");
        std::fs::write(&problem, "p cnf 1 1\n1 0\n").unwrap();

        assert!(check_input_file("problem", &problem).is_ok());

        let missing = check_input_file("problem", &dir.path().join("nope.cnf")).unwrap_err();
        assert!(missing.to_string().contains("could not be found"));

        let directory = check_input_file("problem", dir.path()).unwrap_err();
        assert!(directory.to_string().contains("not a regular file"));
    }
}
