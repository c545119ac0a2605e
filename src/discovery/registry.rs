//! Service Registry
//!
//! A registry maps each [`ServiceKind`] to the set of records currently
//! advertised for it. The production store is a shared directory tree:
//!
//! ```text
//! <root>/SPLIT/41234-node07
//! <root>/SOLVE/40001-node08
//! <root>/SOLVE/40002-node09
//! <root>/SIMPLIFY/39811-node07
//! <root>/GATHER/39812-node07
//! ```
//!
//! Every record is one empty file; all information lives in its name. A single
//! file per record means each file has exactly one creator, while any number
//! of processes may list the directory at the same time.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use super::types::{ServiceKind, ServiceRecord};
use crate::error::RegistryError;

pub type SharedRegistry = Arc<dyn ServiceRegistry>;

/// Storage for service advertisements, keyed by kind.
///
/// No locking is provided. Listings are not snapshots: an entry created or
/// removed during a scan may or may not be reported.
pub trait ServiceRegistry: Send + Sync {
    /// Advertises `record`. A failure here is a misconfiguration of the shared
    /// registry, not a transient condition.
    fn register(&self, record: &ServiceRecord) -> Result<(), RegistryError>;

    /// Removes the advertisement. Removing a record that is already gone is a no-op.
    fn unregister(&self, record: &ServiceRecord) -> Result<(), RegistryError>;

    /// Every valid record of `kind`, in no particular order.
    fn list_all(&self, kind: ServiceKind) -> Result<Vec<ServiceRecord>, RegistryError>;

    /// When `record` was advertised, or `None` if it is not registered.
    fn registered_at(&self, record: &ServiceRecord) -> Result<Option<SystemTime>, RegistryError>;

    /// The first valid record of `kind`, if any.
    fn read_one(&self, kind: ServiceKind) -> Result<Option<ServiceRecord>, RegistryError> {
        Ok(self.list_all(kind)?.into_iter().next())
    }
}

/// Directory-backed registry shared between processes through a common filesystem.
#[derive(Debug, Clone)]
pub struct FsRegistry {
    root: PathBuf,
}

impl FsRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates `root` and one sub-directory per kind.
    ///
    /// Roles never create directories themselves; a missing kind directory at
    /// run time means the registry was not initialised.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let registry = Self::new(root);
        for kind in ServiceKind::ALL {
            let dir = registry.kind_dir(kind);
            fs::create_dir_all(&dir).map_err(|source| RegistryError::Io { path: dir, source })?;
        }
        tracing::info!("Initialised service registry at {}", registry.root.display());
        Ok(registry)
    }

    pub fn kind_dir(&self, kind: ServiceKind) -> PathBuf {
        self.root.join(kind.directory_name())
    }

    fn record_path(&self, record: &ServiceRecord) -> Result<PathBuf, RegistryError> {
        Ok(self.kind_dir(record.kind).join(record.file_name()?))
    }

    fn open_kind_dir(&self, kind: ServiceKind) -> Result<fs::ReadDir, RegistryError> {
        let dir = self.kind_dir(kind);
        fs::read_dir(&dir).map_err(|source| match source.kind() {
            ErrorKind::NotFound => RegistryError::MissingDirectory { path: dir },
            _ => RegistryError::Io { path: dir, source },
        })
    }

    fn decode_entry(kind: ServiceKind, entry: &fs::DirEntry) -> Option<ServiceRecord> {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            return None;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::debug!("Skipping non UTF-8 registry entry {:?}", entry.path());
            return None;
        };

        let record = ServiceRecord::from_file_name(kind, name);
        if record.is_none() {
            tracing::debug!("Skipping stray registry entry {:?}", entry.path());
        }
        record
    }
}

impl ServiceRegistry for FsRegistry {
    fn register(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
        let path = self.record_path(record)?;

        let kind_dir = self.kind_dir(record.kind);
        if !kind_dir.is_dir() {
            return Err(RegistryError::MissingDirectory { path: kind_dir });
        }

        fs::File::create(&path).map_err(|source| RegistryError::Io { path: path.clone(), source })?;

        tracing::info!("Registered {} at {}", record, path.display());
        Ok(())
    }

    fn unregister(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
        let path = self.record_path(record)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Unregistered {}", record);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("{} was already unregistered", record);
                Ok(())
            }
            Err(source) => Err(RegistryError::Io { path, source }),
        }
    }

    fn list_all(&self, kind: ServiceKind) -> Result<Vec<ServiceRecord>, RegistryError> {
        let records = self
            .open_kind_dir(kind)?
            .flatten()
            .filter_map(|entry| Self::decode_entry(kind, &entry))
            .collect();
        Ok(records)
    }

    fn read_one(&self, kind: ServiceKind) -> Result<Option<ServiceRecord>, RegistryError> {
        let record = self
            .open_kind_dir(kind)?
            .flatten()
            .find_map(|entry| Self::decode_entry(kind, &entry));
        Ok(record)
    }

    fn registered_at(&self, record: &ServiceRecord) -> Result<Option<SystemTime>, RegistryError> {
        let path = self.record_path(record)?;

        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.modified().unwrap_or_else(|_| SystemTime::now()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RegistryError::Io { path, source }),
        }
    }
}
