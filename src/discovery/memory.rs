use dashmap::DashMap;
use std::time::SystemTime;

use super::registry::ServiceRegistry;
use super::types::{ServiceKind, ServiceRecord};
use crate::error::RegistryError;

/// In-process registry, for tests and single-host experiments.
///
/// Records are kept in registration order per kind, so `read_one` returns the
/// oldest live record.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    records: DashMap<ServiceKind, Vec<(ServiceRecord, SystemTime)>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record with an explicit registration time.
    pub fn register_at(&self, record: &ServiceRecord, at: SystemTime) -> Result<(), RegistryError> {
        if record.hostname.is_empty() {
            return Err(RegistryError::InvalidRecord("empty hostname".to_string()));
        }

        let mut entries = self.records.entry(record.kind).or_default();
        entries.retain(|(existing, _)| existing != record);
        entries.push((record.clone(), at));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ServiceRegistry for MemoryRegistry {
    fn register(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
        self.register_at(record, SystemTime::now())?;
        tracing::info!("Registered {} (in-memory)", record);
        Ok(())
    }

    fn unregister(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
        if let Some(mut entries) = self.records.get_mut(&record.kind) {
            entries.retain(|(existing, _)| existing != record);
        }
        Ok(())
    }

    fn list_all(&self, kind: ServiceKind) -> Result<Vec<ServiceRecord>, RegistryError> {
        Ok(self
            .records
            .get(&kind)
            .map(|entries| entries.iter().map(|(record, _)| record.clone()).collect())
            .unwrap_or_default())
    }

    fn registered_at(&self, record: &ServiceRecord) -> Result<Option<SystemTime>, RegistryError> {
        Ok(self.records.get(&record.kind).and_then(|entries| {
            entries
                .iter()
                .find(|(existing, _)| existing == record)
                .map(|(_, at)| *at)
        }))
    }
}
