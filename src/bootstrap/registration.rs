use crate::discovery::registry::SharedRegistry;
use crate::discovery::types::ServiceRecord;
use crate::error::RegistryError;
use crate::transport::BoundEndpoint;

/// A record this process advertised. The advertisement is withdrawn when the
/// guard is released or dropped, whichever comes first.
pub struct Registration {
    record: ServiceRecord,
    registry: SharedRegistry,
    active: bool,
}

impl Registration {
    /// Registers `record` and returns the guard that owns it.
    pub fn acquire(registry: SharedRegistry, record: ServiceRecord) -> Result<Self, RegistryError> {
        registry.register(&record)?;
        Ok(Self {
            record,
            registry,
            active: true,
        })
    }

    pub fn record(&self) -> &ServiceRecord {
        &self.record
    }

    /// Unregisters now and reports the outcome, instead of leaving it to `Drop`.
    pub fn release(mut self) -> Result<(), RegistryError> {
        self.active = false;
        self.registry.unregister(&self.record)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(e) = self.registry.unregister(&self.record) {
            tracing::warn!("Failed to unregister {}: {}", self.record, e);
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("record", &self.record)
            .field("active", &self.active)
            .finish()
    }
}

/// A listening endpoint together with its advertisement.
///
/// Fields drop in declaration order: the record disappears from the registry
/// before the listener closes.
pub struct Advertised {
    pub registration: Registration,
    pub endpoint: BoundEndpoint,
}

impl Advertised {
    pub fn record(&self) -> &ServiceRecord {
        self.registration.record()
    }

    /// Withdraws the advertisement, then closes the listener.
    pub fn release(self) -> Result<(), RegistryError> {
        let Advertised {
            registration,
            endpoint,
        } = self;
        let result = registration.release();
        drop(endpoint);
        result
    }
}
