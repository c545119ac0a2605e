use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, SystemTime};

use super::registration::{Advertised, Registration};
use crate::discovery::client::DiscoveryClient;
use crate::discovery::registry::SharedRegistry;
use crate::discovery::resolver::{TCP_SCHEME, to_endpoint};
use crate::discovery::retry::RetryPolicy;
use crate::discovery::types::{ServiceKind, ServiceRecord};
use crate::error::{BootstrapError, TransportError};
use crate::transport::{BoundEndpoint, ConnectedEndpoint, Direction};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_EVICTION_MIN_AGE: Duration = Duration::from_secs(1);
const DEFAULT_EVICTION_BASE_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_EVICTION_MAX_DELAY: Duration = Duration::from_secs(1);

/// When a connector may delete a record it could not reach.
///
/// A record younger than `min_age` belongs to a peer that may still be coming
/// up, so it is left alone and the connector rediscovers after a delay taken
/// from `backoff`. Only its delays are used; the number of retries is
/// bounded by the record reaching `min_age`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub min_age: Duration,
    pub backoff: RetryPolicy,
}

impl EvictionPolicy {
    /// Evicts on the first failed connect, regardless of age.
    pub fn immediate() -> Self {
        Self {
            min_age: Duration::ZERO,
            backoff: RetryPolicy::immediate(0),
        }
    }
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self {
            min_age: DEFAULT_EVICTION_MIN_AGE,
            backoff: RetryPolicy::exponential(
                DEFAULT_EVICTION_BASE_DELAY,
                DEFAULT_EVICTION_MAX_DELAY,
                u32::MAX,
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Hostname written into this process's advertisements.
    pub hostname: String,
    /// Address listening endpoints bind to.
    pub bind_ip: IpAddr,
    pub connect_timeout: Duration,
    pub eviction: EvictionPolicy,
}

impl BootstrapConfig {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            hostname: "127.0.0.1".to_string(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// Binds and advertises local endpoints, and discovers and connects to remote ones.
#[derive(Clone)]
pub struct ConnectionBootstrapper {
    registry: SharedRegistry,
    discovery: DiscoveryClient,
    config: BootstrapConfig,
}

impl ConnectionBootstrapper {
    pub fn new(registry: SharedRegistry, discovery_policy: RetryPolicy, config: BootstrapConfig) -> Self {
        Self {
            discovery: DiscoveryClient::new(registry.clone(), discovery_policy),
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Opens a listening endpoint on an ephemeral port and advertises it as `kind`.
    pub async fn bind_and_advertise(
        &self,
        kind: ServiceKind,
        direction: Direction,
    ) -> Result<Advertised, BootstrapError> {
        let endpoint = BoundEndpoint::bind(self.config.bind_ip, direction).await?;
        let record = ServiceRecord::new(kind, self.config.hostname.clone(), endpoint.port());

        let registration = Registration::acquire(self.registry.clone(), record)?;
        tracing::info!(
            "Advertising {} on {} ({:?})",
            registration.record(),
            endpoint.local_addr(),
            direction
        );

        Ok(Advertised {
            registration,
            endpoint,
        })
    }

    /// Connects to some live instance of `kind`.
    ///
    /// Instances that are advertised but refuse the connection are evicted from
    /// the registry and discovery starts over. There is no overall deadline:
    /// the loop ends when a connection succeeds or when discovery gives up.
    pub async fn connect_with_retry(
        &self,
        kind: ServiceKind,
        direction: Direction,
    ) -> Result<ConnectedEndpoint, BootstrapError> {
        let mut spared = 0u32;
        loop {
            let record = self.discovery.find_or_fail(kind).await?;
            let endpoint = to_endpoint(&record, TCP_SCHEME)?;

            match ConnectedEndpoint::connect(&endpoint, direction, self.config.connect_timeout).await {
                Ok(connection) => {
                    tracing::info!("Connected to {} service at {}", kind, endpoint);
                    return Ok(connection);
                }
                Err(TransportError::Connect { reason, .. }) => {
                    tracing::warn!("Could not connect to {} at {}: {}", kind, endpoint, reason);
                    if self.handle_unreachable(&record, spared).await? {
                        spared = spared.saturating_add(1);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Evicts `record`, or waits if it is too young to evict. Returns whether
    /// the record was spared.
    async fn handle_unreachable(&self, record: &ServiceRecord, spared: u32) -> Result<bool, BootstrapError> {
        let Some(registered_at) = self.registry.registered_at(record)? else {
            tracing::debug!("{} already left the registry", record);
            return Ok(false);
        };

        let age = SystemTime::now()
            .duration_since(registered_at)
            .unwrap_or(Duration::ZERO);

        if age < self.config.eviction.min_age {
            tracing::debug!(
                "{} is only {:?} old, retrying before evicting it",
                record,
                age
            );
            self.config.eviction.backoff.wait(spared).await;
            return Ok(true);
        }

        self.registry.unregister(record)?;
        tracing::info!("Evicted unreachable {} (registered {:?} ago)", record, age);
        Ok(false)
    }
}
