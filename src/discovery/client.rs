use super::registry::SharedRegistry;
use super::retry::RetryPolicy;
use super::types::{ServiceKind, ServiceRecord};
use crate::error::DiscoveryError;

/// Polls a registry until a service of the requested kind shows up.
#[derive(Clone)]
pub struct DiscoveryClient {
    registry: SharedRegistry,
    policy: RetryPolicy,
}

impl DiscoveryClient {
    pub fn new(registry: SharedRegistry, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    /// Reads the registry once immediately, then once per second for up to
    /// `timeout_secs` more attempts.
    pub async fn find_with_timeout(
        &self,
        kind: ServiceKind,
        timeout_secs: u32,
    ) -> Result<Option<ServiceRecord>, DiscoveryError> {
        self.find_with_policy(kind, &RetryPolicy::per_second(timeout_secs))
            .await
    }

    /// Reads the registry at most `policy.max_attempts()` times, waiting
    /// between attempts as the policy says.
    ///
    /// An empty kind directory is retried; a missing one is returned as an
    /// error straight away.
    pub async fn find_with_policy(
        &self,
        kind: ServiceKind,
        policy: &RetryPolicy,
    ) -> Result<Option<ServiceRecord>, DiscoveryError> {
        for attempt in 0..policy.max_attempts() {
            if attempt > 0 {
                policy.wait(attempt - 1).await;
            }

            if let Some(record) = self.registry.read_one(kind)? {
                tracing::debug!("Found {} on attempt {}", record, attempt + 1);
                return Ok(Some(record));
            }

            tracing::debug!(
                "No {} service yet (attempt {}/{})",
                kind,
                attempt + 1,
                policy.max_attempts()
            );
        }

        Ok(None)
    }

    /// Like [`find_with_policy`](Self::find_with_policy) with the client's own
    /// policy, but a service that never appears is an error.
    pub async fn find_or_fail(&self, kind: ServiceKind) -> Result<ServiceRecord, DiscoveryError> {
        match self.find_with_policy(kind, &self.policy).await? {
            Some(record) => Ok(record),
            None => {
                tracing::error!(
                    "Gave up looking for a {} service after {} attempts",
                    kind,
                    self.policy.max_attempts()
                );
                Err(DiscoveryError::NotFound {
                    kind,
                    attempts: self.policy.max_attempts(),
                })
            }
        }
    }
}
