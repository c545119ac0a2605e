//! Service Discovery Module
//!
//! Lets pipeline roles find each other without a coordination server. Each
//! role advertises the endpoints it listens on in a registry shared by every
//! host, and looks up the endpoints of the roles it needs to reach.
//!
//! ## Core Mechanisms
//! - **Registry**: one empty marker file per advertised endpoint, named
//!   `<port>-<hostname>` under a directory per service kind.
//! - **Polling Discovery**: lookups retry on an empty directory for a bounded
//!   number of attempts before giving up.
//! - **Eventual Consistency**: listings may miss or include records that change
//!   mid-scan; callers tolerate that rather than lock.
//!
//! ## Submodules
//! - **`types`**: `ServiceKind`, `ServiceRecord` and the file name codec.
//! - **`registry`**: the `ServiceRegistry` trait and the directory-backed store.
//! - **`memory`**: an in-process store with the same contract.
//! - **`resolver`**: record to `scheme://host:port` endpoint conversion.
//! - **`retry`**: the retry/backoff policy shared by discovery and bootstrap.
//! - **`client`**: bounded polling for a record of a given kind.

pub mod client;
pub mod memory;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod types;

pub use client::DiscoveryClient;
pub use memory::MemoryRegistry;
pub use registry::{FsRegistry, ServiceRegistry, SharedRegistry};
pub use retry::RetryPolicy;
pub use types::{ServiceKind, ServiceRecord};

#[cfg(test)]
mod tests;
