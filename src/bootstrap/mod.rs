//! Connection Bootstrap Module
//!
//! Brings a role from "just started" to "bound and connected" using only the
//! shared registry.
//!
//! ## Core Mechanisms
//! - **Bind then advertise**: a listening endpoint is opened on an ephemeral
//!   port first, and only the port actually bound is written to the registry,
//!   so a record never points at an endpoint that has not been opened yet.
//! - **Self-healing connect**: a discovered record that refuses connections is
//!   evicted by the connector and discovery restarts. Stale records left by
//!   crashed processes are pruned by whoever trips over them, no heartbeat needed.
//! - **Scoped ownership**: every advertisement is held by a `Registration`
//!   guard and withdrawn when the guard goes away, on success and error paths alike.

pub mod registration;
pub mod service;

pub use registration::{Advertised, Registration};
pub use service::{BootstrapConfig, ConnectionBootstrapper, EvictionPolicy};
