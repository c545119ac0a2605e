//! Error types for the discovery, transport and bootstrap layers.
//!
//! Conditions the system recovers from on its own (an empty kind directory
//! during discovery, a discovered peer that refuses connections) never show up
//! here: they are retried internally. Everything below is meant to end the
//! role's process once the scoped guards have released what they hold.

use std::path::PathBuf;

use crate::discovery::types::{ServiceKind, ServiceRecord};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry directory `{}` does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("registry I/O failed on `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service record: {0}")]
    InvalidRecord(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no {kind} service found after {attempts} attempt(s)")]
    NotFound { kind: ServiceKind, attempts: u32 },

    #[error("cannot resolve {0} to an endpoint: empty hostname")]
    Unresolvable(ServiceRecord),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not bind listening endpoint: {0}")]
    Bind(#[source] std::io::Error),

    #[error("could not connect to `{endpoint}`: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("malformed endpoint `{0}`")]
    InvalidEndpoint(String),

    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("a {0} endpoint cannot be used that way")]
    WrongDirection(&'static str),

    #[error("endpoint closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
