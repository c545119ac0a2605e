//! Message Transport
//!
//! Point-to-point delivery of opaque byte messages over TCP. Messages are
//! length-prefixed frames, so every `receive` yields exactly one `send`.
//!
//! Endpoints come in two shapes. A role that *binds* gets a `BoundEndpoint` on
//! an ephemeral port and learns the port after the fact; a role that *connects*
//! gets a `ConnectedEndpoint`. Both are directional: which side binds is
//! independent of which way the messages flow.

pub mod endpoint;
pub mod frame;

pub use endpoint::{BoundEndpoint, ConnectedEndpoint, Direction};
