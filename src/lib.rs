//! Distributed SAT Pipeline Library
//!
//! Roles of a SAT solving pipeline find and connect to each other through a
//! registry directory shared by every host, with no coordination server.
//! The binary (`main.rs`) runs one role per process.
//!
//! ## Architecture Modules
//! - **`discovery`**: the shared registry of advertised endpoints and the
//!   polling client that looks them up.
//! - **`transport`**: length-prefixed message framing over TCP, with bound
//!   (listening) and connected endpoints.
//! - **`bootstrap`**: bind-then-advertise, connect-with-eviction, and the
//!   guards that withdraw advertisements on every exit path.
//! - **`pipeline`**: the Simplify/Gather, Split and Solve roles and what they
//!   do to a formula.
//! - **`config`**: runtime settings shared by the role processes.
//! - **`error`**: typed errors of the library layers.

pub mod bootstrap;
pub mod config;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod transport;
