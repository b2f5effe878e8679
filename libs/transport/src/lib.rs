//! # Aeris Session Transport
//!
//! ## Purpose
//!
//! Moves [`codec::Message`]s over TCP:
//! - [`Host`]: accepts connections, frames inbound bytes, stamps each
//!   message with its connection id, and fans it out through a
//!   [`Multiplexer`]
//! - [`ServerConn`]: a client link with a FIFO outbound queue, keep-alive
//!   heartbeats, and automatic reconnection
//! - [`Multiplexer`]: predicate-matched listeners, each handler invocation
//!   in its own task, with a rejection handler for unclaimed traffic
//!
//! ## Architecture Role
//!
//! ```text
//! certauth (trust handshake) → [transport] → codec → crypto
//!                                   ↓
//!                       Host, ServerConn, Multiplexer
//! ```
//!
//! ## Concurrency Model
//!
//! Per connection: one reader task and one writer task. All writes funnel
//! through the writer's queue, so handlers reply concurrently without
//! interleaving bytes. Handlers run in spawned tasks and never block the
//! read path.

pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod listener;
pub mod multiplexer;

pub use crate::client::ServerConn;
pub use crate::config::TransportConfig;
pub use crate::error::{Result, TransportError};
pub use crate::host::{BoundHost, Host};
pub use crate::listener::{Listener, Replier};
pub use crate::multiplexer::Multiplexer;

/// Payload of the idle-link heartbeat frame. Hosts absorb these before
/// dispatch; they exist to keep middleboxes and dead-peer detection happy.
pub const KEEP_ALIVE_TOKEN: &str = "AERIS-SERVICE-KEEPALIVE";
