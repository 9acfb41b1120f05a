//! wsync Server - the authoritative peer
//!
//! Provides:
//! - `WorldServer`: store, command processor and event timeline shared by sessions
//! - `WorldSession`: hello/subscribe/ping/command handling for one connection
//! - A connection loop over text-frame channels
//! - Per-session command rate limiting
//!
//! # Example
//!
//! ```rust
//! use wsync_lifecycle::WorldSnapshot;
//! use wsync_server::{ServerConfig, WorldServer};
//!
//! let server = WorldServer::seeded(ServerConfig::new(), &WorldSnapshot::default()).unwrap();
//! let session = server.session();
//! assert!(!session.is_subscribed());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod session;

pub use config::{RateLimitConfig, ServerConfig};
pub use connection::{run_connection, spawn_connection, ConnectionHandle, DEFAULT_FRAME_BUFFER};
pub use error::ServerError;
pub use rate_limit::CommandRateLimiter;
pub use server::WorldServer;
pub use session::{WorldSession, UNKNOWN_MESSAGE_ID};
