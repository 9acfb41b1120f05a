//! wsync Client - the consuming peer
//!
//! Provides:
//! - `ConnectionMachine`: sans-IO handshake, subscribe, heartbeat and reconnect logic
//! - `spawn_client`: a tokio driver over any `Connector`
//! - `WorldView`: snapshot replacement, ordered event application with a
//!   confirmed-changes overlay, and the resume cursor
//! - Command correlation and optimistic pending operations
//! - `OfflineSimulator`: the same command gateway with no server behind it
//!
//! # Example
//!
//! ```rust
//! use wsync_client::{ClientConfig, ConnectionMachine, ConnectionStatus};
//!
//! let mut machine = ConnectionMachine::new(ClientConfig::new().with_rng_seed(7));
//! let actions = machine.start();
//! assert_eq!(machine.status(), ConnectionStatus::Connecting);
//! assert!(!actions.is_empty());
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod backoff;
pub mod config;
pub mod correlation;
pub mod driver;
pub mod error;
pub mod gateway;
pub mod heartbeat;
pub mod machine;
pub mod offline;
pub mod pending;
pub mod transport;
pub mod world_view;

pub use backoff::BackoffConfig;
pub use config::ClientConfig;
pub use correlation::CommandCorrelator;
pub use driver::{spawn_client, ClientHandle, ClientState};
pub use error::{ClientError, CorrelationViolation, ProtocolViolation};
pub use gateway::{CommandGateway, CommandResult, CommandResultKind};
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use machine::{
    Action, ClientEvent, ConnectionMachine, ConnectionStatus, ConnectionUpdate, CONNECTION_LOST,
};
pub use offline::OfflineSimulator;
pub use pending::{PendingOperation, PendingOperations};
pub use transport::{ChannelConnector, ChannelTransport, Connector, Transport};
pub use world_view::{
    ConfirmedChanges, EventDisposition, MidStreamSnapshotPolicy, ResumeCursor, WorldView,
};
