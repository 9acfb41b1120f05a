//! wsync conformance suite
//!
//! Two ways to hold a peer to the protocol:
//!
//! - **Fixture checks**: recorded transcripts (one JSON document per
//!   fixture) are replayed through the envelope codec and checked for
//!   handshake, snapshot, resume, heartbeat, correlation and ordering rules.
//!   [`record_golden_fixtures`] produces a passing suite from the
//!   reference server.
//! - **Simulation**: [`run_simulator`] drives the client state machine
//!   against the reference server with seeded fault injection.
//!
//! ```no_run
//! use wsync_conformance::{run_checks, run_simulator, ConformanceReport, SimulatorConfig};
//!
//! # async fn demo() -> Result<(), wsync_conformance::ConformanceError> {
//! let fixtures = wsync_conformance::record_golden_fixtures().await?;
//! let report = ConformanceReport::new(run_checks(&fixtures))
//!     .with_simulation(run_simulator(SimulatorConfig::new().with_seed(7)).await);
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod checks;
pub mod config;
pub mod error;
pub mod fixture;
pub mod golden;
pub mod report;
pub mod simulator;
pub mod world;

pub use checks::{run_check, run_checks};
pub use config::SimulatorConfig;
pub use error::ConformanceError;
pub use fixture::{
    load_fixtures, write_fixtures, ErrorClassCase, Fixture, FixtureBody, HeartbeatPolicy,
    TransitionCase,
};
pub use golden::{record_golden_fixtures, RECORD_EPOCH_MS};
pub use report::{CheckOutcome, ConformanceReport};
pub use simulator::{run_simulator, SimulatedOperation, SimulatorReport, SimulatorStats, Violation};
pub use world::{reference_world, REFERENCE_SCENE};
