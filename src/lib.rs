//! # lotsim - Capacity-bounded parking lot simulation
//!
//! A lot with a fixed number of spots is contended for by cars arriving from
//! several gates. Every car runs concurrently: it waits for its arrival time,
//! parks immediately or waits for a spot, holds the spot, then leaves. The run
//! reports how many cars were served in total and per gate, plus an ordered
//! activity log.
//!
//! ## Core Concepts
//!
//! - **CapacityPool**: the spots; blocking and non-blocking acquisition, RAII release
//! - **CarTask**: one car's lifecycle as a small state machine
//! - **Clock**: injectable time source; `VirtualClock` makes runs instant and deterministic
//! - **Simulation**: launches one thread per car and collects the final report
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lotsim::{parse_records, render_text, ClockKind, Simulation, SimulationConfig};
//!
//! let input = "Gate 1, Car 1, Arrive 0, Parks 2\nGate 2, Car 2, Arrive 1, Parks 1\n";
//! let parsed = parse_records(input);
//!
//! let sim = Simulation::new(SimulationConfig {
//!     capacity: 1,
//!     clock: ClockKind::Virtual,
//!     deadline: None,
//! })?;
//! let report = sim.run(parsed.records)?;
//! print!("{}", render_text(&report));
//! # Ok::<(), lotsim::LotError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod activity;
pub mod car;
pub mod clock;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod record;
pub mod report;
pub mod simulation;

// Re-export primary types at crate root for convenience
pub use activity::ActivityLog;
pub use car::{CarOutcome, CarState, CarTask, SharedLot};
pub use clock::{CancelSource, CancelToken, Clock, VirtualClock, WallClock};
pub use error::{Cancelled, ConfigurationError, LotError, LotResult, ValidationError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use pool::{CapacityPool, PoolStats, SpotPermit};
pub use record::{load_records, parse_line, parse_records, CarRecord, ParsedInput, RejectedLine};
pub use report::{render_json, render_text};
pub use simulation::{validate_capacity, ClockKind, Simulation, SimulationConfig, SimulationReport};
