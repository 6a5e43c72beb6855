//! Per-car unit of work.
//!
//! A car moves through `Scheduled → Arrived → {ParkedImmediately | Waiting} →
//! Parked → Departed`. Cancellation at any suspension jumps straight to
//! `Departed`; a held spot is released on every exit path because the permit is
//! an RAII guard.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::activity::ActivityLog;
use crate::clock::{CancelToken, Clock};
use crate::error::Cancelled;
use crate::metrics::Metrics;
use crate::pool::CapacityPool;
use crate::record::CarRecord;

/// Lifecycle state of a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarState {
    /// Waiting for its arrival time.
    Scheduled,
    /// At the gate, about to try for a spot.
    Arrived,
    /// Found a free spot on arrival.
    ParkedImmediately,
    /// Lot was full; blocked until a spot is handed over.
    Waiting,
    /// Holding a spot.
    Parked,
    /// Terminal.
    Departed,
}

impl CarState {
    /// Returns true if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Arrived)
                | (Self::Arrived, Self::ParkedImmediately | Self::Waiting)
                | (Self::ParkedImmediately | Self::Waiting, Self::Parked)
                | (Self::Scheduled | Self::Arrived | Self::Waiting | Self::Parked, Self::Departed)
        )
    }

    /// Returns true for the terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Departed)
    }
}

impl fmt::Display for CarState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "scheduled",
            Self::Arrived => "arrived",
            Self::ParkedImmediately => "parked_immediately",
            Self::Waiting => "waiting",
            Self::Parked => "parked",
            Self::Departed => "departed",
        };
        f.write_str(s)
    }
}

/// What happened to one car.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarOutcome {
    pub car_id: u32,
    pub gate: String,
    pub final_state: CarState,
    /// The car found the lot full and logged a waiting entry.
    pub waited: bool,
    /// The car reached `Parked` and was counted as served.
    pub parked: bool,
    pub cancelled: bool,
    /// Clock readings (logical units) at each milestone reached.
    pub arrived_at: Option<u64>,
    pub parked_at: Option<u64>,
    pub departed_at: Option<u64>,
}

impl CarOutcome {
    fn new(record: &CarRecord) -> Self {
        Self {
            car_id: record.car_id(),
            gate: record.gate().to_string(),
            final_state: CarState::Scheduled,
            waited: false,
            parked: false,
            cancelled: false,
            arrived_at: None,
            parked_at: None,
            departed_at: None,
        }
    }
}

/// Resources shared by every car of a run.
#[derive(Debug, Clone)]
pub struct SharedLot {
    pub(crate) pool: Arc<CapacityPool>,
    pub(crate) log: Arc<ActivityLog>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl SharedLot {
    /// Bundles the shared resources.
    #[must_use]
    pub fn new(
        pool: Arc<CapacityPool>,
        log: Arc<ActivityLog>,
        metrics: Arc<Metrics>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            log,
            metrics,
            clock,
        }
    }

    /// The lot's spots.
    #[must_use]
    pub fn pool(&self) -> &CapacityPool {
        &self.pool
    }

    /// The activity log.
    #[must_use]
    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    /// The served counters.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Keeps a car registered with the clock for as long as the task exists.
struct Participation {
    clock: Arc<dyn Clock>,
}

impl Participation {
    fn register(clock: &Arc<dyn Clock>) -> Self {
        clock.enter(1);
        Self {
            clock: Arc::clone(clock),
        }
    }
}

impl Drop for Participation {
    fn drop(&mut self) {
        self.clock.leave();
    }
}

/// The unit of work for one car.
///
/// Creating a task registers it with the lot's clock; the registration ends when
/// the task is dropped, whether or not it ever ran.
pub struct CarTask {
    record: CarRecord,
    lot: SharedLot,
    cancel: CancelToken,
    state: CarState,
    _participation: Participation,
}

impl fmt::Debug for CarTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarTask")
            .field("record", &self.record)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CarTask {
    /// Creates a task in the `Scheduled` state.
    #[must_use]
    pub fn new(record: CarRecord, lot: SharedLot, cancel: CancelToken) -> Self {
        let participation = Participation::register(&lot.clock);
        Self {
            record,
            lot,
            cancel,
            state: CarState::Scheduled,
            _participation: participation,
        }
    }

    /// The record driving this task.
    #[must_use]
    pub const fn record(&self) -> &CarRecord {
        &self.record
    }

    /// Runs the car to `Departed`.
    #[must_use]
    pub fn run(mut self) -> CarOutcome {
        let mut outcome = CarOutcome::new(&self.record);
        if self.drive(&mut outcome).is_err() {
            outcome.cancelled = true;
            tracing::debug!(
                car_id = self.record.car_id(),
                gate = self.record.gate(),
                state = %self.state,
                "car cancelled"
            );
        }
        self.advance(CarState::Departed);
        outcome.final_state = self.state;
        outcome
    }

    fn drive(&mut self, outcome: &mut CarOutcome) -> Result<(), Cancelled> {
        let clock = Arc::clone(&self.lot.clock);
        let pool = Arc::clone(&self.lot.pool);

        clock.sleep(self.record.arrival_offset(), &self.cancel)?;
        self.advance(CarState::Arrived);
        outcome.arrived_at = Some(clock.now());
        self.log(&format!("arrived at time {}", self.record.arrival_offset()));

        let permit = if let Some(permit) = pool.try_acquire() {
            self.advance(CarState::ParkedImmediately);
            permit
        } else {
            self.advance(CarState::Waiting);
            outcome.waited = true;
            self.log("waiting for a spot.");
            pool.acquire(&self.cancel)?
        };

        let waited = self.state == CarState::Waiting;
        self.advance(CarState::Parked);
        outcome.parked = true;
        outcome.parked_at = Some(clock.now());
        self.log(if waited { "parked after waiting." } else { "parked." });
        self.lot.metrics.record_served(self.record.gate());

        // On cancellation `permit` is dropped here, which releases the spot.
        clock.sleep(self.record.hold_duration(), &self.cancel)?;

        self.log(&format!("left after {} units.", self.record.hold_duration()));
        outcome.departed_at = Some(clock.now());
        permit.release();
        Ok(())
    }

    fn log(&self, what: &str) {
        self.lot.log.append(format!(
            "Car {} from {} {what}",
            self.record.car_id(),
            self.record.gate()
        ));
    }

    fn advance(&mut self, next: CarState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal car transition {} -> {next}",
            self.state
        );
        tracing::debug!(
            car_id = self.record.car_id(),
            gate = self.record.gate(),
            from = %self.state,
            to = %next,
            "car transition"
        );
        self.state = next;
    }
}
