//! Simulation runner.
//!
//! One named OS thread per car, all launched together; the lot's capacity is
//! enforced by the pool alone, never by limiting how many cars run. Outcomes are
//! collected over a channel so an optional deadline can cancel stragglers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use serde::Serialize;
use uuid::Uuid;

use crate::activity::ActivityLog;
use crate::car::{CarOutcome, CarTask, SharedLot};
use crate::clock::{CancelSource, Clock, VirtualClock, WallClock};
use crate::error::{ConfigurationError, LotError, LotResult};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pool::CapacityPool;
use crate::record::CarRecord;

/// Which time source cars suspend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    /// Real delays; one logical unit lasts `unit`.
    Wall {
        /// Length of one logical unit.
        unit: Duration,
    },
    /// Deterministic logical time; delays take no real time.
    Virtual,
}

impl Default for ClockKind {
    fn default() -> Self {
        Self::Wall {
            unit: Duration::from_secs(1),
        }
    }
}

/// Run configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Number of parking spots.
    pub capacity: usize,
    /// Time source.
    pub clock: ClockKind,
    /// Wall-clock budget for the whole run. Cars still running when it expires
    /// are cancelled.
    pub deadline: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            clock: ClockKind::default(),
            deadline: None,
        }
    }
}

/// Converts a raw capacity into a spot count.
///
/// # Errors
///
/// Returns `ConfigurationError::NonPositiveCapacity` for zero or negative values.
pub fn validate_capacity(raw: i64) -> Result<usize, ConfigurationError> {
    if raw <= 0 {
        return Err(ConfigurationError::NonPositiveCapacity { capacity: raw });
    }
    usize::try_from(raw).map_err(|_| ConfigurationError::NonPositiveCapacity { capacity: raw })
}

/// Final state of a run.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub capacity: usize,
    pub metrics: MetricsSnapshot,
    pub log: Vec<String>,
    /// One entry per car, ordered by car id.
    pub outcomes: Vec<CarOutcome>,
    /// Highest number of simultaneously parked cars.
    pub peak_occupancy: usize,
    /// Spots still held once every car thread was joined; always 0.
    pub spots_in_use: usize,
    /// Clock reading (logical units) when the last car finished.
    pub final_time: u64,
    /// The deadline fired and remaining cars were cancelled.
    pub timed_out: bool,
}

impl SimulationReport {
    /// Total cars that reached a spot.
    #[must_use]
    pub const fn total_served(&self) -> u64 {
        self.metrics.total_served
    }

    /// Cars that were cancelled before completing.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.cancelled).count()
    }

    /// Cars that had to wait for a spot.
    #[must_use]
    pub fn waited(&self) -> usize {
        self.outcomes.iter().filter(|o| o.waited).count()
    }
}

/// Runs cars against a capacity-bounded lot.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    /// Creates a simulation.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::NonPositiveCapacity` when the capacity is zero.
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigurationError> {
        if config.capacity == 0 {
            return Err(ConfigurationError::NonPositiveCapacity { capacity: 0 });
        }
        Ok(Self { config })
    }

    /// Runs `records` with default settings and the given raw capacity.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error, before any car starts, when `capacity`
    /// is zero or negative. See [`Simulation::run`] for run-time errors.
    pub fn run_with_capacity(records: Vec<CarRecord>, capacity: i64) -> LotResult<SimulationReport> {
        let capacity = validate_capacity(capacity)?;
        Self::new(SimulationConfig {
            capacity,
            ..SimulationConfig::default()
        })?
        .run(records)
    }

    /// The configuration this simulation runs with.
    #[must_use]
    pub const fn config(&self) -> &SimulationConfig {
        &self.config
    }

    fn make_clock(&self) -> Arc<dyn Clock> {
        match self.config.clock {
            ClockKind::Wall { unit } => Arc::new(WallClock::new(unit)),
            ClockKind::Virtual => Arc::new(VirtualClock::new()),
        }
    }

    /// Runs one task per record until every car has departed or been cancelled.
    ///
    /// # Errors
    ///
    /// Returns `LotError::Internal` if a car thread cannot be spawned or panics.
    /// Every started car is joined before this returns, so no spot is left held.
    pub fn run(&self, records: Vec<CarRecord>) -> LotResult<SimulationReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = self.make_clock();
        let lot = SharedLot::new(
            Arc::new(CapacityPool::with_clock(self.config.capacity, Arc::clone(&clock))?),
            Arc::new(ActivityLog::new()),
            Arc::new(Metrics::new()),
            Arc::clone(&clock),
        );
        let cancel = CancelSource::new();

        tracing::info!(%run_id, cars = records.len(), capacity = self.config.capacity, "simulation starting");

        // Every car is registered with the clock before the first one starts.
        let tasks: Vec<CarTask> = records
            .into_iter()
            .map(|record| CarTask::new(record, lot.clone(), cancel.token()))
            .collect();

        let (done_tx, done_rx) = unbounded::<CarOutcome>();
        let mut handles: Vec<JoinHandle<()>> = Vec::with_capacity(tasks.len());
        let mut spawn_error = None;
        for task in tasks {
            let car_id = task.record().car_id();
            let done_tx = done_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("lotsim-car-{car_id}"))
                .spawn(move || {
                    let outcome = task.run();
                    let _ = done_tx.send(outcome);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    spawn_error = Some(format!("failed to spawn thread for car {car_id}: {err}"));
                    break;
                }
            }
        }
        drop(done_tx);

        let mut timed_out = false;
        let outcomes = if spawn_error.is_some() {
            cancel_all(&cancel, &lot);
            done_rx.iter().collect()
        } else {
            let (outcomes, expired) = self.collect(&done_rx, handles.len(), &cancel, &lot);
            timed_out = expired;
            outcomes
        };

        let mut panicked = 0usize;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        if let Some(message) = spawn_error {
            return Err(LotError::internal(message));
        }
        if panicked > 0 {
            return Err(LotError::internal(format!("{panicked} car thread(s) panicked")));
        }

        let report = finish(run_id, started_at, self.config.capacity, &lot, outcomes, timed_out);
        tracing::info!(
            %run_id,
            served = report.metrics.total_served,
            cancelled = report.cancelled(),
            timed_out,
            "simulation finished"
        );
        Ok(report)
    }

    fn collect(
        &self,
        done_rx: &Receiver<CarOutcome>,
        expected: usize,
        cancel: &CancelSource,
        lot: &SharedLot,
    ) -> (Vec<CarOutcome>, bool) {
        let mut outcomes = Vec::with_capacity(expected);
        // A budget too large to represent as an instant never expires.
        let deadline = self
            .config
            .deadline
            .and_then(|budget| Instant::now().checked_add(budget));

        while outcomes.len() < expected {
            let next = match deadline {
                Some(deadline) => done_rx.recv_deadline(deadline),
                None => done_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(outcome) => outcomes.push(outcome),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        finished = outcomes.len(),
                        remaining = expected - outcomes.len(),
                        "simulation deadline expired; cancelling remaining cars"
                    );
                    cancel_all(cancel, lot);
                    outcomes.extend(done_rx.iter());
                    return (outcomes, true);
                }
                // Only reachable when a car thread died without reporting.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        (outcomes, false)
    }
}

fn cancel_all(cancel: &CancelSource, lot: &SharedLot) {
    cancel.cancel();
    lot.pool.interrupt();
    lot.clock.interrupt();
}

fn finish(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    capacity: usize,
    lot: &SharedLot,
    mut outcomes: Vec<CarOutcome>,
    timed_out: bool,
) -> SimulationReport {
    outcomes.sort_by_key(|o| o.car_id);
    let pool = lot.pool.stats();
    if pool.in_use != 0 {
        tracing::error!(in_use = pool.in_use, "spots still held after every car finished");
    }
    debug_assert_eq!(pool.in_use, 0, "spots still held after every car finished");

    SimulationReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        capacity,
        metrics: lot.metrics.snapshot(),
        log: lot.log.snapshot(),
        outcomes,
        peak_occupancy: pool.peak_in_use,
        spots_in_use: pool.in_use,
        final_time: lot.clock.now(),
        timed_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn virtual_sim(capacity: usize) -> Simulation {
        Simulation::new(SimulationConfig {
            capacity,
            clock: ClockKind::Virtual,
            deadline: None,
        })
        .unwrap()
    }

    fn car(gate: &str, id: u32, arrive: u64, hold: u64) -> CarRecord {
        CarRecord::new(gate, id, arrive, hold).unwrap()
    }

    #[test]
    fn validate_capacity_rejects_non_positive() {
        assert_eq!(validate_capacity(3), Ok(3));
        assert_eq!(
            validate_capacity(0),
            Err(ConfigurationError::NonPositiveCapacity { capacity: 0 })
        );
        assert_eq!(
            validate_capacity(-4),
            Err(ConfigurationError::NonPositiveCapacity { capacity: -4 })
        );
    }

    #[test]
    fn default_config_is_four_spots_one_second_units() {
        let config = SimulationConfig::default();
        assert_eq!(config.capacity, 4);
        assert_eq!(
            config.clock,
            ClockKind::Wall {
                unit: Duration::from_secs(1)
            }
        );
        assert!(config.deadline.is_none());
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        let err = Simulation::new(SimulationConfig {
            capacity: 0,
            ..SimulationConfig::default()
        })
        .unwrap_err();
        assert_eq!(err, ConfigurationError::NonPositiveCapacity { capacity: 0 });
    }

    #[test]
    fn empty_input_yields_empty_report() {
        let report = virtual_sim(2).run(Vec::new()).unwrap();
        assert_eq!(report.total_served(), 0);
        assert!(report.metrics.per_gate.is_empty());
        assert!(report.log.is_empty());
        assert!(report.outcomes.is_empty());
        assert!(!report.timed_out);
    }

    #[test]
    fn outcomes_are_ordered_by_car_id() {
        let report = virtual_sim(4)
            .run(vec![car("Gate 1", 3, 2, 1), car("Gate 1", 1, 0, 1), car("Gate 2", 2, 1, 1)])
            .unwrap();
        let ids: Vec<u32> = report.outcomes.iter().map(|o| o.car_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(report.total_served(), 3);
        assert_eq!(report.final_time, 3);
    }

    #[test]
    fn virtual_run_serialises_contention_exactly() {
        let report = virtual_sim(1)
            .run(vec![car("Gate 1", 1, 0, 3), car("Gate 2", 2, 0, 3)])
            .unwrap();

        assert_eq!(report.total_served(), 2);
        assert_eq!(report.peak_occupancy, 1);
        assert_eq!(report.waited(), 1);
        assert_eq!(report.final_time, 6);

        let waiter = report.outcomes.iter().find(|o| o.waited).unwrap();
        assert_eq!(waiter.parked_at, Some(3));
        assert_eq!(waiter.departed_at, Some(6));
        assert_eq!(report.spots_in_use, 0);
    }

    #[test]
    fn unrepresentable_deadline_means_no_deadline() {
        let report = Simulation::new(SimulationConfig {
            capacity: 1,
            clock: ClockKind::Virtual,
            deadline: Some(Duration::MAX),
        })
        .unwrap()
        .run(vec![car("Gate 1", 1, 0, 1), car("Gate 2", 2, 0, 1)])
        .unwrap();

        assert!(!report.timed_out);
        assert_eq!(report.total_served(), 2);
        assert_eq!(report.cancelled(), 0);
        assert_eq!(report.spots_in_use, 0);
    }
}
