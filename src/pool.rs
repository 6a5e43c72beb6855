//! Bounded capacity pool (the lot's spots).
//!
//! A release hands its unit straight to a blocked waiter when there is one, so a
//! newcomer calling `try_acquire` can never take a unit a waiter was woken for.
//! Waiters are not served in FIFO order; every waiter is still served once enough
//! units are released.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::clock::{CancelToken, Clock, WallClock};
use crate::error::{Cancelled, ConfigurationError};

#[derive(Debug)]
struct PoolState {
    available: usize,
    in_use: usize,
    /// Units released to blocked waiters but not yet picked up.
    handoffs: usize,
    waiting: usize,
    peak_in_use: usize,
    total_grants: u64,
}

impl PoolState {
    fn grant(&mut self) {
        self.in_use += 1;
        self.peak_in_use = self.peak_in_use.max(self.in_use);
        self.total_grants += 1;
    }
}

/// Point-in-time view of a pool.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub in_use: usize,
    pub waiting: usize,
    /// Highest number of simultaneously held units since creation.
    pub peak_in_use: usize,
    pub total_grants: u64,
}

/// Capacity-bounded resource pool with blocking and non-blocking acquisition.
pub struct CapacityPool {
    capacity: usize,
    state: Mutex<PoolState>,
    released: Condvar,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CapacityPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityPool")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl CapacityPool {
    /// Creates a pool with `capacity` units.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::NonPositiveCapacity` when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ConfigurationError> {
        Self::with_clock(capacity, Arc::new(WallClock::default()))
    }

    /// Creates a pool that reports blocking waits to `clock`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::NonPositiveCapacity` when `capacity` is zero.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Result<Self, ConfigurationError> {
        if capacity == 0 {
            return Err(ConfigurationError::NonPositiveCapacity { capacity: 0 });
        }
        Ok(Self {
            capacity,
            state: Mutex::new(PoolState {
                available: capacity,
                in_use: 0,
                handoffs: 0,
                waiting: 0,
                peak_in_use: 0,
                total_grants: 0,
            }),
            released: Condvar::new(),
            clock,
        })
    }

    /// Total number of units.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a unit if one is free right now. `None` leaves the pool untouched.
    #[must_use]
    pub fn try_acquire(&self) -> Option<SpotPermit<'_>> {
        let mut state = self.lock();
        if state.available == 0 {
            return None;
        }
        state.available -= 1;
        state.grant();
        Some(SpotPermit { pool: self })
    }

    /// Blocks until a unit is available.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires before a unit was handed over. A
    /// cancelled caller holds nothing and must not release.
    pub fn acquire(&self, cancel: &CancelToken) -> Result<SpotPermit<'_>, Cancelled> {
        let mut state = self.lock();
        cancel.check()?;
        if state.available > 0 {
            state.available -= 1;
            state.grant();
            return Ok(SpotPermit { pool: self });
        }

        state.waiting += 1;
        self.clock.blocked();
        loop {
            // Threads parked below number `waiting + handoffs`.
            if cancel.is_cancelled() {
                if state.handoffs > 0 {
                    // The unit meant for this wakeup goes to the next waiter.
                    state.handoffs -= 1;
                    self.pass_on(&mut state);
                } else {
                    state.waiting -= 1;
                    self.clock.unblocked();
                }
                return Err(Cancelled);
            }
            if state.handoffs > 0 {
                state.handoffs -= 1;
                state.grant();
                return Ok(SpotPermit { pool: self });
            }
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Gives a free unit to a blocked waiter, or back to the free list.
    fn pass_on(&self, state: &mut PoolState) {
        if state.waiting > 0 {
            state.waiting -= 1;
            state.handoffs += 1;
            self.clock.unblocked();
            self.released.notify_one();
        } else {
            state.available += 1;
        }
    }

    fn release(&self) {
        let mut state = self.lock();
        debug_assert!(state.in_use > 0, "capacity unit released more often than granted");
        if state.in_use == 0 {
            return;
        }
        state.in_use -= 1;
        self.pass_on(&mut state);
        debug_assert!(
            state.in_use + state.available + state.handoffs == self.capacity,
            "capacity accounting drifted"
        );
    }

    /// Wakes every blocked waiter so it re-checks its cancel token.
    pub fn interrupt(&self) {
        let _state = self.lock();
        self.released.notify_all();
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            capacity: self.capacity,
            available: state.available,
            in_use: state.in_use,
            waiting: state.waiting,
            peak_in_use: state.peak_in_use,
            total_grants: state.total_grants,
        }
    }
}

/// A held unit. Dropping it releases the unit back to the pool.
#[must_use = "dropping a permit releases the spot immediately"]
pub struct SpotPermit<'a> {
    pool: &'a CapacityPool,
}

impl SpotPermit<'_> {
    /// Releases the unit explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for SpotPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotPermit")
            .field("capacity", &self.pool.capacity)
            .finish()
    }
}

impl Drop for SpotPermit<'_> {
    fn drop(&mut self) {
        self.pool.release();
    }
}
