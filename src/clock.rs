//! Time sources and cooperative cancellation.
//!
//! Cars never sleep on the OS directly. They suspend through a [`Clock`], which
//! lets production runs map logical units to wall-clock delays while tests run on
//! a [`VirtualClock`] whose time only moves when every car is idle.
//!
//! Every suspension takes a [`CancelToken`]; a cancelled token makes the
//! suspension return [`Cancelled`] promptly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::{after, bounded, never, select, Receiver, Sender};

use crate::error::Cancelled;

/// Owner side of a cancellation signal.
///
/// Cancelling sets a shared flag (for checks made under a lock) and drops the
/// channel sender, which wakes every `select!` waiting on a token.
#[derive(Debug)]
pub struct CancelSource {
    flag: Arc<AtomicBool>,
    trigger: Mutex<Option<Sender<()>>>,
    token: CancelToken,
}

impl CancelSource {
    /// Creates a new, uncancelled source.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(0);
        let flag = Arc::new(AtomicBool::new(false));
        Self {
            token: CancelToken {
                flag: Arc::clone(&flag),
                signal: rx,
            },
            flag,
            trigger: Mutex::new(Some(tx)),
        }
    }

    /// A token observing this source.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Cancels every token. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
        let sender = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
    }

    /// Returns true once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    signal: Receiver<()>,
}

impl CancelToken {
    /// A token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            signal: never(),
        }
    }

    /// Returns true once the owning source has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Returns `Err(Cancelled)` if the token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` when the owning source has been cancelled.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Logical time source shared by all cars of a run.
///
/// The participant hooks let a clock know how many cars are able to make
/// progress. Only [`VirtualClock`] uses them; the defaults do nothing.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current logical time in units.
    fn now(&self) -> u64;

    /// Suspends the caller for `units` logical units.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if `cancel` fires before the time has elapsed.
    fn sleep(&self, units: u64, cancel: &CancelToken) -> Result<(), Cancelled>;

    /// Wakes every suspended caller so it re-checks its cancel token.
    fn interrupt(&self) {}

    /// Registers `participants` runnable tasks.
    fn enter(&self, participants: usize) {
        let _ = participants;
    }

    /// A registered task finished.
    fn leave(&self) {}

    /// A registered task is about to block on a resource held by others.
    fn blocked(&self) {}

    /// A blocked task was handed the resource it waited for.
    fn unblocked(&self) {}
}

/// Maps logical units onto real delays.
#[derive(Debug, Clone)]
pub struct WallClock {
    unit: Duration,
    origin: Instant,
}

impl WallClock {
    /// Creates a clock where one logical unit lasts `unit`.
    #[must_use]
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            origin: Instant::now(),
        }
    }

    /// Duration of one logical unit.
    #[must_use]
    pub const fn unit(&self) -> Duration {
        self.unit
    }

    fn span(&self, units: u64) -> Duration {
        let unit_nanos = u64::try_from(self.unit.as_nanos()).unwrap_or(u64::MAX);
        Duration::from_nanos(unit_nanos.saturating_mul(units))
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Clock for WallClock {
    fn now(&self) -> u64 {
        let unit = self.unit.as_nanos();
        if unit == 0 {
            return 0;
        }
        u64::try_from(self.origin.elapsed().as_nanos() / unit).unwrap_or(u64::MAX)
    }

    fn sleep(&self, units: u64, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.check()?;
        let span = self.span(units);
        if span.is_zero() {
            return Ok(());
        }
        let deadline = Instant::now() + span;

        select! {
            recv(cancel.signal) -> _ => {
                // The sender is gone: either a real cancel, or the source was
                // dropped without cancelling, in which case finish the sleep.
                cancel.check()?;
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                Ok(())
            }
            recv(after(span)) -> _ => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct Timeline {
    now: u64,
    runnable: usize,
    /// wake time -> number of sleepers due then
    sleepers: BTreeMap<u64, usize>,
}

/// Deterministic logical clock.
///
/// Time stands still while any registered task can make progress. When every
/// task is either sleeping or blocked, the clock jumps to the earliest pending
/// wake time and marks the sleepers due at that time runnable, all in one step.
/// Sleeps therefore take no real time and their relative order is exact.
///
/// Tasks must be registered with [`Clock::enter`] before they start and must
/// call [`Clock::leave`] when they finish; blocking on a shared resource must be
/// bracketed by [`Clock::blocked`] and a matching [`Clock::unblocked`] issued by
/// whoever hands the resource over.
#[derive(Debug, Default)]
pub struct VirtualClock {
    timeline: Mutex<Timeline>,
    tick: Condvar,
}

impl VirtualClock {
    /// Creates a clock at time zero with no participants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently able to make progress.
    #[must_use]
    pub fn runnable(&self) -> usize {
        self.lock().runnable
    }

    fn lock(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_if_idle(&self, timeline: &mut Timeline) {
        if timeline.runnable > 0 {
            return;
        }
        if let Some((wake, due)) = timeline.sleepers.pop_first() {
            timeline.now = wake;
            timeline.runnable += due;
            self.tick.notify_all();
        }
    }

    fn mark_idle(&self, timeline: &mut Timeline) {
        debug_assert!(timeline.runnable > 0, "virtual clock participant accounting underflow");
        timeline.runnable = timeline.runnable.saturating_sub(1);
        self.advance_if_idle(timeline);
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> u64 {
        self.lock().now
    }

    fn sleep(&self, units: u64, cancel: &CancelToken) -> Result<(), Cancelled> {
        cancel.check()?;
        if units == 0 {
            return Ok(());
        }

        let mut timeline = self.lock();
        let wake = timeline.now.saturating_add(units);
        *timeline.sleepers.entry(wake).or_default() += 1;
        self.mark_idle(&mut timeline);

        loop {
            // The advancing thread already counted us runnable.
            if timeline.now >= wake {
                return Ok(());
            }
            if cancel.is_cancelled() {
                if let Some(due) = timeline.sleepers.get_mut(&wake) {
                    *due -= 1;
                    if *due == 0 {
                        timeline.sleepers.remove(&wake);
                    }
                }
                timeline.runnable += 1;
                return Err(Cancelled);
            }
            timeline = self
                .tick
                .wait(timeline)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn interrupt(&self) {
        let _timeline = self.lock();
        self.tick.notify_all();
    }

    fn enter(&self, participants: usize) {
        self.lock().runnable += participants;
    }

    fn leave(&self) {
        let mut timeline = self.lock();
        self.mark_idle(&mut timeline);
    }

    fn blocked(&self) {
        let mut timeline = self.lock();
        self.mark_idle(&mut timeline);
    }

    fn unblocked(&self) {
        self.lock().runnable += 1;
    }
}
