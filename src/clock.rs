//! Time sources used to stamp entries and to evaluate sweeps.
//!
//! Every store reads "now" through a [`TimeSource`] instead of calling
//! `Instant::now()` directly, so eviction boundaries can be driven by a
//! [`ManualClock`] in tests without sleeping.
//!
//! # Example
//! ```
//! use viewcache::clock::{ManualClock, TimeSource};
//! use std::time::Duration;
//!
//! let clock = ManualClock::new();
//! let t0 = clock.now();
//! clock.advance(Duration::from_secs(90));
//! assert_eq!(clock.now() - t0, Duration::from_secs(90));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic, non-decreasing source of "now".
///
/// Implementations are shared across threads and called while a shard lock
/// is held, so `now` must be cheap and must never block.
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    #[inline]
    fn now(&self) -> Instant {
        (**self).now()
    }
}

// ---------------------------------------------------------------------------
// SystemClock
// ---------------------------------------------------------------------------

/// Reads the process monotonic clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
///
/// Time is kept as an offset in nanoseconds from a fixed origin captured at
/// construction.  The offset only ever grows: [`set`](ManualClock::set) to an
/// earlier offset is ignored, preserving monotonicity for concurrent readers.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset_nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            offset_nanos: AtomicU64::new(0),
        }
    }

    /// Moves the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        self.offset_nanos
            .fetch_add(duration_to_nanos(d), Ordering::AcqRel);
    }

    /// Moves the clock to `elapsed` past the origin.  No-op if the clock is
    /// already at or beyond that point.
    pub fn set(&self, elapsed: Duration) {
        self.offset_nanos
            .fetch_max(duration_to_nanos(elapsed), Ordering::AcqRel);
    }

    /// Time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
    }

    /// The instant `elapsed` past the origin, independent of the current
    /// reading.  Handy for building sweep boundaries such as "t = 31min".
    pub fn at(&self, elapsed: Duration) -> Instant {
        self.origin + elapsed
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    #[inline]
    fn now(&self) -> Instant {
        self.at(self.elapsed())
    }
}

/// `true` when `stamp` is more than `window` older than `now`.
///
/// A stamp later than `now` has age zero and is never expired.
#[inline]
pub(crate) fn is_expired(stamp: Instant, window: Duration, now: Instant) -> bool {
    now.saturating_duration_since(stamp) > window
}

#[inline]
fn duration_to_nanos(d: Duration) -> u64 {
    saturating_u64(d.as_nanos())
}

/// Narrows a `Duration::as_*` reading to `u64`, clamping at `u64::MAX`.
#[inline]
pub(crate) fn saturating_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}
