/// Virtual time for the deterministic simulation.
///
/// Represents a logical timestamp with no dependency on `std::time`.
/// Time advances only when the simulation dispatches events, never from
/// wall-clock observation. One tick is one nanosecond.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

// ── VirtualTime ───────────────────────────────────────────────────────

/// An absolute point on the simulation clock, in nanoseconds since start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VirtualTime(u64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0);

    /// The largest representable instant.
    pub const MAX: VirtualTime = VirtualTime(u64::MAX);

    /// Create a new `VirtualTime` from a raw tick (nanosecond) value.
    #[inline]
    pub const fn new(ticks: u64) -> Self {
        VirtualTime(ticks)
    }

    /// Whole seconds since the start of the simulation. Saturates at
    /// [`VirtualTime::MAX`].
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        VirtualTime(secs.saturating_mul(NANOS_PER_SEC as u64))
    }

    /// Saturates at [`VirtualTime::MAX`].
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        VirtualTime(millis.saturating_mul(NANOS_PER_MILLI as u64))
    }

    /// Milliseconds since start, or `None` if they do not fit in the clock.
    #[inline]
    pub const fn checked_from_millis(millis: u64) -> Option<Self> {
        match millis.checked_mul(NANOS_PER_MILLI as u64) {
            Some(ticks) => Some(VirtualTime(ticks)),
            None => None,
        }
    }

    /// Return the raw tick value.
    #[inline]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Seconds as a float, for display and rate computations.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Compute the absolute time that is `delay` after `self`.
    ///
    /// Returns `None` if `delay` is negative or the result overflows.
    #[inline]
    pub fn checked_add(self, delay: SimDuration) -> Option<VirtualTime> {
        if delay.is_negative() {
            return None;
        }
        self.0.checked_add(delay.0 as u64).map(VirtualTime)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self.0 < other.0
    }

    /// Returns the elapsed duration between `earlier` and `self`.
    /// Returns `None` if `earlier` is after `self`.
    #[inline]
    pub fn duration_since(self, earlier: VirtualTime) -> Option<SimDuration> {
        let delta = self.0.checked_sub(earlier.0)?;
        i64::try_from(delta).ok().map(SimDuration)
    }
}

impl fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0 / NANOS_PER_SEC as u64;
        let nanos = self.0 % NANOS_PER_SEC as u64;
        write!(f, "+{}.{:09}s", secs, nanos)
    }
}

// ── SimDuration ───────────────────────────────────────────────────────

/// A signed span of virtual time, in nanoseconds.
///
/// Signed so that a negative delay handed to the scheduler is visible
/// and can be rejected instead of wrapping into the far future.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimDuration(i64);

impl SimDuration {
    pub const ZERO: SimDuration = SimDuration(0);

    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        SimDuration(nanos)
    }

    #[inline]
    pub const fn from_micros(micros: i64) -> Self {
        SimDuration(micros.saturating_mul(NANOS_PER_MICRO))
    }

    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        SimDuration(millis.saturating_mul(NANOS_PER_MILLI))
    }

    #[inline]
    pub const fn from_secs(secs: i64) -> Self {
        SimDuration(secs.saturating_mul(NANOS_PER_SEC))
    }

    /// Fractional seconds, rounded to the nearest nanosecond.
    pub fn from_secs_f64(secs: f64) -> Self {
        SimDuration((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    #[inline]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    #[inline]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Add for SimDuration {
    type Output = SimDuration;

    fn add(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_add(rhs.0))
    }
}

impl Sub for SimDuration {
    type Output = SimDuration;

    fn sub(self, rhs: SimDuration) -> SimDuration {
        SimDuration(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for SimDuration {
    type Output = SimDuration;

    fn neg(self) -> SimDuration {
        SimDuration(self.0.saturating_neg())
    }
}

impl fmt::Display for SimDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}
