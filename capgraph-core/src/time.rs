//! Fixed-resolution time values
//!
//! All device timestamps, frame intervals and sample durations use a tick of
//! 100 nanoseconds.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::time::Duration;

/// Number of ticks in one second (1 tick = 100ns)
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Number of ticks in one millisecond
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// Convert a frame rate into a frame interval in ticks, rounded to nearest
///
/// Returns `None` for non-positive or non-finite rates.
pub fn frame_rate_to_interval(frame_rate: f64) -> Option<i64> {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return None;
    }
    Some((TICKS_PER_SECOND as f64 / frame_rate).round() as i64)
}

/// Convert a frame interval in ticks into a frame rate
///
/// Returns `0.0` for a non-positive interval.
pub fn interval_to_frame_rate(interval: i64) -> f64 {
    if interval <= 0 {
        return 0.0;
    }
    TICKS_PER_SECOND as f64 / interval as f64
}

/// A signed span of time measured in ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timespan(i64);

impl Timespan {
    /// Zero-length span
    pub const ZERO: Self = Self(0);

    /// Create from raw ticks
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Create from fractional seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * TICKS_PER_SECOND as f64).round() as i64)
    }

    /// Create from milliseconds
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * TICKS_PER_MILLISECOND)
    }

    /// Duration of one frame at `frame_rate`, or zero for a non-positive rate
    pub fn from_frame_rate(frame_rate: f64) -> Self {
        frame_rate_to_interval(frame_rate)
            .map(Self)
            .unwrap_or(Self::ZERO)
    }

    /// Raw ticks
    pub const fn ticks(&self) -> i64 {
        self.0
    }

    /// Value in fractional seconds
    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    /// Whether the span is zero
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Convert to a std duration, clamping negative spans to zero
    pub fn to_duration(&self) -> Duration {
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.0 as u64 * 100)
    }
}

impl From<Duration> for Timespan {
    fn from(duration: Duration) -> Self {
        Self((duration.as_nanos() / 100) as i64)
    }
}

impl Add for Timespan {
    type Output = Timespan;

    fn add(self, rhs: Timespan) -> Timespan {
        Timespan(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Timespan {
    type Output = Timespan;

    fn sub(self, rhs: Timespan) -> Timespan {
        Timespan(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Display for Timespan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.as_seconds())
    }
}

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound
    pub start: Timespan,
    /// Exclusive upper bound
    pub end: Timespan,
}

impl TimeRange {
    /// Create a range from its bounds
    pub const fn new(start: Timespan, end: Timespan) -> Self {
        Self { start, end }
    }

    /// Range covering `duration` ticks from `start`
    pub fn starting_at(start: Timespan, duration: Timespan) -> Self {
        Self::new(start, start + duration)
    }

    /// Range covering every representable time
    pub const fn all() -> Self {
        Self::new(Timespan::from_ticks(i64::MIN), Timespan::from_ticks(i64::MAX))
    }

    /// Whether the range contains no time at all
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether two ranges share any time
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.start < other.end
            && other.start < self.end
    }
}
