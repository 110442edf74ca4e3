use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Tolerance used when turning fractional seconds into whole frame counts,
/// so that `0.1 * 30.0` counts as 3 frames rather than 4.
const FRAME_EPSILON: f64 = 1e-9;

/// Time duration with sub-millisecond precision (stored as fractional seconds).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Duration {
    seconds: f64,
}

impl Duration {
    /// Create a duration from seconds. Negative input clamps to zero.
    pub fn from_seconds(s: f64) -> Self {
        Self {
            seconds: s.max(0.0),
        }
    }

    pub fn from_millis(ms: f64) -> Self {
        Self::from_seconds(ms / 1000.0)
    }

    pub fn zero() -> Self {
        Self { seconds: 0.0 }
    }

    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    pub fn as_millis(&self) -> f64 {
        self.seconds * 1000.0
    }

    pub fn is_zero(&self) -> bool {
        self.seconds <= 0.0
    }

    /// Number of frames needed to cover this duration: `ceil(seconds * fps)`.
    pub fn frame_count(&self, fps: f64) -> u64 {
        if fps <= 0.0 {
            return 0;
        }
        (self.seconds * fps - FRAME_EPSILON).ceil().max(0.0) as u64
    }
}

impl Default for Duration {
    fn default() -> Self {
        Duration::zero()
    }
}

impl Add for Duration {
    type Output = Duration;
    fn add(self, rhs: Duration) -> Duration {
        Duration::from_seconds(self.seconds + rhs.seconds)
    }
}

impl Sub for Duration {
    type Output = Duration;
    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_seconds(self.seconds - rhs.seconds)
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;
    fn mul(self, rhs: f64) -> Duration {
        Duration::from_seconds(self.seconds * rhs)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds < 1.0 {
            write!(f, "{:.0}ms", self.seconds * 1000.0)
        } else {
            write!(f, "{:.2}s", self.seconds)
        }
    }
}

/// A point on the composition clock.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Timestamp {
    seconds: f64,
}

impl Timestamp {
    pub fn from_seconds(s: f64) -> Self {
        Self {
            seconds: s.max(0.0),
        }
    }

    pub fn zero() -> Self {
        Self { seconds: 0.0 }
    }

    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// Convert to a frame index for a given FPS.
    pub fn to_frame(&self, fps: f64) -> u64 {
        (self.seconds * fps + FRAME_EPSILON).floor() as u64
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::zero()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp::from_seconds(self.seconds + rhs.as_seconds())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ms = (self.seconds * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let secs = (total_ms % 60_000) / 1_000;
        let ms = total_ms % 1_000;
        write!(f, "{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, ms)
    }
}

/// A half-open interval `[start, end)` on the composition clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// `start <= t < end`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether this range shares any interior point with the open interval `(s, e)`.
    pub fn overlaps(&self, s: f64, e: f64) -> bool {
        self.start < e && self.end > s
    }

    /// Both ends clamped into `[lo, hi]`.
    pub fn clamped(&self, lo: f64, hi: f64) -> TimeRange {
        TimeRange {
            start: self.start.clamp(lo, hi),
            end: self.end.clamp(lo, hi),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3}s, {:.3}s)", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_frame_count() {
        assert_eq!(Duration::from_seconds(1.0).frame_count(30.0), 30);
        assert_eq!(Duration::from_seconds(0.1).frame_count(30.0), 3);
        assert_eq!(Duration::from_seconds(1.01).frame_count(30.0), 31);
        assert_eq!(Duration::from_seconds(1.0).frame_count(0.0), 0);
    }

    #[test]
    fn test_duration_arithmetic_clamps() {
        let a = Duration::from_seconds(1.0);
        let b = Duration::from_seconds(1.5);
        assert_eq!((a - b).as_seconds(), 0.0);
        assert!(((a + b).as_seconds() - 2.5).abs() < 1e-9);
        assert!(((a * 3.0).as_seconds() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_duration_display() {
        assert_eq!(format!("{}", Duration::from_seconds(2.5)), "2.50s");
        assert_eq!(format!("{}", Duration::from_millis(500.0)), "500ms");
    }

    #[test]
    fn test_timestamp_to_frame() {
        assert_eq!(Timestamp::from_seconds(1.0).to_frame(30.0), 30);
        assert_eq!(Timestamp::from_seconds(0.1).to_frame(30.0), 3);
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::from_seconds(3661.5);
        assert_eq!(format!("{}", ts), "01:01:01.500");
    }

    #[test]
    fn test_range_contains_is_half_open() {
        let r = TimeRange::new(1.0, 4.0);
        assert!(r.contains(1.0));
        assert!(r.contains(3.999));
        assert!(!r.contains(4.0));
        assert!(!r.contains(0.999));
    }

    #[test]
    fn test_range_overlaps_open_interval() {
        let r = TimeRange::new(2.0, 5.0);
        assert!(r.overlaps(4.0, 8.0));
        assert!(!r.overlaps(5.0, 8.0));
        assert!(!r.overlaps(0.0, 2.0));
    }

    #[test]
    fn test_range_clamped() {
        let r = TimeRange::new(-1.0, 10.0).clamped(0.0, 8.0);
        assert_eq!(r, TimeRange::new(0.0, 8.0));
    }
}
