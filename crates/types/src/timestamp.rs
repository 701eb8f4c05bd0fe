//! Millisecond-precision timestamps.
//!
//! The consensus core never reads a clock itself; every timestamp comes in
//! through the caller (the time oracle) or out of a round's slot schedule.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// A point in time, in milliseconds since the unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The zero timestamp.
    pub const ZERO: Self = Timestamp(0);

    /// Create from milliseconds since the unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Timestamp(millis)
    }

    /// Milliseconds since the unix epoch.
    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Duration elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        if self.0 <= earlier.0 {
            Duration::ZERO
        } else {
            Duration::from_millis((self.0 - earlier.0) as u64)
        }
    }

    /// Whether this timestamp is strictly before `other`.
    pub fn is_before(&self, other: Timestamp) -> bool {
        self.0 < other.0
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_millis() as i64)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 - rhs.as_millis() as i64)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_sub_duration() {
        let t = Timestamp::from_millis(1_000);
        assert_eq!(t + Duration::from_secs(4), Timestamp(5_000));
        assert_eq!(t - Duration::from_millis(500), Timestamp(500));
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Timestamp(100);
        let late = Timestamp(400);
        assert_eq!(late.duration_since(early), Duration::from_millis(300));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn test_ordering() {
        assert!(Timestamp(1).is_before(Timestamp(2)));
        assert!(!Timestamp(2).is_before(Timestamp(2)));
    }
}
