//! Whole-second durations used by waiter configuration.
//!
//! Step Functions retriers and log group retention only accept whole
//! seconds and days, so the waiter is configured with this type rather than
//! [`std::time::Duration`].

use serde::{Deserialize, Serialize};

/// Duration type representing a time interval in whole seconds.
///
/// # Example
///
/// ```
/// use cfn_custom_resource_provider::Duration;
///
/// assert_eq!(Duration::from_seconds(30).to_seconds(), 30);
/// assert_eq!(Duration::from_minutes(30).to_seconds(), 1800);
/// assert_eq!(Duration::from_hours(1).to_seconds(), 3600);
/// assert_eq!(Duration::from_days(60).to_days(), 60);
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Duration {
    seconds: u64,
}

impl Duration {
    /// Creates a new Duration from the given number of seconds.
    pub const fn from_seconds(seconds: u64) -> Self {
        Self { seconds }
    }

    /// Creates a new Duration from the given number of minutes.
    pub const fn from_minutes(minutes: u64) -> Self {
        Self {
            seconds: minutes * 60,
        }
    }

    /// Creates a new Duration from the given number of hours.
    pub const fn from_hours(hours: u64) -> Self {
        Self {
            seconds: hours * 3600,
        }
    }

    /// Creates a new Duration from the given number of days.
    pub const fn from_days(days: u64) -> Self {
        Self {
            seconds: days * 86400,
        }
    }

    /// Returns the total number of seconds in this duration.
    pub const fn to_seconds(&self) -> u64 {
        self.seconds
    }

    /// Returns the number of whole days in this duration, rounding down.
    pub const fn to_days(&self) -> u64 {
        self.seconds / 86400
    }

    /// Returns true if this duration is zero.
    pub const fn is_zero(&self) -> bool {
        self.seconds == 0
    }
}

impl From<Duration> for std::time::Duration {
    fn from(duration: Duration) -> Self {
        std::time::Duration::from_secs(duration.seconds)
    }
}

impl std::fmt::Display for Duration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}s", self.seconds)
    }
}
