//! Time utilities and constants for Ratecast.

use chrono::{DateTime, Utc};

/// Timing and simulation constants.
pub mod constants {
    use std::time::Duration;

    /// Delay between demand-driven refresh cycles (10 seconds).
    pub const fn default_refresh_delay() -> Duration {
        Duration::from_secs(10)
    }

    /// Upstream HTTP request timeout (10 seconds).
    pub const fn default_upstream_timeout() -> Duration {
        Duration::from_secs(10)
    }

    /// Lower bound of the simulated multiplicative perturbation.
    pub const PERTURBATION_MIN: f64 = 0.95;

    /// Upper bound (exclusive) of the simulated multiplicative perturbation.
    pub const PERTURBATION_MAX: f64 = 1.05;

    /// Upper bound (exclusive) of a freshly simulated rate.
    pub const SIMULATED_RATE_MAX: f64 = 100.0;

    /// Default currency that all rates are quoted against.
    pub const DEFAULT_BASE_CURRENCY: &str = "USD";
}

/// A timestamp with timezone (always UTC for Ratecast).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Convert provider unix seconds into a timestamp.
///
/// Out-of-range values fall back to the current time so a bad upstream
/// clock never invalidates a snapshot.
pub fn from_unix_seconds(seconds: i64) -> Timestamp {
    DateTime::from_timestamp(seconds, 0).unwrap_or_else(now)
}

/// Current time as unix seconds, the shape the upstream provider uses.
pub fn unix_seconds_now() -> i64 {
    now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_unix_seconds() {
        let ts = from_unix_seconds(1_700_000_000);
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_from_unix_seconds_out_of_range() {
        let before = now();
        let ts = from_unix_seconds(i64::MAX);
        assert!(ts >= before);
    }

    #[test]
    fn test_perturbation_bounds() {
        assert!(constants::PERTURBATION_MIN < 1.0);
        assert!(constants::PERTURBATION_MAX > 1.0);
    }
}
