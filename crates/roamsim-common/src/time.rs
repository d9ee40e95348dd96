//! Simulated time.

use crate::SimError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

/// A point in (or span of) simulated time with microsecond resolution.
///
/// Integer microseconds keep event ordering exact: two events scheduled for
/// "18.5 s" compare equal and fall back to their insertion ordinal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SimTime(u64);

impl SimTime {
    /// Time zero (start of the simulation).
    pub const ZERO: SimTime = SimTime(0);
    /// Largest representable time.
    pub const MAX: SimTime = SimTime(u64::MAX);

    /// Create a time from microseconds.
    pub const fn from_micros(us: u64) -> Self {
        SimTime(us)
    }

    /// Create a time from milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        SimTime(ms.saturating_mul(1_000))
    }

    /// Create a time from seconds, rounding to the nearest microsecond.
    ///
    /// Negative and NaN inputs clamp to zero. Use [`SimTime::try_from_secs`]
    /// when the value comes from user configuration.
    pub fn from_secs(secs: f64) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return SimTime::ZERO;
        }
        let us = (secs * 1_000_000.0).round();
        if us >= u64::MAX as f64 {
            SimTime::MAX
        } else {
            SimTime(us as u64)
        }
    }

    /// Create a time from seconds, rejecting negative or non-finite values.
    pub fn try_from_secs(secs: f64) -> Result<Self, SimError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(SimError::InvalidDuration(secs));
        }
        Ok(SimTime::from_secs(secs))
    }

    /// Time to clock `size_bytes` onto a link of `rate_bps`, rounded up to
    /// the next microsecond. A rate of 0 means instantaneous.
    pub fn transmission(size_bytes: u32, rate_bps: u64) -> Self {
        if rate_bps == 0 {
            return SimTime::ZERO;
        }
        let bit_us = u64::from(size_bytes) * 8 * 1_000_000;
        SimTime(bit_us.div_ceil(rate_bps))
    }

    /// Microseconds since time zero.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Whole milliseconds since time zero.
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }

    /// Seconds since time zero as a float.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn checked_sub(self, rhs: SimTime) -> Option<SimTime> {
        self.0.checked_sub(rhs.0).map(SimTime)
    }

    pub fn saturating_sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(rhs.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        *self = *self + rhs;
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_secs_is_exact_on_tick_boundaries() {
        assert_eq!(SimTime::from_secs(18.5).as_micros(), 18_500_000);
        assert_eq!(SimTime::from_secs(0.1).as_micros(), 100_000);
        assert_eq!(SimTime::from_secs(18.5).as_secs_f64(), 18.5);
    }

    #[test]
    fn test_try_from_secs_rejects_negative() {
        assert!(matches!(
            SimTime::try_from_secs(-0.5),
            Err(SimError::InvalidDuration(_))
        ));
        assert!(SimTime::try_from_secs(f64::NAN).is_err());
        assert!(SimTime::try_from_secs(f64::INFINITY).is_err());
        assert_eq!(SimTime::try_from_secs(0.0), Ok(SimTime::ZERO));
    }

    #[test]
    fn test_arithmetic_saturates() {
        assert_eq!(SimTime::MAX + SimTime::from_micros(1), SimTime::MAX);
        assert_eq!(
            SimTime::from_millis(1).saturating_sub(SimTime::from_millis(2)),
            SimTime::ZERO
        );
        assert_eq!(SimTime::from_millis(1).checked_sub(SimTime::from_millis(2)), None);
    }

    #[test]
    fn test_transmission_rounds_up() {
        // 1450 B at 54 Mb/s = 214.8 us
        assert_eq!(SimTime::transmission(1450, 54_000_000), SimTime::from_micros(215));
        // 1000 B at 100 Mb/s = 80 us exactly
        assert_eq!(SimTime::transmission(1000, 100_000_000), SimTime::from_micros(80));
        assert_eq!(SimTime::transmission(1450, 0), SimTime::ZERO);
        assert_eq!(
            SimTime::transmission(u32::MAX, 1),
            SimTime::from_micros(u64::from(u32::MAX) * 8_000_000)
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::from_millis(33_500).to_string(), "33.500000s");
    }
}
