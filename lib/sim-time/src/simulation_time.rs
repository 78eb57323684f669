//! Values for working with time in simulation units (nanoseconds since simulation start).

use std::time::Duration;

/// A duration of simulated time, in nanoseconds.
#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord, Hash, Default)]
pub struct SimulationTime(u64);

/// Reserved value meaning "no time" / "invalid".
pub const SIMTIME_INVALID: u64 = u64::MAX;
pub const SIMTIME_MAX: u64 = u64::MAX - 1;
pub const SIMTIME_MIN: u64 = 0;

pub const SIMTIME_ONE_NANOSECOND: u64 = 1;
pub const SIMTIME_ONE_MICROSECOND: u64 = 1000;
pub const SIMTIME_ONE_MILLISECOND: u64 = 1_000_000;
pub const SIMTIME_ONE_SECOND: u64 = 1_000_000_000;
pub const SIMTIME_ONE_MINUTE: u64 = 60_000_000_000;
pub const SIMTIME_ONE_HOUR: u64 = 3_600_000_000_000;

impl SimulationTime {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(SIMTIME_MAX);
    pub const NANOSECOND: Self = Self(SIMTIME_ONE_NANOSECOND);
    pub const MICROSECOND: Self = Self(SIMTIME_ONE_MICROSECOND);
    pub const MILLISECOND: Self = Self(SIMTIME_ONE_MILLISECOND);
    pub const SECOND: Self = Self(SIMTIME_ONE_SECOND);
    pub const MINUTE: Self = Self(SIMTIME_ONE_MINUTE);
    pub const HOUR: Self = Self(SIMTIME_ONE_HOUR);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_c_simtime(val: u64) -> Option<Self> {
        if val == SIMTIME_INVALID || val > SIMTIME_MAX {
            None
        } else {
            Some(Self(val))
        }
    }

    pub const fn to_c_simtime(val: Option<Self>) -> u64 {
        match val {
            Some(v) => v.0,
            None => SIMTIME_INVALID,
        }
    }

    pub const fn from_duration(duration: Duration) -> Self {
        Self(duration.as_nanos() as u64)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub fn as_nanos_f64(&self) -> f64 {
        self.0 as f64
    }

    pub const fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }

    pub const fn as_millis_f64(&self) -> f64 {
        (self.0 as f64) / (SIMTIME_ONE_MILLISECOND as f64)
    }

    pub const fn as_secs_f64(&self) -> f64 {
        (self.0 as f64) / (SIMTIME_ONE_SECOND as f64)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0).min(SIMTIME_MAX))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn saturating_mul(&self, factor: usize) -> Self {
        Self(
            self.0
                .saturating_mul(factor as u64)
                .min(SIMTIME_MAX),
        )
    }

    pub fn checked_div(&self, divisor: u64) -> Option<Self> {
        if divisor == 0 {
            None
        } else {
            Some(Self(self.0 / divisor))
        }
    }
}

impl std::fmt::Display for SimulationTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

impl std::ops::Add for SimulationTime {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        self.saturating_add(rhs)
    }
}

impl std::ops::Sub for SimulationTime {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self.saturating_sub(rhs)
    }
}

impl From<Duration> for SimulationTime {
    fn from(d: Duration) -> Self {
        Self::from_duration(d)
    }
}
