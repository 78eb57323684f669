//! Deals with instances of absolute time in a simulation.

use crate::simulation_time::{self, SimulationTime};

/// An instant in time (analogous to [`std::time::Instant`]) in the simulation.
///
/// Internally represented as nanoseconds since the Unix epoch. Emulated time is simulation time
/// plus [`EmulatedTime::SIMULATION_START`], so that guest code asking for the wallclock sees a
/// plausible recent date instead of the Unix epoch.
#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord, Hash)]
pub struct EmulatedTime(u64);

pub const EMUTIME_INVALID: u64 = u64::MAX;
pub const EMUTIME_MAX: u64 = u64::MAX - 1;
pub const EMUTIME_MIN: u64 = 0;

/// Nanoseconds from the Unix epoch to 2000-01-01T00:00:00Z.
pub const SIMULATION_START_SEC: u64 = 946_684_800;
pub const EMUTIME_SIMULATION_START: u64 = SIMULATION_START_SEC * simulation_time::SIMTIME_ONE_SECOND;

impl EmulatedTime {
    pub const SIMULATION_START: Self = Self(EMUTIME_SIMULATION_START);
    pub const UNIX_EPOCH: Self = Self(0);
    pub const MAX: Self = Self(EMUTIME_MAX);
    pub const MIN: Self = Self(0);

    pub const fn from_abs_simtime(simtime: SimulationTime) -> Self {
        Self(Self::SIMULATION_START.0.saturating_add(simtime.as_nanos()))
    }

    pub const fn to_abs_simtime(&self) -> SimulationTime {
        SimulationTime::from_nanos(self.0.saturating_sub(EMUTIME_SIMULATION_START))
    }

    pub const fn from_c_emutime(val: u64) -> Option<Self> {
        if val == EMUTIME_INVALID || val > EMUTIME_MAX {
            None
        } else {
            Some(Self(val))
        }
    }

    pub const fn to_c_emutime(val: Option<Self>) -> u64 {
        match val {
            Some(v) => v.0,
            None => EMUTIME_INVALID,
        }
    }

    pub fn saturating_add(&self, dur: SimulationTime) -> Self {
        Self(self.0.saturating_add(dur.as_nanos()).min(EMUTIME_MAX))
    }

    pub fn saturating_sub(&self, dur: SimulationTime) -> Self {
        Self(self.0.saturating_sub(dur.as_nanos()))
    }

    /// Duration from `earlier` to `self`. Saturates to zero if `earlier` is later than `self`,
    /// which can legitimately happen when comparing timestamps across a clock correction.
    pub fn saturating_duration_since(&self, earlier: &Self) -> SimulationTime {
        SimulationTime::from_nanos(self.0.saturating_sub(earlier.0))
    }

    pub const fn as_nanos_since_epoch(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EmulatedTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns-since-epoch", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_start_is_y2k() {
        let t = EmulatedTime::from_abs_simtime(SimulationTime::ZERO);
        assert_eq!(t, EmulatedTime::SIMULATION_START);
    }

    #[test]
    fn roundtrips_abs_simtime() {
        let s = SimulationTime::from_nanos(12_345);
        assert_eq!(EmulatedTime::from_abs_simtime(s).to_abs_simtime(), s);
    }

    #[test]
    fn duration_since_saturates_on_reversed_order() {
        let a = EmulatedTime::SIMULATION_START;
        let b = a.saturating_add(SimulationTime::from_nanos(10));
        assert_eq!(a.saturating_duration_since(&b), SimulationTime::ZERO);
        assert_eq!(b.saturating_duration_since(&a), SimulationTime::from_nanos(10));
    }
}
