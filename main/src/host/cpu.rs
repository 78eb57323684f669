//! Accounts for time spent running guest code on the native CPU, translating it into a
//! corresponding delay the simulated CPU imposes before the host may run again (§4.6's per-host
//! CPU model: frequency, delay threshold, precision).

use std::time::Duration;

use sim_time::{EmulatedTime, SimulationTime};

pub struct Cpu {
    simulated_frequency_hz: u64,
    native_frequency_hz: u64,
    threshold: Option<SimulationTime>,
    precision: Option<SimulationTime>,
    now: EmulatedTime,
    time_cpu_available: EmulatedTime,
}

impl Cpu {
    /// `threshold`: `None` never reports a delay; otherwise a delay is only reported once it
    /// exceeds this amount. `precision`: if set, native delays are rounded to this granularity
    /// (round-half-up). Panics if `precision` is `Some(SimulationTime::ZERO)`.
    pub fn new(
        simulated_frequency_hz: u64,
        native_frequency_hz: u64,
        threshold: Option<SimulationTime>,
        precision: Option<SimulationTime>,
    ) -> Self {
        if let Some(precision) = precision {
            assert!(precision > SimulationTime::ZERO);
        }
        Self {
            simulated_frequency_hz,
            native_frequency_hz,
            threshold,
            precision,
            now: EmulatedTime::MIN,
            time_cpu_available: EmulatedTime::MIN,
        }
    }

    pub fn update_time(&mut self, now: EmulatedTime) {
        self.now = now;
    }

    /// Account for `native_delay` spent natively executing guest code.
    pub fn add_delay(&mut self, native_delay: Duration) {
        let cycles = native_delay
            .as_nanos()
            .checked_mul(self.native_frequency_hz as u128)
            .unwrap();
        let simulated_delay_nanos = cycles / (self.simulated_frequency_hz as u128);
        let mut adjusted_delay = SimulationTime::from_nanos(simulated_delay_nanos.try_into().unwrap());

        if let Some(precision) = self.precision {
            let remainder = SimulationTime::from_nanos(adjusted_delay.as_nanos() % precision.as_nanos());
            adjusted_delay = adjusted_delay.saturating_sub(remainder);

            let half_precision = SimulationTime::from_nanos(precision.as_nanos() / 2);
            if remainder >= half_precision {
                adjusted_delay = adjusted_delay.saturating_add(precision);
            }
        }

        self.time_cpu_available = self.time_cpu_available.saturating_add(adjusted_delay);
    }

    /// The simulated delay until this CPU is ready to run again.
    pub fn delay(&self) -> SimulationTime {
        let Some(threshold) = self.threshold else {
            return SimulationTime::ZERO;
        };
        let built_up_delay = self.time_cpu_available.saturating_duration_since(&self.now);
        if built_up_delay > threshold {
            built_up_delay
        } else {
            SimulationTime::ZERO
        }
    }
}
