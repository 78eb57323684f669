//! A `timerfd`-style descriptor. Grounded on the teacher's `host/timer.rs`, but re-derived as a
//! pull rather than push model (consistent with `lib/tcp`'s `next_timer_deadline`/`on_timer`):
//! the host's event loop calls [`Timer::on_timer`] when its own `next_expire_time` is reached,
//! rather than the timer pushing an `Arc<AtomicRefCell<_>>`-shared callback into the scheduler
//! itself.

use sim_time::{EmulatedTime, SimulationTime};

pub struct Timer {
    next_expire_time: Option<EmulatedTime>,
    expire_interval: SimulationTime,
    expiration_count: u64,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            next_expire_time: None,
            expire_interval: SimulationTime::ZERO,
            expiration_count: 0,
        }
    }

    pub fn arm(&mut self, expire_time: EmulatedTime, expire_interval: SimulationTime) {
        self.next_expire_time = Some(expire_time);
        self.expire_interval = expire_interval;
    }

    pub fn disarm(&mut self) {
        self.next_expire_time = None;
        self.expire_interval = SimulationTime::ZERO;
        self.expiration_count = 0;
    }

    pub fn next_expire_time(&self) -> Option<EmulatedTime> {
        self.next_expire_time
    }

    pub fn interval(&self) -> SimulationTime {
        self.expire_interval
    }

    /// `read(2)` on a timerfd: returns the accumulated expiration count and resets it to zero.
    pub fn consume_expiration_count(&mut self) -> u64 {
        std::mem::take(&mut self.expiration_count)
    }

    /// Advance the timer to `now`. Returns how many expirations occurred since the last call.
    pub fn on_timer(&mut self, now: EmulatedTime) -> u64 {
        let Some(next) = self.next_expire_time else {
            return 0;
        };
        if now < next {
            return 0;
        }
        let fired = if self.expire_interval > SimulationTime::ZERO {
            let elapsed = now.saturating_duration_since(&next);
            let extra_periods = elapsed.as_nanos() / self.expire_interval.as_nanos();
            let fired = 1 + extra_periods;
            let advance = self.expire_interval.saturating_mul((fired) as usize);
            self.next_expire_time = Some(next.saturating_add(advance));
            fired
        } else {
            self.next_expire_time = None;
            1
        };
        self.expiration_count += fired;
        fired
    }

    pub fn poll_state(&self) -> tcp::PollState {
        if self.expiration_count > 0 {
            tcp::PollState::READABLE
        } else {
            tcp::PollState::empty()
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> SimulationTime {
        SimulationTime::from_duration(Duration::from_millis(n))
    }

    #[test]
    fn unarmed_timer_never_fires() {
        let mut t = Timer::new();
        assert_eq!(t.on_timer(EmulatedTime::MIN), 0);
    }

    #[test]
    fn one_shot_fires_once_then_disarms() {
        let mut t = Timer::new();
        let expire_at = EmulatedTime::MIN.saturating_add(ms(100));
        t.arm(expire_at, SimulationTime::ZERO);
        assert_eq!(t.on_timer(EmulatedTime::MIN.saturating_add(ms(50))), 0);
        assert_eq!(t.on_timer(expire_at), 1);
        assert_eq!(t.consume_expiration_count(), 1);
        assert!(t.next_expire_time().is_none());
        assert_eq!(t.on_timer(expire_at.saturating_add(ms(1000))), 0);
    }

    #[test]
    fn periodic_timer_accumulates_missed_periods() {
        let mut t = Timer::new();
        let start = EmulatedTime::MIN.saturating_add(ms(100));
        t.arm(start, ms(10));
        // check long after several periods have elapsed: 1 initial + 5 more 10ms periods.
        let fired = t.on_timer(start.saturating_add(ms(55)));
        assert_eq!(fired, 6);
        assert_eq!(t.consume_expiration_count(), 6);
    }

    #[test]
    fn poll_state_readable_only_after_firing() {
        let mut t = Timer::new();
        assert_eq!(t.poll_state(), tcp::PollState::empty());
        t.arm(EmulatedTime::MIN, SimulationTime::ZERO);
        t.on_timer(EmulatedTime::MIN);
        assert!(t.poll_state().contains(tcp::PollState::READABLE));
    }
}
