//! A refillable rate limiter used by [`crate::host::network_interface::NetworkInterface`]'s
//! egress/ingress bandwidth caps.

use sim_time::{EmulatedTime, SimulationTime};

pub struct TokenBucket {
    capacity: u64,
    balance: u64,
    refill_size: u64,
    refill_interval: SimulationTime,
    last_refill: EmulatedTime,
}

impl TokenBucket {
    /// `capacity` enables burstiness; the long-term rate is `refill_size` tokens added every
    /// `refill_interval`. Returns `None` if any argument is non-positive.
    pub fn new(capacity: u64, refill_size: u64, refill_interval: SimulationTime, now: EmulatedTime) -> Option<Self> {
        if capacity == 0 || refill_size == 0 || refill_interval == SimulationTime::ZERO {
            return None;
        }
        Some(Self {
            capacity,
            balance: capacity,
            refill_size,
            refill_interval,
            last_refill: now,
        })
    }

    /// Remove `size` tokens if and only if the bucket currently holds at least that many.
    /// Returns the updated balance on success, or the duration until the next refill on failure.
    /// Removing zero tokens always succeeds.
    pub fn conforming_remove(&mut self, size: u64, now: EmulatedTime) -> Result<u64, SimulationTime> {
        let next_refill_span = self.lazy_refill(now);
        self.balance = self.balance.checked_sub(size).ok_or(next_refill_span)?;
        Ok(self.balance)
    }

    /// Applies any refill events that should have already occurred (the bucket is only touched
    /// when used, so refills are computed lazily rather than via a scheduled task per interval).
    /// Returns the duration until the next refill.
    fn lazy_refill(&mut self, now: EmulatedTime) -> SimulationTime {
        let mut span = now.saturating_duration_since(&self.last_refill);

        if span >= self.refill_interval {
            let num_refills = span.as_nanos() / self.refill_interval.as_nanos();
            let num_tokens = self.refill_size.saturating_mul(num_refills);
            debug_assert!(num_tokens > 0);

            self.balance = self.balance.saturating_add(num_tokens).min(self.capacity);

            let elapsed = self.refill_interval.saturating_mul(num_refills as usize);
            self.last_refill = self.last_refill.saturating_add(elapsed);
            span = now.saturating_duration_since(&self.last_refill);
        }

        debug_assert!(span < self.refill_interval);
        self.refill_interval.saturating_sub(span)
    }
}
