//! Aggregate counters the controller reports once the run ends.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use sim_time::EmulatedTime;

#[derive(Debug)]
pub struct SimStats {
    events_executed: AtomicU64,
    final_time_nanos: AtomicU64,
    had_fatal_error: AtomicBool,
}

impl SimStats {
    pub fn new() -> Self {
        Self {
            events_executed: AtomicU64::new(0),
            final_time_nanos: AtomicU64::new(0),
            had_fatal_error: AtomicBool::new(false),
        }
    }

    pub fn record_event(&self, time: EmulatedTime) {
        self.events_executed.fetch_add(1, Ordering::Relaxed);
        self.final_time_nanos
            .fetch_max(time.as_nanos_since_epoch(), Ordering::Relaxed);
    }

    pub fn record_fatal_error(&self) {
        self.had_fatal_error.store(true, Ordering::SeqCst);
    }

    pub fn events_executed(&self) -> u64 {
        self.events_executed.load(Ordering::Relaxed)
    }

    pub fn final_time(&self) -> EmulatedTime {
        EmulatedTime::from_c_emutime(self.final_time_nanos.load(Ordering::Relaxed))
            .unwrap_or(EmulatedTime::MIN)
    }

    pub fn had_fatal_error(&self) -> bool {
        self.had_fatal_error.load(Ordering::SeqCst)
    }
}

impl Default for SimStats {
    fn default() -> Self {
        Self::new()
    }
}
