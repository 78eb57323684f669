//! The conservative synchronization barrier.
//!
//! Between rounds, the scheduler computes `round_end = now + min_link_latency`: the earliest time
//! at which some worker could possibly need to observe an event produced by another worker this
//! round. As long as every worker only executes events with `time < round_end`, an emitted
//! cross-host event can never land behind an event its own destination host has already executed,
//! which is what makes parallel execution observably identical to a single-threaded run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use sim_time::{EmulatedTime, SimulationTime};

/// Tracks the smallest nonzero link latency in use anywhere in the topology. Workers may shrink
/// this mid-run (`update_min_time_jump`) as new, shorter links come into use; it otherwise never
/// grows, since growing it could let a worker believe a narrower barrier is safe than it actually
/// is.
pub struct RunaheadTracker {
    min_nanos: AtomicU64,
}

impl RunaheadTracker {
    pub fn new(initial: SimulationTime) -> Self {
        Self {
            min_nanos: AtomicU64::new(initial.as_nanos()),
        }
    }

    pub fn get(&self) -> SimulationTime {
        SimulationTime::from_nanos(self.min_nanos.load(Ordering::Relaxed))
    }

    /// Record an observed link latency, possibly shrinking the tracked minimum.
    pub fn update_min_time_jump(&self, latency: SimulationTime) {
        self.min_nanos
            .fetch_min(latency.as_nanos(), Ordering::Relaxed);
    }
}

/// A barrier that `n` worker threads arrive at; the last arrival releases everyone. Reused across
/// rounds by calling `wait()` repeatedly — unlike a one-shot latch, this resets itself once all
/// parties have passed through.
pub struct RoundBarrier {
    state: Mutex<BarrierState>,
    condvar: Condvar,
    num_threads: usize,
}

struct BarrierState {
    arrived: usize,
    /// Flips on every completed round so a thread can detect "everyone else has now left the
    /// barrier" without racing a fresh `wait()` call that reuses the same counter.
    generation: u64,
}

impl RoundBarrier {
    pub fn new(num_threads: usize) -> Self {
        Self {
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
            }),
            condvar: Condvar::new(),
            num_threads,
        }
    }

    /// Block until all `num_threads` workers have called `wait()` for the current round.
    pub fn wait(&self) {
        if self.num_threads <= 1 {
            return;
        }

        let mut state = self.state.lock().unwrap();
        let my_generation = state.generation;
        state.arrived += 1;

        if state.arrived == self.num_threads {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.condvar.notify_all();
        } else {
            while state.generation == my_generation {
                state = self.condvar.wait(state).unwrap();
            }
        }
    }
}

/// Computes the next round's barrier time given the current time and the runahead tracker.
pub fn next_round_end(now: EmulatedTime, runahead: &RunaheadTracker) -> EmulatedTime {
    now.saturating_add(runahead.get())
}
