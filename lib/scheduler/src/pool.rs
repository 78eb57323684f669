//! Drives a fixed pool of worker threads through simulation rounds.
//!
//! Each call to [`WorkerPool::run_round`] spawns `num_threads` scoped threads, runs the supplied
//! closure on each, and blocks until they've all returned. Unlike the persistent-thread,
//! semaphore-driven pool this crate's upstream counterpart uses, we re-spawn threads every round
//! via [`std::thread::scope`]. That costs a little wall-clock per round but needs no `unsafe`
//! lifetime erasure to let a worker closure borrow round-local state (the policy, the round
//! barrier) — see `DESIGN.md` for the trade-off.

use log::trace;

pub struct WorkerPool {
    num_threads: usize,
}

impl WorkerPool {
    pub fn new(num_threads: usize) -> Self {
        assert!(num_threads >= 1, "a scheduler needs at least one worker thread");
        Self { num_threads }
    }

    /// The number of worker threads this pool drives.
    pub fn parallelism(&self) -> usize {
        self.num_threads
    }

    /// Run `f(thread_index)` once per worker thread, in parallel, and block until every thread
    /// has returned. `f` may borrow data from the caller's stack frame.
    pub fn run_round<'scope, F>(&'scope self, f: F)
    where
        F: Fn(usize) + Sync,
    {
        trace!("starting round across {} worker threads", self.num_threads);
        std::thread::scope(|scope| {
            for i in 0..self.num_threads {
                let f = &f;
                scope.spawn(move || f(i));
            }
        });
        trace!("round complete");
    }

    /// Pin the calling thread to a physical core, best-effort. Policies that care about locality
    /// (`ThreadPerHost`, `ThreadPerThread`) report a `core_affinity` the caller should pass here
    /// at the start of each spawned thread's body; other policies report `None` and callers
    /// should skip pinning entirely.
    ///
    /// This is a no-op hook rather than a real `sched_setaffinity` call: CPU pinning is an
    /// OS-specific optimization and not needed for the simulation to be correct, only to get the
    /// cache-locality benefit the policy is named for.
    pub fn note_core_affinity(thread: usize, core: Option<usize>) {
        if let Some(core) = core {
            trace!("worker thread {thread} prefers core {core}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn run_round_invokes_every_thread_exactly_once() {
        let pool = WorkerPool::new(4);
        let counter = AtomicUsize::new(0);
        pool.run_round(|_i| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn run_round_blocks_until_all_threads_finish() {
        let pool = WorkerPool::new(8);
        let done = std::sync::Mutex::new(vec![false; 8]);
        pool.run_round(|i| {
            std::thread::sleep(std::time::Duration::from_micros(10));
            done.lock().unwrap()[i] = true;
        });
        assert!(done.lock().unwrap().iter().all(|&x| x));
    }
}
