//! The pluggable host-to-thread assignment and event-routing strategies.
//!
//! Every variant implements the same vocabulary (`add_host`, `push`, `pop`, `next_time`) so the
//! [`WorkerPool`](crate::pool::WorkerPool) doesn't need to know which one is active. We encode the
//! choice as a tagged enum rather than a trait object: work stealing and the thread/core affinity
//! trade-offs below are all about *data layout*, and an enum keeps that layout explicit and
//! inspectable instead of hiding it behind dynamic dispatch.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use sim_time::EmulatedTime;

use crate::SchedEvent;

/// Which bucket/assignment strategy the scheduler should use.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// One process-wide priority queue; all workers contend on it. Baseline only — every `pop`
    /// serializes on a single lock.
    GlobalSingle,
    /// One queue per worker thread; hosts are permanently pinned to a thread at `add_host` time.
    ThreadSingle,
    /// One queue per host; each worker owns a static, disjoint set of hosts.
    HostSingle,
    /// One queue per host, plus work stealing: an idle worker may drain another worker's host
    /// queue once its own are empty for the round.
    HostSteal,
    /// One queue per host; stealing is restricted to workers that share a physical core, trading
    /// full load-balancing for cache locality.
    ThreadPerHost,
    /// One queue per host, permanently pinned to a worker thread that is itself pinned to a
    /// physical core. No stealing at all — maximum locality, no load balancing.
    ThreadPerThread,
}

/// A thread-safe min-heap of events ordered by [`SchedEvent::time`].
struct Bucket<E> {
    heap: Mutex<BinaryHeap<Reverse<E>>>,
}

impl<E: SchedEvent> Bucket<E> {
    fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    fn push(&self, event: E) {
        self.heap.lock().unwrap().push(Reverse(event));
    }

    fn peek_time(&self) -> Option<EmulatedTime> {
        self.heap.lock().unwrap().peek().map(|Reverse(e)| e.time())
    }

    fn pop_if_before(&self, barrier: EmulatedTime) -> Option<E> {
        let mut heap = self.heap.lock().unwrap();
        let ready = matches!(heap.peek(), Some(Reverse(e)) if e.time() < barrier);
        if ready {
            heap.pop().map(|Reverse(e)| e)
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum StealScope {
    None,
    Global,
    SameCore,
}

/// Shared implementation backing `HostSingle`, `HostSteal`, `ThreadPerHost`, and `ThreadPerThread`
/// — all four route events by destination host into a per-host bucket; they differ only in
/// whether (and how widely) an idle worker may steal another worker's host queue.
struct HostBucketPolicy<E: SchedEvent> {
    buckets: Mutex<HashMap<E::HostId, Arc<Bucket<E>>>>,
    owned_hosts: Vec<Mutex<Vec<E::HostId>>>,
    core_of: Vec<usize>,
    steal_scope: StealScope,
}

impl<E: SchedEvent> HostBucketPolicy<E> {
    fn new(num_threads: usize, core_of: Vec<usize>, steal_scope: StealScope) -> Self {
        assert_eq!(core_of.len(), num_threads);
        Self {
            buckets: Mutex::new(HashMap::new()),
            owned_hosts: (0..num_threads).map(|_| Mutex::new(Vec::new())).collect(),
            core_of,
            steal_scope,
        }
    }

    fn add_host(&self, host: E::HostId, assigned_thread: usize) {
        self.buckets
            .lock()
            .unwrap()
            .entry(host)
            .or_insert_with(|| Arc::new(Bucket::new()));
        self.owned_hosts[assigned_thread].lock().unwrap().push(host);
    }

    fn push(&self, event: E) {
        let dst = event.dst_host();
        let bucket = self
            .buckets
            .lock()
            .unwrap()
            .get(&dst)
            .cloned()
            .unwrap_or_else(|| panic!("event pushed to a host that was never added to the scheduler"));
        bucket.push(event);
    }

    /// The host owned by `thread` with the earliest pending event, if any.
    fn earliest_owned(&self, thread: usize) -> Option<(E::HostId, EmulatedTime)> {
        let hosts = self.owned_hosts[thread].lock().unwrap();
        let buckets = self.buckets.lock().unwrap();
        hosts
            .iter()
            .filter_map(|h| buckets.get(h).and_then(|b| b.peek_time()).map(|t| (*h, t)))
            .min_by_key(|(_, t)| *t)
    }

    fn pop_owned(&self, thread: usize, barrier: EmulatedTime) -> Option<E> {
        let (host, time) = self.earliest_owned(thread)?;
        if time >= barrier {
            return None;
        }
        let bucket = self.buckets.lock().unwrap().get(&host).cloned()?;
        bucket.pop_if_before(barrier)
    }

    fn steal(&self, thread: usize, barrier: EmulatedTime) -> Option<E> {
        let candidate_threads: Vec<usize> = match self.steal_scope {
            StealScope::None => return None,
            StealScope::Global => (0..self.owned_hosts.len()).filter(|t| *t != thread).collect(),
            StealScope::SameCore => (0..self.owned_hosts.len())
                .filter(|t| *t != thread && self.core_of[*t] == self.core_of[thread])
                .collect(),
        };

        let mut best: Option<(E::HostId, EmulatedTime)> = None;
        for t in candidate_threads {
            if let Some((host, time)) = self.earliest_owned(t) {
                let better = match best {
                    Some((_, best_time)) => time < best_time,
                    None => true,
                };
                if time < barrier && better {
                    best = Some((host, time));
                }
            }
        }
        let (host, _) = best?;
        let bucket = self.buckets.lock().unwrap().get(&host).cloned()?;
        bucket.pop_if_before(barrier)
    }

    fn pop(&self, thread: usize, barrier: EmulatedTime) -> Option<E> {
        self.pop_owned(thread, barrier)
            .or_else(|| self.steal(thread, barrier))
    }

    fn next_time(&self, thread: usize) -> EmulatedTime {
        self.earliest_owned(thread)
            .map(|(_, t)| t)
            .unwrap_or(EmulatedTime::MAX)
    }

    fn core_affinity(&self, thread: usize) -> usize {
        self.core_of[thread]
    }
}

struct GlobalSinglePolicy<E: SchedEvent> {
    bucket: Bucket<E>,
    last_popped_nanos: AtomicU64,
}

impl<E: SchedEvent> GlobalSinglePolicy<E> {
    fn new() -> Self {
        Self {
            bucket: Bucket::new(),
            last_popped_nanos: AtomicU64::new(0),
        }
    }

    fn push(&self, event: E) {
        self.bucket.push(event);
    }

    fn pop(&self, barrier: EmulatedTime) -> Option<E> {
        let event = self.bucket.pop_if_before(barrier)?;
        let nanos = event.time().as_nanos_since_epoch();
        let prev = self.last_popped_nanos.fetch_max(nanos, Ordering::Relaxed);
        debug_assert!(
            nanos >= prev,
            "global-single scheduler observed a non-monotonic event time"
        );
        Some(event)
    }

    fn next_time(&self) -> EmulatedTime {
        self.bucket.peek_time().unwrap_or(EmulatedTime::MAX)
    }
}

struct ThreadSinglePolicy<E: SchedEvent> {
    host_to_thread: Mutex<HashMap<E::HostId, usize>>,
    thread_buckets: Vec<Bucket<E>>,
}

impl<E: SchedEvent> ThreadSinglePolicy<E> {
    fn new(num_threads: usize) -> Self {
        Self {
            host_to_thread: Mutex::new(HashMap::new()),
            thread_buckets: (0..num_threads).map(|_| Bucket::new()).collect(),
        }
    }

    fn add_host(&self, host: E::HostId, assigned_thread: usize) {
        self.host_to_thread.lock().unwrap().insert(host, assigned_thread);
    }

    fn push(&self, event: E) {
        let dst = event.dst_host();
        let thread = *self
            .host_to_thread
            .lock()
            .unwrap()
            .get(&dst)
            .unwrap_or_else(|| panic!("event pushed to a host that was never added to the scheduler"));
        self.thread_buckets[thread].push(event);
    }

    fn pop(&self, thread: usize, barrier: EmulatedTime) -> Option<E> {
        self.thread_buckets[thread].pop_if_before(barrier)
    }

    fn next_time(&self, thread: usize) -> EmulatedTime {
        self.thread_buckets[thread].peek_time().unwrap_or(EmulatedTime::MAX)
    }
}

fn core_assignment(num_threads: usize, threads_per_core: usize) -> Vec<usize> {
    let threads_per_core = threads_per_core.max(1);
    (0..num_threads).map(|t| t / threads_per_core).collect()
}

/// The active scheduling strategy. See [`PolicyKind`] for what each variant models.
pub enum Policy<E: SchedEvent> {
    GlobalSingle(GlobalSinglePolicy<E>),
    ThreadSingle(ThreadSinglePolicy<E>),
    HostSingle(HostBucketPolicy<E>),
    HostSteal(HostBucketPolicy<E>),
    ThreadPerHost(HostBucketPolicy<E>),
    ThreadPerThread(HostBucketPolicy<E>),
}

impl<E: SchedEvent> Policy<E> {
    /// `threads_per_core` only affects `ThreadPerHost` (steal scope) and `ThreadPerThread` (pin
    /// scope); other variants ignore it.
    pub fn new(kind: PolicyKind, num_threads: usize, threads_per_core: usize) -> Self {
        let identity_cores: Vec<usize> = (0..num_threads).collect();
        match kind {
            PolicyKind::GlobalSingle => Policy::GlobalSingle(GlobalSinglePolicy::new()),
            PolicyKind::ThreadSingle => Policy::ThreadSingle(ThreadSinglePolicy::new(num_threads)),
            PolicyKind::HostSingle => {
                Policy::HostSingle(HostBucketPolicy::new(num_threads, identity_cores, StealScope::None))
            }
            PolicyKind::HostSteal => {
                Policy::HostSteal(HostBucketPolicy::new(num_threads, identity_cores, StealScope::Global))
            }
            PolicyKind::ThreadPerHost => Policy::ThreadPerHost(HostBucketPolicy::new(
                num_threads,
                core_assignment(num_threads, threads_per_core),
                StealScope::SameCore,
            )),
            PolicyKind::ThreadPerThread => Policy::ThreadPerThread(HostBucketPolicy::new(
                num_threads,
                core_assignment(num_threads, threads_per_core),
                StealScope::None,
            )),
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::GlobalSingle(_) => PolicyKind::GlobalSingle,
            Policy::ThreadSingle(_) => PolicyKind::ThreadSingle,
            Policy::HostSingle(_) => PolicyKind::HostSingle,
            Policy::HostSteal(_) => PolicyKind::HostSteal,
            Policy::ThreadPerHost(_) => PolicyKind::ThreadPerHost,
            Policy::ThreadPerThread(_) => PolicyKind::ThreadPerThread,
        }
    }

    /// Bind a host to an execution locus. Must be called before any event targets that host.
    pub fn add_host(&self, host: E::HostId, assigned_thread: usize) {
        match self {
            Policy::GlobalSingle(_) => {}
            Policy::ThreadSingle(p) => p.add_host(host, assigned_thread),
            Policy::HostSingle(p) | Policy::HostSteal(p) | Policy::ThreadPerHost(p) | Policy::ThreadPerThread(p) => {
                p.add_host(host, assigned_thread)
            }
        }
    }

    /// Enqueue an event. `barrier` is accepted for symmetry with `pop` and so callers can assert
    /// they're not pushing into the already-closed current round; pushing never discards — an
    /// event with `time() >= barrier` is simply left for a later round's `pop`.
    pub fn push(&self, event: E, barrier: EmulatedTime) {
        debug_assert!(
            event.time() < EmulatedTime::MAX,
            "event scheduled at or beyond the end of simulated time"
        );
        let _ = barrier;
        match self {
            Policy::GlobalSingle(p) => p.push(event),
            Policy::ThreadSingle(p) => p.push(event),
            Policy::HostSingle(p) | Policy::HostSteal(p) | Policy::ThreadPerHost(p) | Policy::ThreadPerThread(p) => {
                p.push(event)
            }
        }
    }

    /// Return the next event with `time() < barrier` that `thread` is responsible for, or `None`.
    pub fn pop(&self, thread: usize, barrier: EmulatedTime) -> Option<E> {
        match self {
            Policy::GlobalSingle(p) => p.pop(barrier),
            Policy::ThreadSingle(p) => p.pop(thread, barrier),
            Policy::HostSingle(p) | Policy::HostSteal(p) | Policy::ThreadPerHost(p) | Policy::ThreadPerThread(p) => {
                p.pop(thread, barrier)
            }
        }
    }

    /// The smallest scheduled time across `thread`'s buckets (used to compute the next barrier).
    pub fn next_time(&self, thread: usize) -> EmulatedTime {
        match self {
            Policy::GlobalSingle(p) => p.next_time(),
            Policy::ThreadSingle(p) => p.next_time(thread),
            Policy::HostSingle(p) | Policy::HostSteal(p) | Policy::ThreadPerHost(p) | Policy::ThreadPerThread(p) => {
                p.next_time(thread)
            }
        }
    }

    /// The physical core a worker thread should pin itself to, if the policy cares.
    pub fn core_affinity(&self, thread: usize) -> Option<usize> {
        match self {
            Policy::ThreadPerHost(p) | Policy::ThreadPerThread(p) => Some(p.core_affinity(thread)),
            _ => None,
        }
    }
}
