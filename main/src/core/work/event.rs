//! The scheduler's unit of work: a time-stamped, host-addressed task with a stable total order.

use sim_time::{EmulatedTime, HostId};

use crate::core::work::task::TaskRef;
use scheduler::SchedEvent;

/// An `Event` is created either when a packet is handed to the network (deliver-time = now +
/// link latency) or when code schedules a future callback on the local host; it is destroyed
/// after `task` runs.
#[derive(Clone)]
pub struct Event {
    time: EmulatedTime,
    src_host: HostId,
    dst_host: HostId,
    /// Monotonically increasing per-source-host counter; the final tie-break once `time` and
    /// `dst_host` are equal, so that stealing an event between worker threads can never change
    /// the order two events from the same host are observed in.
    src_sequence: u64,
    task: TaskRef,
}

impl Event {
    pub fn new(time: EmulatedTime, src_host: HostId, dst_host: HostId, src_sequence: u64, task: TaskRef) -> Self {
        Self {
            time,
            src_host,
            dst_host,
            src_sequence,
            task,
        }
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("time", &self.time)
            .field("src_host", &self.src_host)
            .field("dst_host", &self.dst_host)
            .field("src_sequence", &self.src_sequence)
            .finish_non_exhaustive()
    }
}

/// Ordering: by time, then dst host, then src host, then source sequence — see §3's Event tuple.
/// Two events with the same (time, dst, src, sequence) are the same logical event regardless of
/// whether they're the same `Arc` allocation underneath ("pointer equality collapses to
/// equality").
fn sort_key(e: &Event) -> (EmulatedTime, HostId, HostId, u64) {
    (e.time, e.dst_host, e.src_host, e.src_sequence)
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        sort_key(self) == sort_key(other)
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        sort_key(self).cmp(&sort_key(other))
    }
}

impl SchedEvent for Event {
    type HostId = HostId;

    fn time(&self) -> EmulatedTime {
        self.time
    }

    fn dst_host(&self) -> HostId {
        self.dst_host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(nanos: u64, src: u32, dst: u32, seq: u64) -> Event {
        Event::new(
            EmulatedTime::from_c_emutime(nanos).unwrap(),
            HostId::new(src),
            HostId::new(dst),
            seq,
            TaskRef::new(|_host: &mut crate::host::host::Host, _now: EmulatedTime| {}),
        )
    }

    #[test]
    fn orders_by_time_first() {
        let a = ev(100, 0, 0, 0);
        let b = ev(200, 0, 0, 0);
        assert!(a < b);
    }

    #[test]
    fn breaks_time_ties_by_dst_then_src_then_sequence() {
        let a = ev(100, 5, 1, 0);
        let b = ev(100, 5, 2, 0);
        assert!(a < b);

        let c = ev(100, 1, 1, 0);
        let d = ev(100, 2, 1, 0);
        assert!(c < d);

        let e = ev(100, 1, 1, 0);
        let f = ev(100, 1, 1, 1);
        assert!(e < f);
    }
}
