//! Tracks which sent bytes are outstanding, lost, or already retransmitted, so that a lost byte
//! range is retransmitted exactly once even if multiple signals (duplicate acks, SACK, RTO) all
//! point at it.

use crate::seq::{Seq, SeqRange};

/// One byte range that has been sent but not yet acknowledged.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Outstanding {
    range: SeqRange,
    /// Set once this range has been queued for retransmission, so a second loss signal covering
    /// the same bytes doesn't queue it twice.
    retransmit_queued: bool,
}

/// Scoreboard of in-flight data, built from the sender's perspective: every byte between
/// `send_una` and `send_next` is either outstanding, SACKed (received but not yet advancing
/// `send_una`), or queued for retransmission.
#[derive(Debug, Default)]
pub struct RetransmitTracker {
    outstanding: Vec<Outstanding>,
    sacked: Vec<SeqRange>,
    pending_retransmit: Vec<SeqRange>,
}

impl RetransmitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `range` was just sent (or retransmitted) and is now outstanding.
    pub fn on_segment_sent(&mut self, range: SeqRange) {
        if range.is_empty() {
            return;
        }
        self.outstanding.push(Outstanding {
            range,
            retransmit_queued: false,
        });
    }

    /// The cumulative ack advanced to `new_una`: drop every outstanding/sacked range now fully
    /// covered.
    pub fn on_cumulative_ack(&mut self, una: Seq, new_una: Seq) {
        let acked = SeqRange::new(una, new_una);
        self.outstanding.retain(|o| acked.intersection(&o.range) != Some(o.range));
        self.sacked.retain(|s| acked.intersection(s) != Some(*s));
        self.pending_retransmit
            .retain(|p| acked.intersection(p) != Some(*p));
    }

    /// Record a SACK block reported by the far end: those bytes are received, so they should not
    /// be retransmitted even though `send_una` hasn't advanced past them.
    pub fn on_sack_block(&mut self, block: SeqRange) {
        if block.is_empty() {
            return;
        }
        self.sacked.push(block);
    }

    /// Fast retransmit fired: queue every outstanding range not already known to be SACKed.
    pub fn on_fast_retransmit(&mut self) {
        for o in self.outstanding.iter_mut() {
            if o.retransmit_queued {
                continue;
            }
            let remaining = self.sacked.iter().fold(vec![o.range], |ranges, sack| {
                ranges
                    .into_iter()
                    .flat_map(|r| subtract(r, *sack))
                    .collect()
            });
            if !remaining.is_empty() {
                o.retransmit_queued = true;
                self.pending_retransmit.extend(remaining);
            }
        }
    }

    /// RTO fired: the entire outstanding window is presumed lost and must be resent, including
    /// anything previously marked SACKed (the far end's reassembly buffer state is unknown after
    /// a full timeout).
    pub fn on_timeout(&mut self) {
        self.sacked.clear();
        for o in self.outstanding.iter_mut() {
            o.retransmit_queued = true;
        }
        self.pending_retransmit = self.outstanding.iter().map(|o| o.range).collect();
    }

    /// Take (and clear) the set of byte ranges that need to go back out on the wire.
    pub fn drain_pending_retransmit(&mut self) -> Vec<SeqRange> {
        std::mem::take(&mut self.pending_retransmit)
    }

    pub fn outstanding_bytes(&self) -> u32 {
        self.outstanding.iter().map(|o| o.range.len()).sum()
    }

    pub fn has_pending_retransmit(&self) -> bool {
        !self.pending_retransmit.is_empty()
    }
}

/// `a - b`, as zero, one, or two disjoint remaining ranges (subtracting from the middle of `a`
/// splits it in two).
fn subtract(a: SeqRange, b: SeqRange) -> Vec<SeqRange> {
    match a.intersection(&b) {
        None => vec![a],
        Some(overlap) => {
            let mut out = Vec::new();
            if a.start != overlap.start {
                out.push(SeqRange::new(a.start, overlap.start));
            }
            if overlap.end != a.end {
                out.push(SeqRange::new(overlap.end, a.end));
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u32, end: u32) -> SeqRange {
        SeqRange::new(Seq::new(start), Seq::new(end))
    }

    #[test]
    fn fast_retransmit_queues_unsacked_outstanding_bytes() {
        let mut t = RetransmitTracker::new();
        t.on_segment_sent(range(0, 100));
        t.on_fast_retransmit();
        let pending = t.drain_pending_retransmit();
        assert_eq!(pending, vec![range(0, 100)]);
    }

    #[test]
    fn sacked_bytes_are_excluded_from_retransmission() {
        let mut t = RetransmitTracker::new();
        t.on_segment_sent(range(0, 100));
        t.on_sack_block(range(40, 60));
        t.on_fast_retransmit();
        let pending = t.drain_pending_retransmit();
        assert_eq!(pending, vec![range(0, 40), range(60, 100)]);
    }

    #[test]
    fn a_lost_range_is_not_queued_twice() {
        let mut t = RetransmitTracker::new();
        t.on_segment_sent(range(0, 100));
        t.on_fast_retransmit();
        t.drain_pending_retransmit();
        t.on_fast_retransmit();
        assert!(t.drain_pending_retransmit().is_empty());
    }

    #[test]
    fn cumulative_ack_clears_outstanding_and_sacked_state() {
        let mut t = RetransmitTracker::new();
        t.on_segment_sent(range(0, 100));
        t.on_sack_block(range(40, 60));
        t.on_cumulative_ack(Seq::new(0), Seq::new(100));
        assert_eq!(t.outstanding_bytes(), 0);
        t.on_fast_retransmit();
        assert!(!t.has_pending_retransmit());
    }

    #[test]
    fn timeout_resends_the_whole_outstanding_window_even_if_sacked() {
        let mut t = RetransmitTracker::new();
        t.on_segment_sent(range(0, 100));
        t.on_sack_block(range(40, 60));
        t.on_timeout();
        let pending = t.drain_pending_retransmit();
        assert_eq!(pending, vec![range(0, 100)]);
    }
}
