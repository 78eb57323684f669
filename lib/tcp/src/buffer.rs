//! Send and receive byte buffers. The send buffer keeps every byte handed to it until it's
//! acknowledged, so a lost segment can be rebuilt from the original bytes; the receive buffer
//! reassembles segments that arrive out of order before handing contiguous data to the reader.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};

use crate::seq::{Seq, SeqRange};

/// Bytes written by the application but not yet acknowledged by the peer. Bytes already acked
/// are dropped; everything else stays available for retransmission.
#[derive(Debug, Default)]
pub struct SendBuffer {
    /// Sequence number of the first byte still held.
    base: u32,
    data: BytesMut,
}

impl SendBuffer {
    pub fn new(initial_seq: Seq) -> Self {
        Self {
            base: initial_seq.into(),
            data: BytesMut::new(),
        }
    }

    /// Append application bytes to the end of the buffer, to be sent starting at `next_seq`.
    pub fn write(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The sequence number one past the last byte ever written to this buffer.
    pub fn end_seq(&self) -> Seq {
        Seq::new(self.base) + self.len()
    }

    /// Read out `range` for transmission (including retransmission). Panics if any part of
    /// `range` has already been acked and dropped, or hasn't been written yet — callers must
    /// only ask for bytes known to still be held.
    pub fn read_range(&self, range: SeqRange) -> Bytes {
        let held = SeqRange::new(Seq::new(self.base), self.end_seq());
        assert_eq!(
            held.intersection(&range),
            Some(range),
            "requested range not fully held by the send buffer"
        );
        let offset = (range.start - Seq::new(self.base)) as usize;
        let len = range.len() as usize;
        Bytes::copy_from_slice(&self.data[offset..offset + len])
    }

    /// Drop every byte up to (but not including) `new_base`, the new cumulative ack point.
    pub fn advance_base(&mut self, new_base: Seq) {
        let advanced = new_base - Seq::new(self.base);
        if advanced == 0 {
            return;
        }
        let advanced = advanced as usize;
        assert!(advanced <= self.data.len(), "ack advanced past sent data");
        let _ = self.data.split_to(advanced);
        self.base = new_base.into();
    }
}

/// Bytes received from the peer, possibly out of order, waiting to be read by the application.
/// Out-of-order segments are held until the gap in front of them is filled, then the contiguous
/// prefix becomes readable.
#[derive(Debug)]
pub struct RecvBuffer {
    /// Sequence number of the next byte the application expects to read.
    next_expected: u32,
    contiguous: BytesMut,
    /// Segments received ahead of `next_expected`, keyed by their starting offset.
    out_of_order: BTreeMap<u32, Bytes>,
}

impl RecvBuffer {
    pub fn new(initial_seq: Seq) -> Self {
        Self {
            next_expected: initial_seq.into(),
            contiguous: BytesMut::new(),
            out_of_order: BTreeMap::new(),
        }
    }

    pub fn next_expected(&self) -> Seq {
        Seq::new(self.next_expected)
    }

    /// Insert a segment starting at `seq`. Returns the set of SACK-reportable ranges this
    /// segment (and any out-of-order data it connects to) now covers beyond `next_expected`.
    pub fn insert(&mut self, seq: Seq, data: Bytes) {
        if data.is_empty() {
            return;
        }

        let start: u32 = seq.into();
        let relative = start.wrapping_sub(self.next_expected);

        if relative == 0 {
            self.contiguous.extend_from_slice(&data);
            self.next_expected = self.next_expected.wrapping_add(data.len() as u32);
            self.absorb_out_of_order();
        } else {
            // arrived ahead of the next expected byte (or entirely behind it, in which case
            // insertion is a harmless no-op overwrite of already-delivered data).
            let range = SeqRange::new(seq, seq + data.len() as u32);
            if range.contains(Seq::new(self.next_expected)) {
                // overlaps the front: trim to start exactly at next_expected.
                let skip = self.next_expected.wrapping_sub(start) as usize;
                self.contiguous.extend_from_slice(&data[skip..]);
                self.next_expected = self.next_expected.wrapping_add((data.len() - skip) as u32);
                self.absorb_out_of_order();
            } else if !self.already_delivered(start) {
                self.out_of_order.insert(start, data);
            }
        }
    }

    fn already_delivered(&self, start: u32) -> bool {
        // `start` is "behind" next_expected in wrapping-distance terms.
        start.wrapping_sub(self.next_expected) > (u32::MAX / 2)
    }

    fn absorb_out_of_order(&mut self) {
        loop {
            let Some((&start, _)) = self.out_of_order.first_key_value() else {
                break;
            };
            if start != self.next_expected {
                break;
            }
            let data = self.out_of_order.remove(&start).unwrap();
            self.contiguous.extend_from_slice(&data);
            self.next_expected = self.next_expected.wrapping_add(data.len() as u32);
        }
    }

    /// Report the out-of-order blocks currently held, for building a SACK header.
    pub fn sack_blocks(&self) -> Vec<(u32, u32)> {
        self.out_of_order
            .iter()
            .map(|(&start, data)| (start, start.wrapping_add(data.len() as u32)))
            .collect()
    }

    pub fn readable_len(&self) -> usize {
        self.contiguous.len()
    }

    /// Remove and return up to `max_len` contiguous bytes for the application to read.
    pub fn read(&mut self, max_len: usize) -> Bytes {
        let take = max_len.min(self.contiguous.len());
        self.contiguous.split_to(take).freeze()
    }
}
