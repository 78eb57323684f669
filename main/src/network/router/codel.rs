//! Controlled-Delay (CoDel) active queue management. <https://www.rfc-editor.org/rfc/rfc8289>
//!
//! Target delay is 10ms (RFC 8289 recommends 5ms for internet routers; Shadow widens it to 10ms)
//! and the control interval is 100ms, per §4.2.

use std::collections::VecDeque;
use std::time::Duration;

use sim_time::{EmulatedTime, SimulationTime};

use crate::network::packet::Packet;
use crate::network::MTU_BYTES;

const TARGET: SimulationTime = SimulationTime::from_duration(Duration::from_millis(10));
const INTERVAL: SimulationTime = SimulationTime::from_duration(Duration::from_millis(100));

#[derive(PartialEq, Eq, Debug)]
enum Mode {
    Store,
    Drop,
}

struct Element {
    packet: Packet,
    enqueue_ts: EmulatedTime,
}

struct PopItem {
    packet: Packet,
    ok_to_drop: bool,
}

pub struct CoDelQueue {
    elements: VecDeque<Element>,
    total_bytes_stored: u64,
    mode: Mode,
    /// Set once a standing delay above `TARGET` has persisted; cleared whenever the delay drops
    /// back below target. Entering drop mode requires a full `INTERVAL` past this point.
    interval_end: Option<EmulatedTime>,
    drop_next: Option<EmulatedTime>,
    current_drop_count: usize,
    previous_drop_count: usize,
}

impl CoDelQueue {
    pub fn new() -> Self {
        Self {
            elements: VecDeque::new(),
            total_bytes_stored: 0,
            mode: Mode::Store,
            interval_end: None,
            drop_next: None,
            current_drop_count: 0,
            previous_drop_count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn push(&mut self, packet: Packet, now: EmulatedTime) {
        self.total_bytes_stored += packet.len() as u64;
        self.elements.push_back(Element { packet, enqueue_ts: now });
    }

    /// Pop the next packet that survives CoDel's drop decision, or `None` if the queue drains
    /// entirely before one does.
    pub fn pop(&mut self, now: EmulatedTime) -> Option<Packet> {
        match self.dodequeue(now) {
            Some(item) if item.ok_to_drop => match self.mode {
                Mode::Store => self.drop_from_store_mode(now, item.packet),
                Mode::Drop => self.drop_from_drop_mode(now, item.packet),
            },
            Some(item) => {
                self.mode = Mode::Store;
                Some(item.packet)
            }
            None => {
                self.mode = Mode::Store;
                None
            }
        }
    }

    fn drop_from_store_mode(&mut self, now: EmulatedTime, packet: Packet) -> Option<Packet> {
        drop(packet); // the RFC drops the packet that tripped us into drop mode.
        let next = self.dodequeue(now);
        self.mode = Mode::Drop;

        let delta = self.current_drop_count.saturating_sub(self.previous_drop_count);
        self.current_drop_count = if self.was_dropping_recently(now) && delta > 1 { delta } else { 1 };
        self.drop_next = Some(Self::apply_control_law(now, self.current_drop_count));
        self.previous_drop_count = self.current_drop_count;

        next.map(|item| item.packet)
    }

    fn drop_from_drop_mode(&mut self, now: EmulatedTime, packet: Packet) -> Option<Packet> {
        let mut item = Some(PopItem { packet, ok_to_drop: true });

        while let Some(current) = item.take() {
            if self.mode != Mode::Drop || !self.should_drop(now) {
                item = Some(current);
                break;
            }
            drop(current.packet);
            self.current_drop_count += 1;
            let next = self.dodequeue(now);
            match &next {
                Some(n) if n.ok_to_drop => {
                    self.drop_next = Some(Self::apply_control_law(self.drop_next.unwrap(), self.current_drop_count));
                }
                _ => self.mode = Mode::Store,
            }
            item = next;
        }

        item.map(|i| i.packet)
    }

    fn dodequeue(&mut self, now: EmulatedTime) -> Option<PopItem> {
        let element = self.elements.pop_front()?;
        self.total_bytes_stored = self.total_bytes_stored.saturating_sub(element.packet.len() as u64);
        let sojourn = now.saturating_duration_since(&element.enqueue_ts);
        let ok_to_drop = self.process_standing_delay(now, sojourn);
        Some(PopItem {
            packet: element.packet,
            ok_to_drop,
        })
    }

    fn process_standing_delay(&mut self, now: EmulatedTime, sojourn: SimulationTime) -> bool {
        if sojourn < TARGET || self.total_bytes_stored <= MTU_BYTES as u64 {
            self.interval_end = None;
            return false;
        }
        match self.interval_end {
            Some(end) => now >= end,
            None => {
                self.interval_end = Some(now.saturating_add(INTERVAL));
                false
            }
        }
    }

    fn should_drop(&self, now: EmulatedTime) -> bool {
        matches!(self.drop_next, Some(next) if now >= next)
    }

    fn was_dropping_recently(&self, now: EmulatedTime) -> bool {
        match self.drop_next {
            Some(next) => now.saturating_duration_since(&next) < INTERVAL.saturating_mul(16),
            None => false,
        }
    }

    /// `t_next = t_last + interval / sqrt(count)`.
    fn apply_control_law(time: EmulatedTime, count: usize) -> EmulatedTime {
        let sqrt_count = if count == 0 { 1.0 } else { (count as f64).sqrt() };
        let increment = SimulationTime::from_nanos((INTERVAL.as_nanos_f64() / sqrt_count).round() as u64);
        time.saturating_add(increment)
    }
}

impl Default for CoDelQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::{Packet, PacketHeader, UdpHeader};
    use std::net::Ipv4Addr;

    fn millis(start: u64, ms: u64) -> EmulatedTime {
        EmulatedTime::from_c_emutime((start + ms) * 1_000_000).unwrap()
    }

    fn mock_packet() -> Packet {
        Packet::new(
            PacketHeader::Udp(UdpHeader {
                src: std::net::SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1000),
                dst: std::net::SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 2000),
            }),
            bytes::Bytes::from_static(&[0u8; 64]),
            sim_time::HostId::new(0),
            0,
        )
    }

    #[test]
    fn empty_queue_pops_none() {
        let mut q = CoDelQueue::new();
        assert!(q.pop(millis(1000, 0)).is_none());
    }

    #[test]
    fn push_then_pop_returns_everything_when_under_target() {
        let mut q = CoDelQueue::new();
        for _ in 0..5 {
            q.push(mock_packet(), millis(1000, 0));
        }
        assert_eq!(q.len(), 5);
        for _ in 0..5 {
            assert!(q.pop(millis(1000, 1)).is_some());
        }
        assert!(q.is_empty());
    }

    #[test]
    fn enters_drop_mode_after_sustained_delay_above_target() {
        let mut q = CoDelQueue::new();
        let start = millis(1000, 0);
        for _ in 0..6 {
            q.push(mock_packet(), start);
        }
        assert!(q.total_bytes_stored > MTU_BYTES as u64);

        q.pop(start.saturating_add(TARGET - SimulationTime::from_nanos(1)));
        assert_eq!(q.mode, Mode::Store);

        q.pop(start.saturating_add(TARGET));
        assert_eq!(q.mode, Mode::Store);

        // a full interval above target: enters drop mode.
        q.pop(start.saturating_add(TARGET + INTERVAL));
        assert_eq!(q.mode, Mode::Drop);
    }
}
