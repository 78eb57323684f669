//! A router assists with moving packets between hosts across the simulated network. Each host
//! owns one, feeding it packets destined for that host as they arrive off the topology and
//! draining it (subject to CoDel's drop decisions) as the host's network interfaces pull work.

pub mod codel;

use sim_time::EmulatedTime;

use self::codel::CoDelQueue;
use crate::network::packet::Packet;

pub struct Router {
    inbound_packets: CoDelQueue,
}

impl Router {
    pub fn new() -> Self {
        Self {
            inbound_packets: CoDelQueue::new(),
        }
    }

    /// Returns `true` if the router changed from empty to non-empty.
    pub fn push(&mut self, packet: Packet, now: EmulatedTime) -> bool {
        let was_empty = self.inbound_packets.is_empty();
        self.inbound_packets.push(packet, now);
        was_empty && !self.inbound_packets.is_empty()
    }

    pub fn pop(&mut self, now: EmulatedTime) -> Option<Packet> {
        self.inbound_packets.pop(now)
    }

    pub fn is_empty(&self) -> bool {
        self.inbound_packets.is_empty()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}
