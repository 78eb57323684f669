//! Adapts `tcp::TcpState`'s sans-I/O connection machine onto this workspace's descriptor model:
//! owns one `TcpState`, forwards `poll_state`/`on_segment`/`on_timer` straight through, and turns
//! its outgoing `(TcpHeader, Payload)` pairs into wire-level [`Packet`]s addressed from this host.

use bytes::Bytes;
use sim_time::HostId;
use tcp::{TcpConfig, TcpState};

use crate::network::packet::{Packet, PacketHeader};

pub struct TcpSocket {
    state: TcpState,
    host_id: HostId,
    next_packet_id: u64,
}

impl TcpSocket {
    pub fn new(config: TcpConfig, host_id: HostId) -> Self {
        Self {
            state: TcpState::new(config),
            host_id,
            next_packet_id: 0,
        }
    }

    /// Wrap an already-connected [`TcpState`] — e.g. a child handed back by
    /// [`TcpState::accept`] — as a descriptor of its own.
    pub fn from_state(state: TcpState, host_id: HostId) -> Self {
        Self {
            state,
            host_id,
            next_packet_id: 0,
        }
    }

    pub fn state(&self) -> &TcpState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TcpState {
        &mut self.state
    }

    pub fn poll_state(&self) -> tcp::PollState {
        self.state.poll_state()
    }

    /// Drain one outgoing segment as a wire [`Packet`], stamping this host as its origin and
    /// assigning the next per-socket packet id (the per-packet tie-breaker from spec.md §3).
    pub fn pop_packet(&mut self) -> Option<Packet> {
        let (header, payload) = self.state.pop_packet()?;
        let id = self.next_packet_id;
        self.next_packet_id += 1;
        Some(Packet::new(PacketHeader::Tcp(header), payload.concat(), self.host_id, id))
    }

    pub fn has_pending_packet(&self) -> bool {
        self.state.has_pending_packet()
    }
}
