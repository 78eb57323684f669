//! The connection state machine: the eleven RFC 9293 states plus the per-state data each one
//! needs (a `LISTEN` state needs an accept backlog; an `ESTABLISHED` state needs send/receive
//! buffers and congestion control; `TIME_WAIT` needs nothing but a timer).

use std::collections::VecDeque;
use std::net::SocketAddrV4;

use sim_time::EmulatedTime;

use crate::buffer::{RecvBuffer, SendBuffer};
use crate::congestion::{CongestionControl, CongestionControlKind};
use crate::retransmit::RetransmitTracker;
use crate::rto::RtoEstimator;
use crate::seq::Seq;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStateKind {
    Closed,
    Listen,
    SynSent,
    SynReceived,
    Established,
    FinWait1,
    FinWait2,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
}

/// Per-connection sequence-space bookkeeping shared by every state from `SYN_SENT` onward.
#[derive(Debug)]
pub struct SequenceSpace {
    pub send_una: Seq,
    pub send_next: Seq,
    pub send_window: u16,
    pub recv_next: Seq,
    pub recv_window: u16,
}

/// Everything an established (or closing) connection needs to move bytes: buffers, congestion
/// control, RTO, and the retransmit scoreboard.
pub struct EstablishedData {
    pub seq: SequenceSpace,
    pub send_buf: SendBuffer,
    pub recv_buf: RecvBuffer,
    pub congestion: Box<dyn CongestionControl + Send>,
    pub rto: RtoEstimator,
    pub retransmit: RetransmitTracker,
    pub dup_ack_count: u32,
    pub last_ack_seen: Seq,
    pub rtt_sample_seq: Option<Seq>,
    pub rtt_sample_sent_at: EmulatedTime,
    pub autotune_send: bool,
    pub autotune_recv: bool,
    pub fin_sent: bool,
    pub fin_acked: bool,
    pub fin_received: bool,
    pub peer_closed: bool,
    pub connection_error: Option<ConnectionError>,
}

impl std::fmt::Debug for EstablishedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstablishedData")
            .field("seq", &self.seq)
            .field("dup_ack_count", &self.dup_ack_count)
            .field("fin_sent", &self.fin_sent)
            .field("fin_acked", &self.fin_acked)
            .field("fin_received", &self.fin_received)
            .finish_non_exhaustive()
    }
}

impl EstablishedData {
    pub fn new(iss: Seq, irs: Seq, congestion_kind: CongestionControlKind) -> Self {
        Self {
            seq: SequenceSpace {
                send_una: iss,
                send_next: iss,
                send_window: u16::MAX,
                recv_next: irs,
                recv_window: u16::MAX,
            },
            send_buf: SendBuffer::new(iss),
            recv_buf: RecvBuffer::new(irs),
            congestion: congestion_kind.new_state(),
            rto: RtoEstimator::new(),
            retransmit: RetransmitTracker::new(),
            dup_ack_count: 0,
            last_ack_seen: iss,
            rtt_sample_seq: None,
            rtt_sample_sent_at: EmulatedTime::MIN,
            autotune_send: true,
            autotune_recv: true,
            fin_sent: false,
            fin_acked: false,
            fin_received: false,
            peer_closed: false,
            connection_error: None,
        }
    }
}

/// Errors that surface through `get_connection_error` once a connection has reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionError {
    ConnectionReset,
    ConnectionRefused,
    ConnectionTimedOut,
}

/// A pending, not-yet-accepted inbound connection sitting in a listening socket's backlog.
#[derive(Debug)]
pub struct PendingConnection {
    pub peer_addr: SocketAddrV4,
    pub established: EstablishedData,
}

pub struct ListenData {
    pub backlog: u32,
    pub pending_syn: VecDeque<SocketAddrV4>,
    pub pending_established: VecDeque<PendingConnection>,
}

impl std::fmt::Debug for ListenData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenData")
            .field("backlog", &self.backlog)
            .field("pending_syn", &self.pending_syn.len())
            .field("pending_established", &self.pending_established.len())
            .finish()
    }
}

/// The data each connection state carries. `Closed`/`SynSent`/`TimeWait`/`LastAck` need only the
/// shared sequence bookkeeping (or nothing at all); states from `SynReceived` onward carry full
/// [`EstablishedData`].
#[derive(Debug)]
pub enum StateData {
    Closed,
    Listen(ListenData),
    SynSent { iss: Seq },
    Connected(EstablishedData),
}

#[derive(Debug)]
pub struct ConnectionState {
    pub kind: ConnectionStateKind,
    pub data: StateData,
}

impl ConnectionState {
    pub fn closed() -> Self {
        Self {
            kind: ConnectionStateKind::Closed,
            data: StateData::Closed,
        }
    }

    pub fn established_mut(&mut self) -> Option<&mut EstablishedData> {
        match &mut self.data {
            StateData::Connected(e) => Some(e),
            _ => None,
        }
    }

    pub fn established(&self) -> Option<&EstablishedData> {
        match &self.data {
            StateData::Connected(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.kind == ConnectionStateKind::Closed
    }
}
