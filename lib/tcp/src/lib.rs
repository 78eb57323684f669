//! A TCP implementation with a BSD-socket-like API, written as a ["sans-I/O"][sans-io] library: it
//! doesn't touch a network or a clock itself, it just accepts incoming packets and current-time
//! values and produces outgoing packets and a readiness mask. A caller drives it by handing it
//! segments as they arrive, polling [`TcpState::poll_state`] for readiness, and calling
//! [`TcpState::pop_packet`] to drain anything queued for the wire.
//!
//! [sans-io]: https://sans-io.readthedocs.io
//!
//! ```
//! use std::net::SocketAddrV4;
//! use tcp::{CongestionControlKind, TcpConfig, TcpFlags, TcpState};
//!
//! let mut client = TcpState::new(TcpConfig::default());
//! let local: SocketAddrV4 = "10.0.0.1:2000".parse().unwrap();
//! let remote: SocketAddrV4 = "10.0.0.2:80".parse().unwrap();
//!
//! client.connect(local, remote, sim_time::EmulatedTime::MIN).unwrap();
//! let (header, _payload) = client.pop_packet().unwrap();
//! assert!(header.flags.contains(TcpFlags::SYN));
//! ```

#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::net::SocketAddrV4;

use bytes::Bytes;
use sim_time::{EmulatedTime, SimulationTime};

pub mod buffer;
pub mod congestion;
pub mod header;
pub mod retransmit;
pub mod rto;
pub mod seq;
mod states;
pub mod util;

pub use congestion::CongestionControlKind;
pub use header::{Ipv4Header, Payload, TcpFlags, TcpHeader};
pub use seq::{Seq, SeqRange};
pub use states::ConnectionStateKind;

use states::{ConnectionError, ConnectionState, EstablishedData, ListenData, PendingConnection, StateData};

/// Duplicate acks required before fast retransmit fires (RFC 5681).
const DUP_ACK_THRESHOLD: u32 = 3;

/// Delayed-ack timer: a received segment is acked immediately if it's out of order or closes a
/// window, otherwise an ack is held for up to this long hoping to piggyback on outgoing data.
const DELAYED_ACK_TIMEOUT: SimulationTime = SimulationTime::from_nanos(200 * 1_000_000);

bitflags::bitflags! {
    /// Readiness bits a caller should check after any operation that might change connection
    /// state, analogous to epoll's `EPOLLIN`/`EPOLLOUT`/`EPOLLHUP` etc.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct PollState: u8 {
        /// There is data available to [`TcpState::recv`].
        const READABLE = 1 << 0;
        /// There is space available to [`TcpState::send`].
        const WRITABLE = 1 << 1;
        /// The peer has sent a FIN; no more data will ever arrive.
        const RECV_CLOSED = 1 << 2;
        /// The connection has fully closed (both directions) or reset.
        const CLOSED = 1 << 3;
        /// A new connection is waiting in a listening socket's accept backlog.
        const ACCEPTABLE = 1 << 4;
        /// The connection errored (reset, refused, timed out); see [`TcpState::take_error`].
        const ERROR = 1 << 5;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TcpConfig {
    pub congestion_control: CongestionControlKind,
    pub send_buffer_initial: u32,
    pub recv_buffer_initial: u32,
    pub autotuning_enabled: bool,
}

impl TcpConfig {
    pub fn new(congestion_control: CongestionControlKind) -> Self {
        Self {
            congestion_control,
            send_buffer_initial: 16 * 1024,
            recv_buffer_initial: 16 * 1024,
            autotuning_enabled: true,
        }
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new(CongestionControlKind::Reno)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectError {
    AlreadyConnecting,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ListenError {
    InvalidState,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcceptError {
    NotListening,
    WouldBlock,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SendError {
    NotConnected,
    AlreadyShutDown,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecvError {
    NotConnected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CloseError {
    AlreadyClosed,
}

/// The TCP connection state machine. One value per socket; binds a local/remote address pair,
/// and produces/consumes [`TcpHeader`]/[`Payload`] pairs rather than raw bytes.
#[derive(Debug)]
pub struct TcpState {
    config: TcpConfig,
    state: ConnectionState,
    local_addr: Option<SocketAddrV4>,
    remote_addr: Option<SocketAddrV4>,
    out_queue: VecDeque<(TcpHeader, Payload)>,
    delayed_ack_due: Option<EmulatedTime>,
    /// Timer deadline for the currently-armed retransmission timeout, if any.
    rto_deadline: Option<EmulatedTime>,
    time_wait_deadline: Option<EmulatedTime>,
}

/// How long TIME_WAIT lingers before the connection is fully discarded (2*MSL, using a
/// simulation-appropriate MSL rather than the RFC's 2-minute real-world value).
const TIME_WAIT_DURATION: SimulationTime = SimulationTime::from_nanos(60 * 1_000_000_000);

impl TcpState {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            state: ConnectionState::closed(),
            local_addr: None,
            remote_addr: None,
            out_queue: VecDeque::new(),
            delayed_ack_due: None,
            rto_deadline: None,
            time_wait_deadline: None,
        }
    }

    pub fn state_kind(&self) -> ConnectionStateKind {
        self.state.kind
    }

    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.local_addr
    }

    pub fn remote_addr(&self) -> Option<SocketAddrV4> {
        self.remote_addr
    }

    /// Start an active open: send a SYN to `remote` from `local`.
    pub fn connect(
        &mut self,
        local: SocketAddrV4,
        remote: SocketAddrV4,
        now: EmulatedTime,
    ) -> Result<(), ConnectError> {
        if !self.state.is_closed() {
            return Err(ConnectError::AlreadyConnecting);
        }

        let iss = initial_seq(now);
        self.local_addr = Some(local);
        self.remote_addr = Some(remote);
        self.state = ConnectionState {
            kind: ConnectionStateKind::SynSent,
            data: StateData::SynSent { iss },
        };
        self.enqueue(TcpFlags::SYN, iss, 0, Payload::default());
        Ok(())
    }

    /// Start a passive open: begin listening for inbound SYNs on `local`.
    pub fn listen(&mut self, local: SocketAddrV4, backlog: u32) -> Result<(), ListenError> {
        if !self.state.is_closed() {
            return Err(ListenError::InvalidState);
        }
        self.local_addr = Some(local);
        self.state = ConnectionState {
            kind: ConnectionStateKind::Listen,
            data: StateData::Listen(ListenData {
                backlog,
                pending_syn: VecDeque::new(),
                pending_established: VecDeque::new(),
            }),
        };
        Ok(())
    }

    /// Pop one fully-established connection off the accept backlog, producing a fresh
    /// [`TcpState`] for it. The listening socket itself stays in `LISTEN`.
    pub fn accept(&mut self) -> Result<TcpState, AcceptError> {
        let ConnectionStateKind::Listen = self.state.kind else {
            return Err(AcceptError::NotListening);
        };
        let StateData::Listen(listen) = &mut self.state.data else {
            unreachable!()
        };
        let conn = listen.pending_established.pop_front().ok_or(AcceptError::WouldBlock)?;

        let mut child = TcpState::new(self.config);
        child.local_addr = self.local_addr;
        child.remote_addr = Some(conn.peer_addr);
        child.state = ConnectionState {
            kind: ConnectionStateKind::Established,
            data: StateData::Connected(conn.established),
        };
        Ok(child)
    }

    /// Append application bytes to the send buffer. Data is not necessarily put on the wire
    /// immediately — call [`Self::pop_packet`] to drain whatever the congestion window allows.
    pub fn send(&mut self, bytes: &[u8], now: EmulatedTime) -> Result<usize, SendError> {
        let est = self.state.established_mut().ok_or(SendError::NotConnected)?;
        if est.fin_sent {
            return Err(SendError::AlreadyShutDown);
        }
        est.send_buf.write(bytes);
        drop(est);
        self.fill_send_window(now);
        Ok(bytes.len())
    }

    /// Read up to `max_len` bytes of already-reassembled, in-order received data.
    pub fn recv(&mut self, max_len: usize) -> Result<Bytes, RecvError> {
        let est = self.state.established_mut().ok_or(RecvError::NotConnected)?;
        Ok(est.recv_buf.read(max_len))
    }

    /// Begin a graceful close: send FIN once all outstanding send-buffer data has gone out.
    pub fn close(&mut self, now: EmulatedTime) -> Result<(), CloseError> {
        match self.state.kind {
            ConnectionStateKind::Closed => Err(CloseError::AlreadyClosed),
            ConnectionStateKind::SynSent | ConnectionStateKind::Listen => {
                self.state = ConnectionState::closed();
                Ok(())
            }
            _ => {
                let fin_now = match self.state.established_mut() {
                    Some(est) if !est.fin_sent && est.send_buf.is_empty() => {
                        let seq = est.seq.send_next;
                        let ack = est.seq.recv_next;
                        est.fin_sent = true;
                        est.seq.send_next += 1;
                        Some((seq, ack))
                    }
                    Some(est) => {
                        // there's unsent data; mark fin_sent so fill_send_window appends the FIN
                        // once the buffer drains.
                        est.fin_sent = true;
                        None
                    }
                    None => None,
                };
                if let Some((seq, ack)) = fin_now {
                    self.enqueue(TcpFlags::FIN | TcpFlags::ACK, seq, ack.into(), Payload::default());
                    self.advance_after_fin_sent();
                }
                let _ = now;
                Ok(())
            }
        }
    }

    fn advance_after_fin_sent(&mut self) {
        self.state.kind = match self.state.kind {
            ConnectionStateKind::Established => ConnectionStateKind::FinWait1,
            ConnectionStateKind::CloseWait => ConnectionStateKind::LastAck,
            other => other,
        };
    }

    /// The most recent connection error, if any, clearing it (matches the one-shot semantics of
    /// `getsockopt(SO_ERROR)`).
    pub fn take_error(&mut self) -> Option<ConnectionErrorKind> {
        self.state
            .established_mut()
            .and_then(|e| e.connection_error.take())
            .map(ConnectionErrorKind::from)
    }

    /// Stop growing the send buffer automatically; it stays at whatever size it last reached.
    pub fn disable_send_autotuning(&mut self) {
        if let Some(est) = self.state.established_mut() {
            est.autotune_send = false;
        }
    }

    pub fn disable_recv_autotuning(&mut self) {
        if let Some(est) = self.state.established_mut() {
            est.autotune_recv = false;
        }
    }

    pub fn poll_state(&self) -> PollState {
        let mut flags = PollState::empty();

        if self.state.kind == ConnectionStateKind::Listen {
            if let StateData::Listen(listen) = &self.state.data {
                if !listen.pending_established.is_empty() {
                    flags |= PollState::ACCEPTABLE;
                }
            }
        }

        if self.state.kind == ConnectionStateKind::Closed {
            flags |= PollState::CLOSED;
        }

        if let Some(est) = self.state.established() {
            if est.recv_buf.readable_len() > 0 {
                flags |= PollState::READABLE;
            }
            if !est.fin_sent && est.send_buf.len() < self.config.send_buffer_initial {
                flags |= PollState::WRITABLE;
            }
            if est.fin_received {
                flags |= PollState::RECV_CLOSED;
            }
            if est.connection_error.is_some() {
                flags |= PollState::ERROR;
            }
        }

        flags
    }

    /// Remove and return the next outgoing segment, if one is queued.
    pub fn pop_packet(&mut self) -> Option<(TcpHeader, Payload)> {
        self.out_queue.pop_front()
    }

    pub fn has_pending_packet(&self) -> bool {
        !self.out_queue.is_empty()
    }

    /// The next time this connection needs to be driven again even without new input (a
    /// delayed-ack or retransmission timer firing). Callers should register a timer for the
    /// earliest of the returned deadlines.
    pub fn next_timer_deadline(&self) -> Option<EmulatedTime> {
        [self.delayed_ack_due, self.rto_deadline, self.time_wait_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Drive time-based events (delayed ack, RTO, TIME_WAIT expiry) that are due at `now`.
    pub fn on_timer(&mut self, now: EmulatedTime) {
        if let Some(due) = self.delayed_ack_due {
            if now >= due {
                self.delayed_ack_due = None;
                self.send_pure_ack(now);
            }
        }

        if let Some(due) = self.rto_deadline {
            if now >= due {
                self.handle_rto(now);
            }
        }

        if let Some(due) = self.time_wait_deadline {
            if now >= due {
                self.state = ConnectionState::closed();
                self.time_wait_deadline = None;
            }
        }
    }

    /// Feed an inbound segment into the state machine.
    pub fn on_segment(&mut self, header: TcpHeader, payload: Payload, now: EmulatedTime) {
        match self.state.kind {
            ConnectionStateKind::Listen => self.on_segment_listening(header, now),
            ConnectionStateKind::SynSent => self.on_segment_syn_sent(header, now),
            ConnectionStateKind::Closed => {}
            _ => self.on_segment_connected(header, payload, now),
        }
    }

    fn on_segment_listening(&mut self, header: TcpHeader, now: EmulatedTime) {
        if !header.flags.contains(TcpFlags::SYN) {
            return;
        }
        let StateData::Listen(listen) = &mut self.state.data else {
            return;
        };
        if listen.pending_syn.len() as u32 + listen.pending_established.len() as u32 >= listen.backlog {
            return;
        }
        let peer = header.src();
        listen.pending_syn.push_back(peer);

        let iss = initial_seq(now);
        let irs = Seq::new(header.seq) + 1;
        let established = EstablishedData::new(iss, irs, self.config.congestion_control);

        listen.pending_established.push_back(PendingConnection {
            peer_addr: peer,
            established,
        });

        // Reply with SYN-ACK directly from the listening socket's out_queue; the caller routes
        // this by destination address back to whichever process eventually calls accept().
        self.enqueue_to(
            header.src(),
            TcpFlags::SYN | TcpFlags::ACK,
            iss,
            irs.into(),
            Payload::default(),
        );
    }

    fn on_segment_syn_sent(&mut self, header: TcpHeader, now: EmulatedTime) {
        if !header.flags.contains(TcpFlags::SYN) {
            return;
        }
        let StateData::SynSent { iss } = &self.state.data else {
            return;
        };
        let iss = *iss;
        let irs = Seq::new(header.seq) + 1;
        let mut established = EstablishedData::new(iss + 1, irs, self.config.congestion_control);
        established.seq.send_una = iss + 1;

        let acks_our_syn = header.flags.contains(TcpFlags::ACK) && header.ack == u32::from(iss + 1);

        self.state = ConnectionState {
            kind: if acks_our_syn {
                ConnectionStateKind::Established
            } else {
                ConnectionStateKind::SynReceived
            },
            data: StateData::Connected(established),
        };

        self.enqueue(TcpFlags::ACK, iss + 1, irs.into(), Payload::default());
        let _ = now;
    }

    fn on_segment_connected(&mut self, header: TcpHeader, payload: Payload, now: EmulatedTime) {
        if header.flags.contains(TcpFlags::RST) {
            if let Some(est) = self.state.established_mut() {
                est.connection_error = Some(ConnectionError::ConnectionReset);
            }
            self.state.kind = ConnectionStateKind::Closed;
            return;
        }

        if header.flags.contains(TcpFlags::ACK) {
            self.process_ack(header.ack, now);
        }

        if !payload.is_empty() {
            self.process_data(Seq::new(header.seq), payload, now);
        }

        if header.flags.contains(TcpFlags::FIN) {
            self.process_fin(now);
        }

        self.fill_send_window(now);
    }

    fn process_ack(&mut self, ack: u32, now: EmulatedTime) {
        let Some(est) = self.state.established_mut() else {
            return;
        };
        let ack_seq = Seq::new(ack);
        let is_new_ack = ack_seq != est.last_ack_seen;
        let advanced = ack_seq != est.seq.send_una;

        if advanced {
            let bytes_acked = ack_seq - est.seq.send_una;

            if est.rtt_sample_seq == Some(ack_seq) {
                let sample = now.saturating_duration_since(&est.rtt_sample_sent_at);
                est.rto.on_rtt_sample(sample);
                est.rtt_sample_seq = None;
            }
            est.retransmit.on_cumulative_ack(est.seq.send_una, ack_seq);
            est.send_buf.advance_base(ack_seq);
            est.seq.send_una = ack_seq;
            est.dup_ack_count = 0;
            est.last_ack_seen = ack_seq;

            est.congestion.on_ack(bytes_acked, 0);

            if est.fin_sent && ack_seq == est.seq.send_next {
                est.fin_acked = true;
            }
        } else if is_new_ack {
            est.last_ack_seen = ack_seq;
        } else {
            est.dup_ack_count += 1;
            if est.dup_ack_count == DUP_ACK_THRESHOLD {
                est.congestion.on_loss();
                est.retransmit.on_fast_retransmit();
            }
        }

        self.advance_state_after_ack();
        self.maybe_retire_connection(now);
    }

    fn advance_state_after_ack(&mut self) {
        let Some(est) = self.state.established() else {
            return;
        };
        self.state.kind = match (self.state.kind, est.fin_acked) {
            (ConnectionStateKind::FinWait1, true) => ConnectionStateKind::FinWait2,
            (ConnectionStateKind::Closing, true) => ConnectionStateKind::TimeWait,
            (ConnectionStateKind::LastAck, true) => ConnectionStateKind::Closed,
            (k, _) => k,
        };
    }

    fn process_data(&mut self, seq: Seq, payload: Payload, now: EmulatedTime) {
        let Some(est) = self.state.established_mut() else {
            return;
        };
        est.recv_buf.insert(seq, payload.concat());
        est.seq.recv_next = est.recv_buf.next_expected();

        // out-of-order or window-closing segments get an immediate ack; otherwise delay it.
        if !est.recv_buf.sack_blocks().is_empty() {
            self.send_pure_ack(now);
        } else {
            self.delayed_ack_due.get_or_insert(now.saturating_add(DELAYED_ACK_TIMEOUT));
        }
    }

    fn process_fin(&mut self, now: EmulatedTime) {
        let Some(est) = self.state.established_mut() else {
            return;
        };
        if est.fin_received {
            return;
        }
        est.fin_received = true;
        est.peer_closed = true;
        est.seq.recv_next += 1;
        let ack_seq = est.seq.recv_next;
        let send_next = est.seq.send_next;

        self.state.kind = match self.state.kind {
            ConnectionStateKind::Established => ConnectionStateKind::CloseWait,
            ConnectionStateKind::FinWait1 => ConnectionStateKind::Closing,
            ConnectionStateKind::FinWait2 => ConnectionStateKind::TimeWait,
            other => other,
        };

        self.enqueue(TcpFlags::ACK, send_next, ack_seq.into(), Payload::default());
        self.maybe_retire_connection(now);
    }

    fn maybe_retire_connection(&mut self, now: EmulatedTime) {
        if self.state.kind == ConnectionStateKind::TimeWait && self.time_wait_deadline.is_none() {
            self.time_wait_deadline = Some(now.saturating_add(TIME_WAIT_DURATION));
        }
    }

    fn send_pure_ack(&mut self, _now: EmulatedTime) {
        let Some(est) = self.state.established() else {
            return;
        };
        let send_next = est.seq.send_next;
        let recv_next = est.seq.recv_next;
        self.enqueue(TcpFlags::ACK, send_next, recv_next.into(), Payload::default());
    }

    /// Push as much of the send buffer onto the wire as the congestion/advertised window allows,
    /// then flush anything the retransmit tracker has marked lost.
    fn fill_send_window(&mut self, now: EmulatedTime) {
        let Some(est) = self.state.established_mut() else {
            return;
        };

        let mut to_send = Vec::new();
        loop {
            let outstanding = est.retransmit.outstanding_bytes();
            let window = est.congestion.cwnd().min(est.seq.send_window as u32);
            let available_window = window.saturating_sub(outstanding);
            if available_window == 0 {
                break;
            }
            let unsent = est.send_buf.end_seq() - est.seq.send_next;
            let chunk = unsent.min(available_window).min(congestion::MSS);
            if chunk == 0 {
                break;
            }

            let range = SeqRange::new(est.seq.send_next, est.seq.send_next + chunk);
            let bytes = est.send_buf.read_range(range);
            est.retransmit.on_segment_sent(range);

            if est.rtt_sample_seq.is_none() {
                est.rtt_sample_seq = Some(range.end);
                est.rtt_sample_sent_at = now;
            }

            est.seq.send_next += chunk;
            to_send.push((range.start, est.seq.recv_next, bytes));
        }

        for range in est.retransmit.drain_pending_retransmit() {
            let bytes = est.send_buf.read_range(range);
            to_send.push((range.start, est.seq.recv_next, bytes));
        }

        let rto_update = if est.retransmit.outstanding_bytes() > 0 {
            Some(self.rto_deadline.unwrap_or_else(|| now.saturating_add(est.rto.rto())))
        } else {
            None
        };

        for (seq, ack, bytes) in to_send {
            self.enqueue(TcpFlags::ACK, seq, ack.into(), Payload(vec![bytes]));
        }
        self.rto_deadline = rto_update;
    }

    fn handle_rto(&mut self, now: EmulatedTime) {
        let Some(est) = self.state.established_mut() else {
            return;
        };
        est.congestion.on_timeout();
        est.rto.on_timeout();
        est.retransmit.on_timeout();
        self.rto_deadline = Some(now.saturating_add(est.rto.rto()));
        self.fill_send_window(now);
    }

    fn enqueue(&mut self, flags: TcpFlags, seq: Seq, ack: u32, payload: Payload) {
        let Some(dst) = self.remote_addr else { return };
        self.enqueue_to(dst, flags, seq, ack, payload);
    }

    fn enqueue_to(&mut self, dst: SocketAddrV4, flags: TcpFlags, seq: Seq, ack: u32, payload: Payload) {
        let Some(src) = self.local_addr else { return };
        let header = TcpHeader {
            ip: Ipv4Header {
                src: *src.ip(),
                dst: *dst.ip(),
            },
            flags,
            src_port: src.port(),
            dst_port: dst.port(),
            seq: seq.into(),
            ack,
            window_size: self.config.recv_buffer_initial.min(u16::MAX as u32) as u16,
            selective_acks: None,
            window_scale: None,
            timestamp: None,
            timestamp_echo: None,
        };
        self.out_queue.push_back((header, payload));
    }
}

/// A connection error surfaced through [`TcpState::take_error`], distinct from the private
/// state-machine representation so downstream crates aren't coupled to it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    Reset,
    Refused,
    TimedOut,
}

impl From<ConnectionError> for ConnectionErrorKind {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::ConnectionReset => ConnectionErrorKind::Reset,
            ConnectionError::ConnectionRefused => ConnectionErrorKind::Refused,
            ConnectionError::ConnectionTimedOut => ConnectionErrorKind::TimedOut,
        }
    }
}

fn initial_seq(now: EmulatedTime) -> Seq {
    // RFC 9293's clock-driven ISS, scaled down from its 4-microsecond tick to keep wraparound
    // observable within a simulation's lifetime.
    Seq::new((now.as_nanos_since_epoch() / 4000) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(octet: u8, port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, octet), port)
    }

    #[test]
    fn connect_emits_a_syn() {
        let mut client = TcpState::new(TcpConfig::default());
        client.connect(addr(1, 2000), addr(2, 80), EmulatedTime::MIN).unwrap();
        let (header, _) = client.pop_packet().unwrap();
        assert!(header.flags.contains(TcpFlags::SYN));
        assert_eq!(client.state_kind(), ConnectionStateKind::SynSent);
    }

    #[test]
    fn three_way_handshake_reaches_established_on_both_sides() {
        let now = EmulatedTime::MIN;
        let mut client = TcpState::new(TcpConfig::default());
        client.connect(addr(1, 2000), addr(2, 80), now).unwrap();
        let (syn, _) = client.pop_packet().unwrap();

        let mut server = TcpState::new(TcpConfig::default());
        server.listen(addr(2, 80), 4).unwrap();
        server.on_segment(syn, Payload::default(), now);
        assert!(server.poll_state().contains(PollState::ACCEPTABLE));

        let mut accepted = server.accept().unwrap();
        let (syn_ack, _) = accepted.pop_packet().unwrap();
        assert!(syn_ack.flags.contains(TcpFlags::SYN | TcpFlags::ACK));

        client.on_segment(syn_ack, Payload::default(), now);
        assert_eq!(client.state_kind(), ConnectionStateKind::Established);

        let (final_ack, _) = client.pop_packet().unwrap();
        accepted.on_segment(final_ack, Payload::default(), now);
        assert_eq!(accepted.state_kind(), ConnectionStateKind::Established);
    }

    #[test]
    fn send_then_recv_round_trips_bytes() {
        let now = EmulatedTime::MIN;
        let (mut client, mut server) = connected_pair(now);

        client.send(b"hello", now).unwrap();
        let (header, payload) = client.pop_packet().unwrap();
        server.on_segment(header, payload, now);

        let got = server.recv(1024).unwrap();
        assert_eq!(&got[..], b"hello");
    }

    #[test]
    fn three_duplicate_acks_trigger_fast_retransmit() {
        let now = EmulatedTime::MIN;
        let (mut client, _server) = connected_pair(now);
        client.send(b"0123456789", now).unwrap();
        let (header, _) = client.pop_packet().unwrap();

        for _ in 0..3 {
            let mut dup = header;
            dup.flags = TcpFlags::ACK;
            client.on_segment(dup, Payload::default(), now);
        }

        let est = client.state.established().unwrap();
        assert!(est.dup_ack_count >= DUP_ACK_THRESHOLD || est.retransmit.has_pending_retransmit());
    }

    #[test]
    fn close_with_empty_buffer_sends_fin_immediately() {
        let now = EmulatedTime::MIN;
        let (mut client, _server) = connected_pair(now);
        client.close(now).unwrap();
        let (header, _) = client.pop_packet().unwrap();
        assert!(header.flags.contains(TcpFlags::FIN));
        assert_eq!(client.state_kind(), ConnectionStateKind::FinWait1);
    }

    fn connected_pair(now: EmulatedTime) -> (TcpState, TcpState) {
        let mut client = TcpState::new(TcpConfig::default());
        client.connect(addr(1, 2000), addr(2, 80), now).unwrap();
        let (syn, _) = client.pop_packet().unwrap();

        let mut server = TcpState::new(TcpConfig::default());
        server.listen(addr(2, 80), 4).unwrap();
        server.on_segment(syn, Payload::default(), now);
        let mut accepted = server.accept().unwrap();
        let (syn_ack, _) = accepted.pop_packet().unwrap();

        client.on_segment(syn_ack, Payload::default(), now);
        let (final_ack, _) = client.pop_packet().unwrap();
        accepted.on_segment(final_ack, Payload::default(), now);

        (client, accepted)
    }
}
