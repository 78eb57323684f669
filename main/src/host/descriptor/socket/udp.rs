//! A UDP socket: a bound local address and two unordered datagram queues, no connection state and
//! no retransmission — spec.md §3's Socket model narrowed to the "output buffer (byte queue) for
//! UDP" case rather than TCP's sequence-indexed one.

use std::collections::VecDeque;
use std::net::SocketAddrV4;

use bytes::Bytes;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UdpError {
    NotBound,
    WouldBlock,
}

pub struct UdpSocket {
    local_addr: Option<SocketAddrV4>,
    recv_queue: VecDeque<(SocketAddrV4, Bytes)>,
    recv_capacity: usize,
    send_queue: VecDeque<(SocketAddrV4, Bytes)>,
}

impl UdpSocket {
    pub fn new(recv_capacity: usize) -> Self {
        Self {
            local_addr: None,
            recv_queue: VecDeque::new(),
            recv_capacity,
            send_queue: VecDeque::new(),
        }
    }

    pub fn bind(&mut self, addr: SocketAddrV4) {
        self.local_addr = Some(addr);
    }

    pub fn local_addr(&self) -> Option<SocketAddrV4> {
        self.local_addr
    }

    pub fn send_to(&mut self, dst: SocketAddrV4, payload: Bytes) -> Result<(), UdpError> {
        if self.local_addr.is_none() {
            return Err(UdpError::NotBound);
        }
        self.send_queue.push_back((dst, payload));
        Ok(())
    }

    /// Drain one outgoing datagram, for the network interface to hand to the router.
    pub fn pop_outgoing(&mut self) -> Option<(SocketAddrV4, Bytes)> {
        self.send_queue.pop_front()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.send_queue.is_empty()
    }

    /// Called on packet arrival, after the router has delivered it to this socket.
    pub fn on_datagram(&mut self, src: SocketAddrV4, payload: Bytes) {
        if self.recv_queue.len() >= self.recv_capacity {
            return;
        }
        self.recv_queue.push_back((src, payload));
    }

    pub fn recv_from(&mut self) -> Result<(SocketAddrV4, Bytes), UdpError> {
        self.recv_queue.pop_front().ok_or(UdpError::WouldBlock)
    }

    pub fn poll_state(&self) -> tcp::PollState {
        let mut state = tcp::PollState::WRITABLE;
        if !self.recv_queue.is_empty() {
            state |= tcp::PollState::READABLE;
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn addr(port: u16) -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), port)
    }

    #[test]
    fn send_to_before_bind_is_rejected() {
        let mut sock = UdpSocket::new(4);
        assert_eq!(sock.send_to(addr(80), Bytes::from_static(b"x")), Err(UdpError::NotBound));
    }

    #[test]
    fn bound_socket_queues_outgoing_datagrams_in_order() {
        let mut sock = UdpSocket::new(4);
        sock.bind(addr(2000));
        sock.send_to(addr(80), Bytes::from_static(b"a")).unwrap();
        sock.send_to(addr(81), Bytes::from_static(b"b")).unwrap();
        assert_eq!(sock.pop_outgoing().unwrap().0.port(), 80);
        assert_eq!(sock.pop_outgoing().unwrap().0.port(), 81);
        assert!(!sock.has_outgoing());
    }

    #[test]
    fn recv_drops_datagrams_past_capacity() {
        let mut sock = UdpSocket::new(1);
        sock.on_datagram(addr(1), Bytes::from_static(b"first"));
        sock.on_datagram(addr(2), Bytes::from_static(b"second"));
        let (src, payload) = sock.recv_from().unwrap();
        assert_eq!(src.port(), 1);
        assert_eq!(&payload[..], b"first");
        assert_eq!(sock.recv_from(), Err(UdpError::WouldBlock));
    }

    #[test]
    fn poll_state_is_always_writable_and_readable_once_data_arrives() {
        let mut sock = UdpSocket::new(4);
        assert!(sock.poll_state().contains(tcp::PollState::WRITABLE));
        assert!(!sock.poll_state().contains(tcp::PollState::READABLE));
        sock.on_datagram(addr(1), Bytes::from_static(b"x"));
        assert!(sock.poll_state().contains(tcp::PollState::READABLE));
    }
}
