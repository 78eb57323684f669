//! The wire-level unit the router, network interfaces, and topology latency model all operate
//! on. `lib/tcp` only knows about segments handed to it by a caller; this is the caller-side
//! envelope that carries a segment (or a UDP datagram) across the simulated network.

use std::net::SocketAddrV4;

use bytes::Bytes;
use sim_time::HostId;
use tcp::header::TcpHeader;

bitflags::bitflags! {
    /// Delivery-outcome bits a packet accumulates as it's handed between network components, so
    /// the last component to touch it (usually the receiving interface) can log why it was
    /// dropped without every intermediate caller threading a reason code through by hand.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct DeliveryStatus: u16 {
        const SENT           = 1 << 0;
        const ROUTED         = 1 << 1;
        const RECEIVED       = 1 << 2;
        const DROPPED_QUEUE  = 1 << 3;
        const DROPPED_REMOTE = 1 << 4;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct UdpHeader {
    pub src: SocketAddrV4,
    pub dst: SocketAddrV4,
}

#[derive(Clone, Debug)]
pub enum PacketHeader {
    Tcp(TcpHeader),
    Udp(UdpHeader),
}

impl PacketHeader {
    pub fn src(&self) -> SocketAddrV4 {
        match self {
            PacketHeader::Tcp(h) => h.src(),
            PacketHeader::Udp(h) => h.src,
        }
    }

    pub fn dst(&self) -> SocketAddrV4 {
        match self {
            PacketHeader::Tcp(h) => h.dst(),
            PacketHeader::Udp(h) => h.dst,
        }
    }
}

/// A single packet in flight. `payload` is reference-counted so forwarding a packet between
/// queues (or handing its bytes to a socket's receive buffer) never copies the bytes themselves.
#[derive(Clone, Debug)]
pub struct Packet {
    header: PacketHeader,
    payload: Bytes,
    origin_host: HostId,
    packet_id: u64,
    status: DeliveryStatus,
}

impl Packet {
    pub fn new(header: PacketHeader, payload: Bytes, origin_host: HostId, packet_id: u64) -> Self {
        Self {
            header,
            payload,
            origin_host,
            packet_id,
            status: DeliveryStatus::empty(),
        }
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn origin_host(&self) -> HostId {
        self.origin_host
    }

    pub fn packet_id(&self) -> u64 {
        self.packet_id
    }

    /// Total on-the-wire size: payload bytes only. The simulator doesn't model header
    /// byte-for-byte; `crate::network::MTU_BYTES` budgets against this same quantity, so headers
    /// are treated as zero-cost against the link's capacity the same way they are for queueing.
    pub fn len(&self) -> u32 {
        self.payload.len().try_into().unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn mark(&mut self, bits: DeliveryStatus) {
        self.status.insert(bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn udp_packet(len: usize) -> Packet {
        Packet::new(
            PacketHeader::Udp(UdpHeader {
                src: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1000),
                dst: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 2000),
            }),
            Bytes::from(vec![0u8; len]),
            HostId::new(0),
            1,
        )
    }

    #[test]
    fn len_reflects_payload_size_only() {
        assert_eq!(udp_packet(128).len(), 128);
        assert!(!udp_packet(128).is_empty());
        assert!(udp_packet(0).is_empty());
    }

    #[test]
    fn status_accumulates_across_marks() {
        let mut p = udp_packet(10);
        assert_eq!(p.status(), DeliveryStatus::empty());
        p.mark(DeliveryStatus::SENT);
        p.mark(DeliveryStatus::ROUTED);
        assert!(p.status().contains(DeliveryStatus::SENT));
        assert!(p.status().contains(DeliveryStatus::ROUTED));
        assert!(!p.status().contains(DeliveryStatus::RECEIVED));
    }

    #[test]
    fn header_src_dst_dispatch_by_variant() {
        let p = udp_packet(1);
        assert_eq!(p.header().src().port(), 1000);
        assert_eq!(p.header().dst().port(), 2000);
    }
}
