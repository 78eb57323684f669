//! On-the-wire header representation. This crate doesn't do network I/O itself (see the crate
//! docs), so a "header" here is just the parsed fields a caller hands in or reads out — there is
//! no byte-level (de)serialization to do.

use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::{Bytes, BytesMut};

use crate::util::SmallArrayBackedSlice;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TcpFlags: u8 {
        const FIN = 1 << 0;
        const SYN = 1 << 1;
        const RST = 1 << 2;
        const PSH = 1 << 3;
        const ACK = 1 << 4;
        const URG = 1 << 5;
        const ECE = 1 << 6;
        const CWR = 1 << 7;
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Ipv4Header {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

/// A SACK block: an inclusive-exclusive range of sequence numbers the far end has received and
/// buffered out of order.
pub type SackBlock = (u32, u32);

#[derive(Copy, Clone, Debug)]
pub struct TcpHeader {
    pub ip: Ipv4Header,
    pub flags: TcpFlags,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub window_size: u16,
    pub selective_acks: Option<SmallArrayBackedSlice<4, SackBlock>>,
    pub window_scale: Option<u8>,
    pub timestamp: Option<u32>,
    pub timestamp_echo: Option<u32>,
}

impl TcpHeader {
    pub fn src(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip.src, self.src_port)
    }

    pub fn dst(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip.dst, self.dst_port)
    }
}

/// A packet payload as a list of byte chunks, avoiding a copy when data can be forwarded as-is
/// from a socket's send buffer straight onto the wire.
#[derive(Clone, Debug, Default)]
pub struct Payload(pub Vec<Bytes>);

static_assertions::assert_not_impl_any!(Payload: PartialEq, Eq);

impl Payload {
    pub fn len(&self) -> u32 {
        self.0
            .iter()
            .fold(0usize, |acc, x| acc.checked_add(x.len()).unwrap())
            .try_into()
            .unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|x| x.is_empty())
    }

    pub fn concat(&self) -> Bytes {
        let num_bytes = self.len() as usize;
        if num_bytes == 0 {
            return Bytes::new();
        }
        if self.0.len() == 1 {
            return self.0[0].clone();
        }
        let mut bytes = BytesMut::with_capacity(num_bytes);
        for chunk in &self.0 {
            bytes.extend_from_slice(chunk);
        }
        bytes.freeze()
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self(vec![bytes])
    }
}

impl From<BytesMut> for Payload {
    fn from(bytes: BytesMut) -> Self {
        bytes.freeze().into()
    }
}
