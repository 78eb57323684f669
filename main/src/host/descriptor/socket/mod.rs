//! The two socket protocol families a descriptor can back: UDP's unordered datagram queue and
//! TCP's `lib/tcp`-backed connection state machine.

pub mod tcp;
pub mod udp;
