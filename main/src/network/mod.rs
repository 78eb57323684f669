//! The network simulation: packet representation, the topology oracle, per-host routers, and the
//! rate limiter egress/ingress bandwidth caps are built from. Does not model any Linux networking
//! behaviour itself — that's [`crate::host`]'s job.

pub mod dns;
pub mod packet;
pub mod router;
pub mod token_bucket;
pub mod topology;

/// The link MTU packet queues budget storage against. Shadow doesn't model IP fragmentation, so
/// this only bounds how many bytes a queue considers "stored" for CoDel's drop decision.
pub const MTU_BYTES: u32 = 1500;
