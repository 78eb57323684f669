//! The tagged variant a [`table::DescriptorTable`] handle maps to (spec.md §3's "tagged variant
//! over {TCP, UDP, pipe, epoll, timer, channel}"). `channel` is folded into `Pipe` here: a
//! `socketpair(AF_UNIX)` byte-stream pair and an anonymous pipe are the same linked-buffer shape,
//! distinguished only by how the descriptor table hands out the two ends.

pub mod epoll;
pub mod pipe;
pub mod socket;
pub mod table;
pub mod timer;

use self::epoll::Epoll;
use self::pipe::PipeEnd;
use self::socket::tcp::TcpSocket;
use self::socket::udp::UdpSocket;
use self::timer::Timer;

pub enum Descriptor {
    Pipe(PipeEnd),
    Timer(Timer),
    Tcp(TcpSocket),
    Udp(UdpSocket),
    Epoll(Epoll),
}

impl Descriptor {
    pub fn poll_state(&self) -> tcp::PollState {
        match self {
            Descriptor::Pipe(d) => d.poll_state(),
            Descriptor::Timer(d) => d.poll_state(),
            Descriptor::Tcp(d) => d.poll_state(),
            Descriptor::Udp(d) => d.poll_state(),
            Descriptor::Epoll(d) => d.poll_state(),
        }
    }
}
