//! The in-process substitute for libc/libevent/OpenSSL symbol interposition (spec.md §4.5, Design
//! Note 9's substrate resolution — recorded in `DESIGN.md`). A real preload shim rewrites a
//! guest's libc calls via dynamic symbol resolution and a context-switch/resident-state-swap
//! dance; here a guest simply calls through a `&mut dyn SyscallApi` handed to it at its two entry
//! points, so the "switch to simulator context, dispatch, switch back" sequence collapses to an
//! ordinary function call with no `unsafe` FFI or BSS-swap `memcpy` involved.

use std::net::SocketAddrV4;

use sim_time::{EmulatedTime, SimulationTime};

/// Mirrors the errno-like values spec.md §7 says guest syscall errors surface as.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyscallError {
    BadFd,
    WouldBlock,
    NotBound,
    AlreadyConnecting,
    InvalidState,
    NotListening,
    NotConnected,
    AlreadyShutDown,
    AlreadyClosed,
}

/// The narrow surface a [`GuestProgram`] is allowed to touch. Handed to a process's entry points
/// by the owning [`crate::host::host::Host`]; every method operates on that host's descriptor
/// table only — a process can never reach another host's state through this trait.
pub trait SyscallApi {
    /// Open a UDP socket, returning its descriptor handle.
    fn socket_udp(&mut self) -> u32;

    fn bind_udp(&mut self, fd: u32, addr: SocketAddrV4) -> Result<(), SyscallError>;

    /// Send on a UDP socket, binding it to an ephemeral port first if it isn't bound yet (the
    /// "connect/send-triggered ephemeral port assignment" spec.md §3/§8 requires).
    fn send_to(&mut self, fd: u32, dst: SocketAddrV4, bytes: &[u8]) -> Result<usize, SyscallError>;

    fn recv_from(&mut self, fd: u32) -> Result<(SocketAddrV4, Vec<u8>), SyscallError>;

    /// Open a TCP socket, returning its descriptor handle.
    fn socket_tcp(&mut self) -> u32;

    /// Active-open: allocates an ephemeral local port and sends a SYN toward `remote`.
    fn connect_tcp(&mut self, fd: u32, remote: SocketAddrV4) -> Result<(), SyscallError>;

    /// Passive-open: binds `fd` to `local` and starts accepting up to `backlog` pending
    /// connections.
    fn listen_tcp(&mut self, fd: u32, local: SocketAddrV4, backlog: u32) -> Result<(), SyscallError>;

    /// Pop one fully-established connection off a listening socket's backlog as a fresh
    /// descriptor, or `WouldBlock` if none is ready yet.
    fn accept_tcp(&mut self, fd: u32) -> Result<u32, SyscallError>;

    fn send_tcp(&mut self, fd: u32, bytes: &[u8]) -> Result<usize, SyscallError>;

    fn recv_tcp(&mut self, fd: u32, max_len: usize) -> Result<Vec<u8>, SyscallError>;

    fn close_tcp(&mut self, fd: u32) -> Result<(), SyscallError>;

    /// Create an epoll instance, returning its descriptor handle (spec.md §4.4).
    fn epoll_create(&mut self) -> u32;

    fn epoll_ctl_add(&mut self, epoll_fd: u32, watched_fd: u32, interest: tcp::PollState) -> Result<(), SyscallError>;

    fn epoll_ctl_mod(&mut self, epoll_fd: u32, watched_fd: u32, interest: tcp::PollState) -> Result<(), SyscallError>;

    fn epoll_ctl_del(&mut self, epoll_fd: u32, watched_fd: u32) -> Result<(), SyscallError>;

    /// The watched handles currently ready, paired with which interest bits are satisfied.
    /// Non-blocking: returns whatever is ready right now rather than waiting.
    fn epoll_wait(&mut self, epoll_fd: u32) -> Result<Vec<(u32, tcp::PollState)>, SyscallError>;

    /// Create a `timerfd`-style descriptor, returning its handle.
    fn timer_create(&mut self) -> u32;

    /// Arm (or re-arm) a timer to first expire at `expire_at`, then repeat every `interval`
    /// (`SimulationTime::ZERO` for one-shot).
    fn timer_arm(&mut self, fd: u32, expire_at: EmulatedTime, interval: SimulationTime) -> Result<(), SyscallError>;

    /// `read(2)` on a timerfd: the accumulated expiration count, reset to zero.
    fn timer_read(&mut self, fd: u32) -> Result<u64, SyscallError>;

    fn close(&mut self, fd: u32);

    /// The current emulated time, the way a guest's `clock_gettime` would see it.
    fn now(&self) -> EmulatedTime;

    /// Mirrors the plugin ABI's `log(level, fn, fmt, …)` entry (spec.md §6).
    fn log(&mut self, level: log::Level, message: &str);
}

/// A loaded guest program: the "plugin shared object" of spec.md §4.5/§6, minus the shared-object
/// loading itself (real `.so`/`dlopen` guest code is explicitly out of scope per spec.md §1 —
/// "Guest applications themselves ... opaque shared objects"). `start` corresponds to the
/// plugin's `new_cb` entry; `on_wake` is the re-entry point after the process was blocked on I/O
/// and a watched descriptor's readiness changed.
pub trait GuestProgram: Send {
    fn start(&mut self, api: &mut dyn SyscallApi, argv: &[String]);
    fn on_wake(&mut self, api: &mut dyn SyscallApi);
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeSyscallApi;
    use super::*;
    use std::net::Ipv4Addr;

    struct EchoOnce {
        fd: u32,
    }

    impl GuestProgram for EchoOnce {
        fn start(&mut self, api: &mut dyn SyscallApi, _argv: &[String]) {
            self.fd = api.socket_udp();
            api.bind_udp(self.fd, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 2000))
                .unwrap();
        }

        fn on_wake(&mut self, api: &mut dyn SyscallApi) {
            if let Ok((src, bytes)) = api.recv_from(self.fd) {
                api.send_to(self.fd, src, &bytes).unwrap();
            }
        }
    }

    #[test]
    fn guest_program_can_bind_and_echo_through_the_fake_api() {
        let mut api = FakeSyscallApi::default();
        let mut program = EchoOnce { fd: 0 };
        program.start(&mut api, &[]);
        assert_eq!(api.bound.len(), 1);

        let client: SocketAddrV4 = "10.0.0.2:9000".parse().unwrap();
        api.inbox.entry(program.fd).or_default().push((client, b"ping".to_vec()));
        program.on_wake(&mut api);

        assert_eq!(api.sent, vec![(program.fd, client, b"ping".to_vec())]);
    }

    #[test]
    fn fake_tcp_connect_send_and_close_round_trip() {
        let mut api = FakeSyscallApi::default();
        let fd = api.socket_tcp();
        let remote = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 80);
        api.connect_tcp(fd, remote).unwrap();
        assert_eq!(api.send_tcp(fd, b"hello").unwrap(), 5);
        api.close_tcp(fd).unwrap();
        assert_eq!(api.send_tcp(fd, b"x"), Err(SyscallError::NotConnected));
    }

    #[test]
    fn fake_epoll_reports_readiness_once_data_is_queued() {
        let mut api = FakeSyscallApi::default();
        let fd = api.socket_udp();
        api.bind_udp(fd, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9000)).unwrap();
        let epoll_fd = api.epoll_create();
        api.epoll_ctl_add(epoll_fd, fd, tcp::PollState::READABLE).unwrap();
        assert!(api.epoll_wait(epoll_fd).unwrap().is_empty());

        let client: SocketAddrV4 = "10.0.0.2:9000".parse().unwrap();
        api.inbox.entry(fd).or_default().push((client, b"ping".to_vec()));
        assert_eq!(api.epoll_wait(epoll_fd).unwrap(), vec![(fd, tcp::PollState::READABLE)]);
    }

    #[test]
    fn fake_timer_accumulates_and_resets_on_read() {
        let mut api = FakeSyscallApi::default();
        let fd = api.timer_create();
        api.timer_arm(fd, EmulatedTime::MIN, SimulationTime::ZERO).unwrap();
        assert_eq!(api.timer_read(fd).unwrap(), 0);
    }
}
