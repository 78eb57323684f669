//! The simulated machine: one network presence, a descriptor table, a CPU delay model, and the
//! guest processes running on it. Grounded on the teacher's `host/host.rs`, minus everything tied
//! to `cshadow`'s C engine (`MemoryManager`, `ShMemBlock`, ptrace-based thread control) — this
//! workspace drives guest code through the in-process `crate::shim` trait-object substrate
//! instead, so a `Host` only ever needs to hand a process a `&mut dyn SyscallApi` view of itself.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use bytes::Bytes;
use log::LevelFilter;

use sim_time::{EmulatedTime, HostId, SimulationTime};
use tcp::TcpConfig;

use crate::core::work::event::Event;
use crate::core::work::task::TaskRef;
use crate::core::work::SequenceCounter;
use crate::core::worker;
use crate::host::cpu::Cpu;
use crate::host::descriptor::epoll::Epoll;
use crate::host::descriptor::socket::tcp::TcpSocket;
use crate::host::descriptor::socket::udp::{UdpError, UdpSocket};
use crate::host::descriptor::table::{DescriptorTable, MIN_DESCRIPTOR};
use crate::host::descriptor::timer::Timer;
use crate::host::descriptor::Descriptor;
use crate::host::network_interface::NetworkInterface;
use crate::host::process::{Process, ProcessId};
use crate::network::packet::{Packet, PacketHeader};
use crate::network::router::Router;
use crate::shim::{GuestProgram, SyscallApi, SyscallError};

/// Backlog depth for a freshly-opened UDP socket's receive queue, absent an explicit
/// `--socket-recv-buffer` (§6's per-socket buffer sizing applies to TCP; UDP here just needs
/// *some* bound so a silent guest can't grow memory unbounded).
const DEFAULT_UDP_RECV_CAPACITY: usize = 128;

/// Lowest port [`Host::allocate_ephemeral_port`] ever hands out, matching the teacher's
/// `namespace.rs::get_random_free_port` range (ports below this are left for well-known services
/// a scenario binds explicitly).
const MIN_RANDOM_PORT: u16 = 10000;

/// How many random draws [`Host::allocate_ephemeral_port`] tries before falling back to a linear
/// scan, mirroring the teacher's `get_random_free_port`.
const RANDOM_PORT_ATTEMPTS: u32 = 10;

pub struct Host {
    id: HostId,
    name: String,
    default_ip: Ipv4Addr,
    descriptors: DescriptorTable,
    interfaces: Vec<NetworkInterface>,
    router: Router,
    cpu: Cpu,
    log_override: Option<LevelFilter>,
    tcp_config: TcpConfig,
    processes: HashMap<ProcessId, Process>,
    next_process_id: u32,
    sequence: SequenceCounter,
    booted: bool,
    /// Events a running task scheduled for delivery elsewhere (another host, or back onto this
    /// one for a later round). A [`Task::run`](crate::core::work::task::Task::run) has no return
    /// value it could hand new events back through, so it pushes them here instead; the worker
    /// loop drains this after every task runs and feeds the result into the scheduler's `Policy`.
    outbox: Vec<Event>,
    /// `true` while a `drive_timers` self-tick is already scheduled, so repeated calls (one per
    /// TCP/timer-descriptor mutation) don't pile up duplicate outbox entries.
    timer_tick_scheduled: bool,
}

impl Host {
    pub fn new(
        id: HostId,
        name: String,
        default_ip: Ipv4Addr,
        interfaces: Vec<NetworkInterface>,
        cpu: Cpu,
        log_override: Option<LevelFilter>,
        tcp_config: TcpConfig,
    ) -> Self {
        Self {
            id,
            name,
            default_ip,
            descriptors: DescriptorTable::new(),
            interfaces,
            router: Router::new(),
            cpu,
            log_override,
            tcp_config,
            processes: HashMap::new(),
            next_process_id: 0,
            sequence: SequenceCounter::new(),
            booted: false,
            outbox: Vec::new(),
            timer_tick_scheduled: false,
        }
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ip(&self) -> Ipv4Addr {
        self.default_ip
    }

    pub fn log_override(&self) -> Option<LevelFilter> {
        self.log_override
    }

    pub fn descriptors(&self) -> &DescriptorTable {
        &self.descriptors
    }

    pub fn descriptors_mut(&mut self) -> &mut DescriptorTable {
        &mut self.descriptors
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn interfaces(&self) -> &[NetworkInterface] {
        &self.interfaces
    }

    pub fn interfaces_mut(&mut self) -> &mut [NetworkInterface] {
        &mut self.interfaces
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Bring the host's network presence and descriptor table up. A no-op past the first call.
    pub fn boot(&mut self) {
        self.booted = true;
    }

    /// Tear down every process and close every descriptor, mirroring a machine power-off.
    pub fn shutdown(&mut self) {
        self.processes.clear();
        self.descriptors.remove_all().for_each(drop);
        self.booted = false;
    }

    /// Register a fresh, not-yet-started process on this host and return its id. The caller is
    /// responsible for scheduling the `start_process` event at the application's configured
    /// start time (spec.md §6's `AddApplication.start_time`).
    pub fn spawn_process(&mut self, argv: Vec<String>, program: Box<dyn GuestProgram>) -> ProcessId {
        let id = ProcessId::new(self.next_process_id);
        self.next_process_id += 1;
        self.processes.insert(id, Process::new(id, argv, program));
        id
    }

    pub fn process(&self, id: ProcessId) -> Option<&Process> {
        self.processes.get(&id)
    }

    /// Invoke a process's entry point. A no-op if `id` names no process on this host (the process
    /// may have already been killed, or the id may be stale).
    pub fn start_process(&mut self, id: ProcessId, now: EmulatedTime) {
        let Some(mut process) = self.processes.remove(&id) else {
            return;
        };
        {
            let mut api = HostSyscallApi { host: self, now };
            process.start(&mut api);
        }
        self.processes.insert(id, process);
    }

    /// Re-enter a blocked process after one of its watched descriptors became ready.
    pub fn wake_process(&mut self, id: ProcessId, now: EmulatedTime) {
        let Some(mut process) = self.processes.remove(&id) else {
            return;
        };
        {
            let mut api = HostSyscallApi { host: self, now };
            process.wake(&mut api);
        }
        self.processes.insert(id, process);
    }

    pub fn kill_process(&mut self, id: ProcessId) {
        if let Some(process) = self.processes.get_mut(&id) {
            process.kill();
        }
    }

    /// The next value of this host's monotonic per-source sequence counter, for code that
    /// constructs an [`Event`] addressed from this host (the final tie-break in `Event`'s
    /// ordering — see `core::work::event`).
    pub fn next_sequence(&self) -> u64 {
        self.sequence.next()
    }

    pub fn schedule_event(&mut self, event: Event) {
        self.outbox.push(event);
    }

    pub fn take_outbox(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.outbox)
    }

    /// Pop every datagram every UDP socket on this host currently has queued to send, as
    /// `(src, dst, payload)` triples. Lower-level than [`Self::drain_outgoing_packets`]: kept for
    /// callers that only care about UDP and want to skip wrapping each datagram as a [`Packet`].
    pub fn drain_outgoing_udp_datagrams(&mut self) -> Vec<(SocketAddrV4, SocketAddrV4, Bytes)> {
        let mut out = Vec::new();
        for (_fd, descriptor) in self.descriptors.iter_mut() {
            if let Descriptor::Udp(socket) = descriptor {
                let Some(src) = socket.local_addr() else { continue };
                while let Some((dst, payload)) = socket.pop_outgoing() {
                    out.push((src, dst, payload));
                }
            }
        }
        out
    }

    /// Hand an arrived datagram to whichever of this host's UDP sockets is bound to `dst`. A
    /// no-op if nothing is listening there (mirrors a real kernel silently dropping a datagram
    /// addressed to a closed port).
    pub fn deliver_udp_datagram(&mut self, dst: SocketAddrV4, src: SocketAddrV4, payload: Bytes, now: EmulatedTime) {
        for (_fd, descriptor) in self.descriptors.iter_mut() {
            if let Descriptor::Udp(socket) = descriptor {
                if socket.local_addr() == Some(dst) {
                    socket.on_datagram(src, payload);
                    break;
                }
            }
        }
        self.refresh_epolls();
        self.wake_all_processes(now);
    }

    /// Feed an arrived TCP segment to whichever socket it belongs to: an established connection
    /// matching `(local, remote)` exactly, or failing that a listening socket bound to `local`
    /// (the passive-open case — the segment is a SYN the listener hasn't split off a child for
    /// yet). A no-op if neither exists, mirroring a real kernel's RST-less silent drop here (no
    /// raw socket models RST generation, so an unmatched segment just disappears).
    fn deliver_tcp_segment(&mut self, header: tcp::header::TcpHeader, payload: tcp::Payload, now: EmulatedTime) {
        let local = header.dst();
        let remote = header.src();
        let mut listener_fd = None;
        for (fd, descriptor) in self.descriptors.iter_mut() {
            if let Descriptor::Tcp(socket) = descriptor {
                let state = socket.state();
                if state.local_addr() == Some(local) && state.remote_addr() == Some(remote) {
                    socket.state_mut().on_segment(header, payload, now);
                    self.drive_timers(now);
                    self.refresh_epolls();
                    self.wake_all_processes(now);
                    return;
                }
                if state.state_kind() == tcp::ConnectionStateKind::Listen && state.local_addr() == Some(local) {
                    listener_fd = Some(fd);
                }
            }
        }
        let Some(listener_fd) = listener_fd else { return };
        if let Some(Descriptor::Tcp(listener)) = self.descriptors.get_mut(listener_fd) {
            listener.state_mut().on_segment(header, payload, now);
        }
        self.drive_timers(now);
        self.refresh_epolls();
        self.wake_all_processes(now);
    }

    /// Dispatch one arrived wire packet to the matching UDP or TCP descriptor.
    fn deliver_packet(&mut self, packet: Packet, now: EmulatedTime) {
        match packet.header().clone() {
            PacketHeader::Udp(header) => {
                self.deliver_udp_datagram(header.dst, header.src, packet.payload().clone(), now)
            }
            PacketHeader::Tcp(header) => {
                self.deliver_tcp_segment(header, tcp::Payload::from(packet.payload().clone()), now)
            }
        }
    }

    /// Push an arrived packet through this host's [`Router`] (CoDel-queued ingress), then drain
    /// whatever the queue admits through the interface's ingress token bucket before finally
    /// delivering it to a socket. A packet the interface can't currently afford is dropped rather
    /// than delayed — mirrors a real NIC discarding a frame it has no buffer budget for, rather
    /// than the network itself holding it.
    pub fn ingress(&mut self, packet: Packet, now: EmulatedTime) {
        self.router.push(packet, now);
        while let Some(mut packet) = self.router.pop(now) {
            let Some(iface) = self.interfaces.first_mut() else { break };
            match iface.conforming_receive(packet.len() as u64, now) {
                Ok(_) => self.deliver_packet(packet, now),
                Err(_wait) => {
                    packet.mark(crate::network::packet::DeliveryStatus::DROPPED_QUEUE);
                }
            }
        }
    }

    /// Pop every queued outgoing UDP datagram and TCP segment on this host, wrapped as wire-level
    /// [`Packet`]s. Unifies both protocols behind one scan so the controller's round loop doesn't
    /// need a protocol-specific drain path for each.
    pub fn drain_outgoing_packets(&mut self) -> Vec<Packet> {
        let mut out = Vec::new();
        for (_fd, descriptor) in self.descriptors.iter_mut() {
            match descriptor {
                Descriptor::Udp(socket) => {
                    let Some(src) = socket.local_addr() else { continue };
                    while let Some((dst, payload)) = socket.pop_outgoing() {
                        out.push(Packet::new(
                            PacketHeader::Udp(crate::network::packet::UdpHeader { src, dst }),
                            payload,
                            self.id,
                            0,
                        ));
                    }
                }
                Descriptor::Tcp(socket) => {
                    while let Some(packet) = socket.pop_packet() {
                        out.push(packet);
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Hand every queued outgoing packet to this host's sole network interface (spec §4.2's
    /// token-bucket/qdisc egress path), in qdisc order, and return each alongside the extra delay
    /// its send had to wait out for bandwidth to become available. The controller's round loop
    /// adds this delay on top of the topology's sampled link latency.
    pub fn drain_egress(&mut self, now: EmulatedTime) -> Vec<(Packet, SimulationTime)> {
        let packets = self.drain_outgoing_packets();
        let Some(iface) = self.interfaces.first_mut() else {
            return packets.into_iter().map(|p| (p, SimulationTime::ZERO)).collect();
        };
        for (idx, _) in packets.iter().enumerate() {
            iface.notify_wants_send(idx as u64);
        }
        let mut out = Vec::with_capacity(packets.len());
        let mut elapsed = SimulationTime::ZERO;
        let mut packets: Vec<Option<Packet>> = packets.into_iter().map(Some).collect();
        while let Some(idx) = iface.next_sender() {
            let packet = packets[idx as usize].take().expect("qdisc handed back an index twice");
            match iface.conforming_send(packet.len() as u64, now.saturating_add(elapsed)) {
                Ok(_) => out.push((packet, elapsed)),
                Err(wait) => {
                    elapsed = elapsed.saturating_add(wait);
                    out.push((packet, elapsed));
                }
            }
        }
        out
    }

    /// Drive every TCP connection's and timer descriptor's pending timer (delayed ack, RTO,
    /// TIME_WAIT expiry, `timerfd` expirations) that is due at `now`, then self-schedule another
    /// pass for whichever deadline is now soonest. Reuses the same outbox [`Event`] path any other
    /// code uses to self-schedule on this host — no separate timer-wheel machinery.
    pub fn drive_timers(&mut self, now: EmulatedTime) {
        let mut next_deadline = None;
        for (_fd, descriptor) in self.descriptors.iter_mut() {
            match descriptor {
                Descriptor::Tcp(socket) => {
                    socket.state_mut().on_timer(now);
                    if let Some(deadline) = socket.state().next_timer_deadline() {
                        next_deadline = Some(next_deadline.map_or(deadline, |d: EmulatedTime| d.min(deadline)));
                    }
                }
                Descriptor::Timer(timer) => {
                    timer.on_timer(now);
                    if let Some(deadline) = timer.next_expire_time() {
                        next_deadline = Some(next_deadline.map_or(deadline, |d: EmulatedTime| d.min(deadline)));
                    }
                }
                _ => {}
            }
        }
        self.refresh_epolls();
        self.wake_all_processes(now);

        if self.timer_tick_scheduled {
            return;
        }
        if let Some(deadline) = next_deadline {
            self.timer_tick_scheduled = true;
            let host_id = self.id;
            let seq = self.next_sequence();
            let task = TaskRef::new(move |host: &mut Host, now: EmulatedTime| {
                host.timer_tick_scheduled = false;
                host.drive_timers(now);
            });
            self.schedule_event(Event::new(deadline, host_id, host_id, seq, task));
        }
    }

    /// Recompute every epoll descriptor's ready set against the current descriptor table. Call
    /// after any operation that could change a watched descriptor's readiness. Uses the same
    /// remove/operate/reinsert pattern as [`Self::start_process`]/[`Self::wake_process`], since an
    /// `Epoll` needs `&DescriptorTable` while it lives inside that same table.
    fn refresh_epolls(&mut self) {
        let epoll_fds: Vec<u32> = self
            .descriptors
            .iter()
            .filter(|(_, d)| matches!(d, Descriptor::Epoll(_)))
            .map(|(fd, _)| fd)
            .collect();
        for fd in epoll_fds {
            let Some(Descriptor::Epoll(mut epoll)) = self.descriptors.remove(fd) else {
                continue;
            };
            epoll.refresh(&self.descriptors);
            self.descriptors.set(fd, Descriptor::Epoll(epoll));
        }
    }

    /// Re-enter every process on this host. This workspace's descriptor table is host-owned
    /// rather than per-process (unlike a real kernel's per-process fd table), so there is no
    /// fd-to-process ownership map to wake a single process precisely; broadcasting a wake to
    /// every process on any readiness-relevant event is the pragmatic stand-in, tolerable the same
    /// way a real epoll tolerates a spurious wakeup.
    fn wake_all_processes(&mut self, now: EmulatedTime) {
        let ids: Vec<ProcessId> = self.processes.keys().copied().collect();
        for id in ids {
            self.wake_process(id, now);
        }
    }

    /// Draw a free ephemeral port the way a real kernel's connect/send-triggered bind does:
    /// several random draws in `[MIN_RANDOM_PORT, u16::MAX]`, then an exhaustive linear scan if
    /// those all collide. Grounded on the teacher's `host/network/namespace.rs::get_random_free_port`.
    pub fn allocate_ephemeral_port(&self) -> u16 {
        for _ in 0..RANDOM_PORT_ATTEMPTS {
            let candidate = worker::with_rng(|rng| rand::Rng::gen_range(rng, MIN_RANDOM_PORT..=u16::MAX));
            if !self.port_in_use(candidate) {
                return candidate;
            }
        }
        (MIN_RANDOM_PORT..=u16::MAX)
            .find(|port| !self.port_in_use(*port))
            .expect("every ephemeral port in range is bound")
    }

    fn port_in_use(&self, port: u16) -> bool {
        self.descriptors.iter().any(|(_, descriptor)| match descriptor {
            Descriptor::Udp(socket) => socket.local_addr().is_some_and(|a| a.port() == port),
            Descriptor::Tcp(socket) => socket.state().local_addr().is_some_and(|a| a.port() == port),
            _ => false,
        })
    }
}

/// The view of a [`Host`] a running [`crate::host::process::Process`] is allowed to touch,
/// reachable only through the narrow [`SyscallApi`] surface. Built fresh for each `start`/`wake`
/// call rather than stored, so it never outlives the single call it mediates.
struct HostSyscallApi<'a> {
    host: &'a mut Host,
    now: EmulatedTime,
}

impl SyscallApi for HostSyscallApi<'_> {
    fn socket_udp(&mut self) -> u32 {
        self.host
            .descriptors
            .add(Descriptor::Udp(UdpSocket::new(DEFAULT_UDP_RECV_CAPACITY)), MIN_DESCRIPTOR)
    }

    fn bind_udp(&mut self, fd: u32, mut addr: SocketAddrV4) -> Result<(), SyscallError> {
        if addr.port() == 0 {
            addr.set_port(self.host.allocate_ephemeral_port());
        }
        match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Udp(socket)) => {
                socket.bind(addr);
                Ok(())
            }
            _ => Err(SyscallError::BadFd),
        }
    }

    fn send_to(&mut self, fd: u32, dst: SocketAddrV4, bytes: &[u8]) -> Result<usize, SyscallError> {
        let needs_bind = matches!(self.host.descriptors.get(fd), Some(Descriptor::Udp(s)) if s.local_addr().is_none());
        if needs_bind {
            let port = self.host.allocate_ephemeral_port();
            let addr = SocketAddrV4::new(self.host.default_ip, port);
            if let Some(Descriptor::Udp(socket)) = self.host.descriptors.get_mut(fd) {
                socket.bind(addr);
            }
        }
        match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Udp(socket)) => socket
                .send_to(dst, Bytes::copy_from_slice(bytes))
                .map(|()| bytes.len())
                .map_err(udp_error_to_syscall_error),
            _ => Err(SyscallError::BadFd),
        }
    }

    fn recv_from(&mut self, fd: u32) -> Result<(SocketAddrV4, Vec<u8>), SyscallError> {
        match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Udp(socket)) => socket
                .recv_from()
                .map(|(src, payload)| (src, payload.to_vec()))
                .map_err(udp_error_to_syscall_error),
            _ => Err(SyscallError::BadFd),
        }
    }

    fn socket_tcp(&mut self) -> u32 {
        let config = self.host.tcp_config;
        let mut socket = TcpSocket::new(config, self.host.id);
        if !config.autotuning_enabled {
            socket.state_mut().disable_send_autotuning();
            socket.state_mut().disable_recv_autotuning();
        }
        self.host.descriptors.add(Descriptor::Tcp(socket), MIN_DESCRIPTOR)
    }

    fn connect_tcp(&mut self, fd: u32, remote: SocketAddrV4) -> Result<(), SyscallError> {
        let port = self.host.allocate_ephemeral_port();
        let local = SocketAddrV4::new(self.host.default_ip, port);
        let result = match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Tcp(socket)) => socket
                .state_mut()
                .connect(local, remote, self.now)
                .map_err(|tcp::ConnectError::AlreadyConnecting| SyscallError::AlreadyConnecting),
            _ => Err(SyscallError::BadFd),
        };
        self.host.drive_timers(self.now);
        result
    }

    fn listen_tcp(&mut self, fd: u32, local: SocketAddrV4, backlog: u32) -> Result<(), SyscallError> {
        match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Tcp(socket)) => socket
                .state_mut()
                .listen(local, backlog)
                .map_err(|tcp::ListenError::InvalidState| SyscallError::InvalidState),
            _ => Err(SyscallError::BadFd),
        }
    }

    fn accept_tcp(&mut self, fd: u32) -> Result<u32, SyscallError> {
        let host_id = self.host.id;
        let child = match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Tcp(socket)) => socket.state_mut().accept().map_err(|err| match err {
                tcp::AcceptError::NotListening => SyscallError::NotListening,
                tcp::AcceptError::WouldBlock => SyscallError::WouldBlock,
            }),
            _ => Err(SyscallError::BadFd),
        }?;
        Ok(self
            .host
            .descriptors
            .add(Descriptor::Tcp(TcpSocket::from_state(child, host_id)), MIN_DESCRIPTOR))
    }

    fn send_tcp(&mut self, fd: u32, bytes: &[u8]) -> Result<usize, SyscallError> {
        let now = self.now;
        let result = match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Tcp(socket)) => socket.state_mut().send(bytes, now).map_err(|err| match err {
                tcp::SendError::NotConnected => SyscallError::NotConnected,
                tcp::SendError::AlreadyShutDown => SyscallError::AlreadyShutDown,
            }),
            _ => Err(SyscallError::BadFd),
        };
        self.host.drive_timers(now);
        result
    }

    fn recv_tcp(&mut self, fd: u32, max_len: usize) -> Result<Vec<u8>, SyscallError> {
        match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Tcp(socket)) => socket
                .state_mut()
                .recv(max_len)
                .map(|bytes| bytes.to_vec())
                .map_err(|tcp::RecvError::NotConnected| SyscallError::NotConnected),
            _ => Err(SyscallError::BadFd),
        }
    }

    fn close_tcp(&mut self, fd: u32) -> Result<(), SyscallError> {
        let now = self.now;
        let result = match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Tcp(socket)) => socket
                .state_mut()
                .close(now)
                .map_err(|tcp::CloseError::AlreadyClosed| SyscallError::AlreadyClosed),
            _ => Err(SyscallError::BadFd),
        };
        self.host.drive_timers(now);
        result
    }

    fn epoll_create(&mut self) -> u32 {
        self.host.descriptors.add(Descriptor::Epoll(Epoll::new()), MIN_DESCRIPTOR)
    }

    fn epoll_ctl_add(&mut self, epoll_fd: u32, watched_fd: u32, interest: tcp::PollState) -> Result<(), SyscallError> {
        match self.host.descriptors.get_mut(epoll_fd) {
            Some(Descriptor::Epoll(epoll)) => {
                epoll.add(watched_fd, interest);
                Ok(())
            }
            _ => Err(SyscallError::BadFd),
        }
    }

    fn epoll_ctl_mod(&mut self, epoll_fd: u32, watched_fd: u32, interest: tcp::PollState) -> Result<(), SyscallError> {
        match self.host.descriptors.get_mut(epoll_fd) {
            Some(Descriptor::Epoll(epoll)) => {
                if epoll.modify(watched_fd, interest) {
                    Ok(())
                } else {
                    Err(SyscallError::BadFd)
                }
            }
            _ => Err(SyscallError::BadFd),
        }
    }

    fn epoll_ctl_del(&mut self, epoll_fd: u32, watched_fd: u32) -> Result<(), SyscallError> {
        match self.host.descriptors.get_mut(epoll_fd) {
            Some(Descriptor::Epoll(epoll)) => {
                if epoll.remove(watched_fd) {
                    Ok(())
                } else {
                    Err(SyscallError::BadFd)
                }
            }
            _ => Err(SyscallError::BadFd),
        }
    }

    fn epoll_wait(&mut self, epoll_fd: u32) -> Result<Vec<(u32, tcp::PollState)>, SyscallError> {
        match self.host.descriptors.get(epoll_fd) {
            Some(Descriptor::Epoll(epoll)) => Ok(epoll.ready_set(&self.host.descriptors)),
            _ => Err(SyscallError::BadFd),
        }
    }

    fn timer_create(&mut self) -> u32 {
        self.host.descriptors.add(Descriptor::Timer(Timer::new()), MIN_DESCRIPTOR)
    }

    fn timer_arm(&mut self, fd: u32, expire_at: EmulatedTime, interval: SimulationTime) -> Result<(), SyscallError> {
        let result = match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Timer(timer)) => {
                timer.arm(expire_at, interval);
                Ok(())
            }
            _ => Err(SyscallError::BadFd),
        };
        self.host.drive_timers(self.now);
        result
    }

    fn timer_read(&mut self, fd: u32) -> Result<u64, SyscallError> {
        match self.host.descriptors.get_mut(fd) {
            Some(Descriptor::Timer(timer)) => Ok(timer.consume_expiration_count()),
            _ => Err(SyscallError::BadFd),
        }
    }

    fn close(&mut self, fd: u32) {
        self.host.descriptors.remove(fd);
    }

    fn now(&self) -> EmulatedTime {
        self.now
    }

    fn log(&mut self, level: log::Level, message: &str) {
        log::log!(level, "[{}] {}", self.host.name, message);
    }
}

fn udp_error_to_syscall_error(err: UdpError) -> SyscallError {
    match err {
        UdpError::NotBound => SyscallError::NotBound,
        UdpError::WouldBlock => SyscallError::WouldBlock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::network_interface::QdiscMode;
    use sim_time::SimulationTime;
    use std::time::Duration;

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

    fn test_host() -> Host {
        let iface = NetworkInterface::new(
            Ipv4Addr::new(10, 0, 0, 1),
            1024,
            1024,
            SimulationTime::from_duration(Duration::from_millis(5)),
            QdiscMode::Fifo,
            EmulatedTime::MIN,
        )
        .unwrap();
        Host::new(
            HostId::new(0),
            "test-host".into(),
            Ipv4Addr::new(10, 0, 0, 1),
            vec![iface],
            Cpu::new(1_000_000_000, 1_000_000_000, None, None),
            None,
            TcpConfig::default(),
        )
    }

    #[test]
    fn spawned_process_starts_and_echoes_through_host_owned_descriptors() {
        let mut host = test_host();
        let pid = host.spawn_process(vec![], Box::new(EchoOnce { fd: 0 }));
        host.start_process(pid, EmulatedTime::MIN);

        let fd = MIN_DESCRIPTOR;
        assert!(matches!(host.descriptors().get(fd), Some(Descriptor::Udp(_))));

        if let Some(Descriptor::Udp(socket)) = host.descriptors_mut().get_mut(fd) {
            socket.on_datagram(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9000), Bytes::from_static(b"ping"));
        }
        host.wake_process(pid, EmulatedTime::MIN);

        if let Some(Descriptor::Udp(socket)) = host.descriptors_mut().get_mut(fd) {
            let (dst, payload) = socket.pop_outgoing().unwrap();
            assert_eq!(dst.port(), 9000);
            assert_eq!(&payload[..], b"ping");
        } else {
            panic!("expected a udp descriptor");
        }
    }

    #[test]
    fn starting_an_unknown_process_id_is_a_no_op() {
        let mut host = test_host();
        host.start_process(ProcessId::new(99), EmulatedTime::MIN);
    }

    #[test]
    fn killed_process_ignores_further_wakes() {
        let mut host = test_host();
        let pid = host.spawn_process(vec![], Box::new(EchoOnce { fd: 0 }));
        host.start_process(pid, EmulatedTime::MIN);
        host.kill_process(pid);
        host.wake_process(pid, EmulatedTime::MIN);
        assert!(host.process(pid).is_some());
    }

    #[test]
    fn shutdown_clears_processes_and_descriptors() {
        let mut host = test_host();
        let pid = host.spawn_process(vec![], Box::new(EchoOnce { fd: 0 }));
        host.start_process(pid, EmulatedTime::MIN);
        host.shutdown();
        assert!(host.process(pid).is_none());
        assert!(!host.is_booted());
    }

    #[test]
    fn drain_outgoing_collects_every_bound_sockets_pending_datagrams() {
        let mut host = test_host();
        let pid = host.spawn_process(vec![], Box::new(EchoOnce { fd: 0 }));
        host.start_process(pid, EmulatedTime::MIN);
        if let Some(Descriptor::Udp(socket)) = host.descriptors_mut().get_mut(MIN_DESCRIPTOR) {
            socket
                .send_to(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9000), Bytes::from_static(b"hi"))
                .unwrap();
        }
        let drained = host.drain_outgoing_udp_datagrams();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].1.port(), 9000);
        assert!(host.drain_outgoing_udp_datagrams().is_empty());
    }

    #[test]
    fn deliver_routes_to_the_socket_bound_at_the_destination_address() {
        let mut host = test_host();
        let pid = host.spawn_process(vec![], Box::new(EchoOnce { fd: 0 }));
        host.start_process(pid, EmulatedTime::MIN);
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 2000);
        let src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9000);
        host.deliver_udp_datagram(dst, src, Bytes::from_static(b"hi"), EmulatedTime::MIN);
        if let Some(Descriptor::Udp(socket)) = host.descriptors_mut().get_mut(MIN_DESCRIPTOR) {
            let (from, payload) = socket.recv_from().unwrap();
            assert_eq!(from, src);
            assert_eq!(&payload[..], b"hi");
        } else {
            panic!("expected a udp descriptor");
        }
    }

    #[test]
    fn outbox_accumulates_and_drains() {
        let mut host = test_host();
        assert!(host.take_outbox().is_empty());
        let task = crate::core::work::task::TaskRef::new(|_: &mut Host, _: EmulatedTime| {});
        host.schedule_event(Event::new(EmulatedTime::MIN, host.id(), host.id(), 0, task));
        assert_eq!(host.take_outbox().len(), 1);
        assert!(host.take_outbox().is_empty());
    }

    #[test]
    fn bind_udp_with_port_zero_assigns_an_ephemeral_port() {
        worker::init_rng(1, 0);
        let mut host = test_host();
        let mut api = HostSyscallApi {
            host: &mut host,
            now: EmulatedTime::MIN,
        };
        let fd = api.socket_udp();
        api.bind_udp(fd, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 0)).unwrap();
        if let Some(Descriptor::Udp(socket)) = host.descriptors().get(fd) {
            assert!(socket.local_addr().unwrap().port() >= MIN_RANDOM_PORT);
        } else {
            panic!("expected a udp descriptor");
        }
    }

    #[test]
    fn send_to_on_an_unbound_socket_auto_binds_an_ephemeral_port() {
        worker::init_rng(1, 0);
        let mut host = test_host();
        let mut api = HostSyscallApi {
            host: &mut host,
            now: EmulatedTime::MIN,
        };
        let fd = api.socket_udp();
        let dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9000);
        api.send_to(fd, dst, b"hi").unwrap();
        if let Some(Descriptor::Udp(socket)) = host.descriptors().get(fd) {
            assert!(socket.local_addr().is_some());
        } else {
            panic!("expected a udp descriptor");
        }
    }

    #[test]
    fn tcp_connect_listen_accept_and_exchange_data_round_trips_through_syscall_api() {
        worker::init_rng(1, 0);
        let mut client = test_host();
        let mut server = test_host();

        let server_addr = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 80);
        let server_fd = {
            let mut api = HostSyscallApi {
                host: &mut server,
                now: EmulatedTime::MIN,
            };
            let fd = api.socket_tcp();
            api.listen_tcp(fd, server_addr, 4).unwrap();
            fd
        };

        let client_fd = {
            let mut api = HostSyscallApi {
                host: &mut client,
                now: EmulatedTime::MIN,
            };
            let fd = api.socket_tcp();
            api.connect_tcp(fd, server_addr).unwrap();
            fd
        };

        // hand the SYN straight to the server (no network plumbing in this unit test).
        let Some(Descriptor::Tcp(client_socket)) = client.descriptors_mut().get_mut(client_fd) else {
            panic!("expected a tcp descriptor");
        };
        let syn = client_socket.pop_packet().unwrap();
        let PacketHeader::Tcp(syn_header) = syn.header().clone() else {
            panic!("expected a tcp header");
        };
        server.deliver_packet(syn, EmulatedTime::MIN);
        let _ = syn_header;

        let accepted_fd = {
            let mut api = HostSyscallApi {
                host: &mut server,
                now: EmulatedTime::MIN,
            };
            api.accept_tcp(server_fd).unwrap()
        };
        assert!(matches!(server.descriptors().get(accepted_fd), Some(Descriptor::Tcp(_))));

        // the SYN-ACK was queued on the *listening* socket's out_queue (on_segment_listening
        // replies from `self`, not the freshly-accepted child), so it's drained from server_fd.
        let Some(Descriptor::Tcp(listening_socket)) = server.descriptors_mut().get_mut(server_fd) else {
            panic!("expected the listening tcp descriptor");
        };
        let syn_ack = listening_socket.pop_packet().unwrap();
        client.deliver_packet(syn_ack, EmulatedTime::MIN);

        let Some(Descriptor::Tcp(client_socket)) = client.descriptors_mut().get_mut(client_fd) else {
            panic!("expected a tcp descriptor");
        };
        let ack = client_socket.pop_packet().unwrap();
        server.deliver_packet(ack, EmulatedTime::MIN);

        {
            let mut api = HostSyscallApi {
                host: &mut client,
                now: EmulatedTime::MIN,
            };
            api.send_tcp(client_fd, b"hello").unwrap();
        }
        let Some(Descriptor::Tcp(client_socket)) = client.descriptors_mut().get_mut(client_fd) else {
            panic!("expected a tcp descriptor");
        };
        let data = client_socket.pop_packet().unwrap();
        server.deliver_packet(data, EmulatedTime::MIN);

        let received = {
            let mut api = HostSyscallApi {
                host: &mut server,
                now: EmulatedTime::MIN,
            };
            api.recv_tcp(accepted_fd, 1024).unwrap()
        };
        assert_eq!(received, b"hello");
    }

    #[test]
    fn epoll_reports_readiness_after_a_udp_socket_becomes_readable() {
        let mut host = test_host();
        let (fd, epoll_fd) = {
            let mut api = HostSyscallApi {
                host: &mut host,
                now: EmulatedTime::MIN,
            };
            let fd = api.socket_udp();
            api.bind_udp(fd, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 2000)).unwrap();
            let epoll_fd = api.epoll_create();
            api.epoll_ctl_add(epoll_fd, fd, tcp::PollState::READABLE).unwrap();
            (fd, epoll_fd)
        };
        assert!(host
            .descriptors()
            .get(epoll_fd)
            .unwrap()
            .poll_state()
            .is_empty());

        host.deliver_udp_datagram(
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 2000),
            SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 9000),
            Bytes::from_static(b"hi"),
            EmulatedTime::MIN,
        );
        let _ = fd;
        assert!(host
            .descriptors()
            .get(epoll_fd)
            .unwrap()
            .poll_state()
            .contains(tcp::PollState::READABLE));
    }

    #[test]
    fn timer_fires_and_self_reschedules_via_the_outbox() {
        let mut host = test_host();
        let fd = {
            let mut api = HostSyscallApi {
                host: &mut host,
                now: EmulatedTime::MIN,
            };
            let fd = api.timer_create();
            api.timer_arm(fd, EmulatedTime::MIN, SimulationTime::ZERO).unwrap();
            fd
        };
        host.drive_timers(EmulatedTime::MIN);
        if let Some(Descriptor::Timer(timer)) = host.descriptors_mut().get_mut(fd) {
            assert_eq!(timer.consume_expiration_count(), 1);
        } else {
            panic!("expected a timer descriptor");
        }
    }

    #[test]
    fn allocate_ephemeral_port_avoids_already_bound_ports() {
        worker::init_rng(2, 0);
        let mut host = test_host();
        let first = host.allocate_ephemeral_port();
        let fd = host.descriptors.add(Descriptor::Udp(UdpSocket::new(4)), MIN_DESCRIPTOR);
        if let Some(Descriptor::Udp(socket)) = host.descriptors_mut().get_mut(fd) {
            socket.bind(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), first));
        }
        let second = host.allocate_ephemeral_port();
        assert_ne!(first, second);
    }

    #[test]
    fn drain_egress_and_ingress_round_trip_a_udp_datagram_through_the_interface() {
        worker::init_rng(3, 0);
        let mut sender = test_host();
        let mut receiver = test_host();
        let server_addr = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 2000);
        let client_addr = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 5000);

        let fd = sender.descriptors.add(Descriptor::Udp(UdpSocket::new(4)), MIN_DESCRIPTOR);
        if let Some(Descriptor::Udp(socket)) = sender.descriptors_mut().get_mut(fd) {
            socket.bind(client_addr);
            socket.send_to(server_addr, Bytes::from_static(b"hi")).unwrap();
        }
        let recv_fd = receiver.descriptors.add(Descriptor::Udp(UdpSocket::new(4)), MIN_DESCRIPTOR);
        if let Some(Descriptor::Udp(socket)) = receiver.descriptors_mut().get_mut(recv_fd) {
            socket.bind(server_addr);
        }

        let sent = sender.drain_egress(EmulatedTime::MIN);
        assert_eq!(sent.len(), 1);
        let (packet, _delay) = sent.into_iter().next().unwrap();
        receiver.ingress(packet, EmulatedTime::MIN);

        if let Some(Descriptor::Udp(socket)) = receiver.descriptors_mut().get_mut(recv_fd) {
            let (from, payload) = socket.recv_from().unwrap();
            assert_eq!(from, client_addr);
            assert_eq!(&payload[..], b"hi");
        } else {
            panic!("expected the receiver's udp descriptor to still be present");
        }
    }
}
