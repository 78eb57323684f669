//! Drives the same latency-delayed, possibly-lossy packet path the controller's round loop uses
//! (`Host::drain_egress` -> `Dns::addr_to_host_id` -> `Topology::sample_*` -> `Host::ingress`,
//! which itself threads the packet through this host's `Router`/`NetworkInterface`) directly
//! against two [`Host`]s, without going through [`shadow_rs::core::controller::Controller`] — this
//! exercises the wiring in isolation from scheduling and process lifecycle concerns.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use bytes::Bytes;
use sim_time::{EmulatedTime, HostId, SimulationTime};

use shadow_rs::host::cpu::Cpu;
use shadow_rs::host::descriptor::socket::udp::UdpSocket;
use shadow_rs::host::descriptor::table::MIN_DESCRIPTOR;
use shadow_rs::host::descriptor::Descriptor;
use shadow_rs::host::host::Host;
use shadow_rs::host::network_interface::{NetworkInterface, QdiscMode};
use shadow_rs::network::dns::DnsBuilder;
use shadow_rs::network::topology::{FlatTopology, Topology};

fn batch() -> SimulationTime {
    SimulationTime::from_duration(Duration::from_millis(5))
}

fn host(id: u32, ip: Ipv4Addr) -> Host {
    let iface = NetworkInterface::new(ip, 1024, 1024, batch(), QdiscMode::Fifo, EmulatedTime::MIN).unwrap();
    Host::new(
        HostId::new(id),
        format!("host{id}"),
        ip,
        vec![iface],
        Cpu::new(1_000_000_000, 1_000_000_000, None, None),
        None,
        tcp::TcpConfig::default(),
    )
}

#[test]
fn a_datagram_sent_on_one_host_arrives_on_another_after_the_sampled_latency() {
    let client_ip = Ipv4Addr::new(11, 0, 0, 1);
    let server_ip = Ipv4Addr::new(11, 0, 0, 2);
    let mut client = host(0, client_ip);
    let mut server = host(1, server_ip);

    let mut dns_builder = DnsBuilder::new();
    dns_builder.register(client.id(), client_ip, "client".into());
    dns_builder.register(server.id(), server_ip, "server".into());
    let dns = dns_builder.into_dns();

    let topology = FlatTopology::new(vec![20.0], 1.0).unwrap();

    let server_addr = SocketAddrV4::new(server_ip, 9000);
    let client_addr = SocketAddrV4::new(client_ip, 5000);

    let client_fd = client.descriptors_mut().add(Descriptor::Udp(UdpSocket::new(8)), MIN_DESCRIPTOR);
    if let Some(Descriptor::Udp(socket)) = client.descriptors_mut().get_mut(client_fd) {
        socket.bind(client_addr);
        socket.send_to(server_addr, Bytes::from_static(b"hello")).unwrap();
    }

    let server_fd = server.descriptors_mut().add(Descriptor::Udp(UdpSocket::new(8)), MIN_DESCRIPTOR);
    if let Some(Descriptor::Udp(socket)) = server.descriptors_mut().get_mut(server_fd) {
        socket.bind(server_addr);
    }

    let sent_at = EmulatedTime::MIN;
    let outgoing = client.drain_egress(sent_at);
    assert_eq!(outgoing.len(), 1);
    let (packet, send_delay) = outgoing.into_iter().next().unwrap();
    assert_eq!(packet.header().src(), client_addr);
    assert_eq!(packet.header().dst(), server_addr);

    let dst_host_id = dns
        .addr_to_host_id(*packet.header().dst().ip())
        .expect("server address should resolve");
    assert_eq!(dst_host_id, server.id());
    assert!(topology.sample_delivered());
    let arrival = sent_at.saturating_add(send_delay).saturating_add(topology.min_latency());
    assert!(arrival > sent_at);

    server.ingress(packet, sent_at);

    if let Some(Descriptor::Udp(socket)) = server.descriptors_mut().get_mut(server_fd) {
        let (from, bytes) = socket.recv_from().unwrap();
        assert_eq!(from, client_addr);
        assert_eq!(&bytes[..], b"hello");
    } else {
        panic!("expected the server's udp descriptor to still be present");
    }
}

#[test]
fn a_datagram_addressed_to_an_unregistered_ip_is_unroutable() {
    let client_ip = Ipv4Addr::new(11, 0, 0, 1);
    let mut client = host(0, client_ip);

    let dns_builder = DnsBuilder::new();
    let dns = dns_builder.into_dns();

    let client_fd = client.descriptors_mut().add(Descriptor::Udp(UdpSocket::new(8)), MIN_DESCRIPTOR);
    if let Some(Descriptor::Udp(socket)) = client.descriptors_mut().get_mut(client_fd) {
        socket.bind(SocketAddrV4::new(client_ip, 5000));
        socket
            .send_to(SocketAddrV4::new(Ipv4Addr::new(11, 0, 0, 99), 9000), Bytes::from_static(b"x"))
            .unwrap();
    }

    let (packet, _delay) = client.drain_egress(EmulatedTime::MIN).into_iter().next().unwrap();
    assert!(dns.addr_to_host_id(*packet.header().dst().ip()).is_none());
}
