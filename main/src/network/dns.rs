//! The process-global, read-only-after-warmup name/address oracle (§4.6): a bidirectional map of
//! hostname to simulated IPv4 address to [`HostId`], built once while hosts are created and never
//! mutated again once the run starts.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use sim_time::HostId;

#[derive(Debug)]
struct Record {
    id: HostId,
    addr: Ipv4Addr,
    name: String,
}

/// Accumulates host registrations while the scenario's `create-host` actions are being applied.
#[derive(Debug, Default)]
pub struct DnsBuilder {
    by_name: HashMap<String, Record>,
    by_addr: HashMap<Ipv4Addr, HostId>,
}

impl DnsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loopback and unspecified addresses are never registered; they aren't reachable across the
    /// simulated network and every host already resolves `localhost` on its own.
    pub fn register(&mut self, id: HostId, addr: Ipv4Addr, name: String) {
        if addr.is_loopback() || addr.is_unspecified() {
            return;
        }
        self.by_addr.insert(addr, id);
        self.by_name.insert(name.clone(), Record { id, addr, name });
    }

    pub fn into_dns(self) -> Dns {
        Dns {
            by_name: self.by_name,
            by_addr: self.by_addr,
        }
    }
}

#[derive(Debug)]
pub struct Dns {
    by_name: HashMap<String, Record>,
    by_addr: HashMap<Ipv4Addr, HostId>,
}

impl Dns {
    pub fn addr_to_host_id(&self, addr: Ipv4Addr) -> Option<HostId> {
        self.by_addr.get(&addr).copied()
    }

    /// Returns `Err` when the guest sees this as `EAI_NONAME`.
    pub fn name_to_addr(&self, name: &str) -> Result<Ipv4Addr, UnknownHostError> {
        self.by_name
            .get(name)
            .map(|r| r.addr)
            .ok_or_else(|| UnknownHostError(name.to_owned()))
    }

    pub fn addr_to_name(&self, addr: Ipv4Addr) -> Option<&str> {
        self.by_addr
            .get(&addr)
            .and_then(|id| self.by_name.values().find(|r| r.id == *id))
            .map(|r| r.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHostError(String);

impl std::fmt::Display for UnknownHostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown host name '{}' (EAI_NONAME)", self.0)
    }
}

impl std::error::Error for UnknownHostError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_a() -> (HostId, Ipv4Addr, String) {
        (HostId::new(0), Ipv4Addr::new(100, 1, 2, 3), "myhost".into())
    }

    fn host_b() -> (HostId, Ipv4Addr, String) {
        (HostId::new(1), Ipv4Addr::new(200, 3, 2, 1), "theirhost".into())
    }

    #[test]
    fn lookups_resolve_both_directions() {
        let (id_a, addr_a, name_a) = host_a();
        let (id_b, addr_b, name_b) = host_b();

        let mut builder = DnsBuilder::new();
        builder.register(id_a, addr_a, name_a.clone());
        builder.register(id_b, addr_b, name_b.clone());
        let dns = builder.into_dns();

        assert_eq!(dns.addr_to_host_id(addr_a), Some(id_a));
        assert_eq!(dns.addr_to_host_id(addr_b), Some(id_b));
        assert_eq!(dns.addr_to_host_id(Ipv4Addr::new(1, 2, 3, 4)), None);

        assert_eq!(dns.name_to_addr(&name_a).unwrap(), addr_a);
        assert_eq!(dns.name_to_addr(&name_b).unwrap(), addr_b);
        assert!(dns.name_to_addr("nobody").is_err());
    }

    #[test]
    fn loopback_and_unspecified_are_never_registered() {
        let mut builder = DnsBuilder::new();
        builder.register(HostId::new(0), Ipv4Addr::LOCALHOST, "loopback".into());
        builder.register(HostId::new(0), Ipv4Addr::UNSPECIFIED, "unspec".into());
        let dns = builder.into_dns();
        assert!(dns.name_to_addr("loopback").is_err());
        assert!(dns.name_to_addr("unspec").is_err());
    }
}
