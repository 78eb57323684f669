//! Builds a simulation from a loaded [`SimConfig`] and drives it to completion: validates the
//! scenario's action list, builds hosts/topology/DNS, wires the scheduler, and runs the
//! conservative round loop until the event queue drains or a `kill-at` time is reached.
//!
//! Grounded on the teacher's `core/manager.rs`/`core/worker.rs` round-driving split, simplified
//! onto [`scheduler::pool::WorkerPool`]'s re-spawn-per-round model: since `run_round`'s
//! `std::thread::scope` join already synchronizes every worker at round end, this controller has
//! no separate use for `scheduler::barrier::RoundBarrier` (that primitive exists for a
//! persistent-thread pool design the teacher uses; see `DESIGN.md`).

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atomic_refcell::AtomicRefCell;

use scheduler::barrier::{next_round_end, RunaheadTracker};
use scheduler::{Policy, PolicyKind, SchedEvent, WorkerPool};
use sim_time::{EmulatedTime, HostId, SimulationTime};

use crate::core::config::{self, Action, CliQdisc, SimConfig};
use crate::core::sim_stats::SimStats;
use crate::core::work::event::Event;
use crate::core::work::task::TaskRef;
use crate::core::worker;
use crate::host::cpu::Cpu;
use crate::host::host::Host;
use crate::host::network_interface::{NetworkInterface, QdiscMode};
use crate::network::dns::{Dns, DnsBuilder};
use crate::network::topology::{FlatTopology, Topology};
use crate::shim::PluginRegistry;

/// The first usable address of the 11.0.0.0/8 range Shadow-style simulations conventionally draw
/// simulated host addresses from, kept clear of loopback/unspecified/multicast ranges.
const AUTO_IP_BASE: u32 = 0x0B00_0001;

pub struct Controller {
    config: SimConfig,
    registry: PluginRegistry,
}

impl Controller {
    pub fn new(config: SimConfig) -> Self {
        Self::with_registry(config, PluginRegistry::new())
    }

    /// Like [`Self::new`], but with a [`PluginRegistry`] an embedder has already populated with
    /// real `GuestProgram` factories — without this, `add-application` actions are validated and
    /// scheduled but never actually start a program, since loading real guest code is out of
    /// scope (spec.md §1).
    pub fn with_registry(config: SimConfig, registry: PluginRegistry) -> Self {
        Self { config, registry }
    }

    pub fn run(&self) -> anyhow::Result<SimStats> {
        let stats = SimStats::new();

        let plugin_paths = collect_plugin_paths(&self.config.scenario.actions)?;
        let topology = build_topology(&self.config.scenario.actions)?;

        let num_workers = self.config.num_workers();
        let policy_kind: PolicyKind = self.config.cli.scheduler_policy.into();
        let policy: Policy<Event> = Policy::new(policy_kind, num_workers, 1);
        let pool = WorkerPool::new(num_workers);

        let (hosts, host_ids_by_name, dns) = self.build_hosts(&policy, num_workers)?;

        let runahead = RunaheadTracker::new(topology.min_latency().min(SimulationTime::from_duration(
            Duration::from_millis(self.config.cli.runahead_ms),
        )));

        let mut end_time = EmulatedTime::MAX;
        for action in &self.config.scenario.actions {
            if let Action::KillAt { time } = action {
                let at = EmulatedTime::SIMULATION_START.saturating_add(config::to_simulation_time(*time));
                end_time = end_time.min(at);
            }
        }

        let registry = Arc::new(self.registry.clone());
        for action in &self.config.scenario.actions {
            let Action::AddApplication {
                host_pattern,
                plugin_id,
                start_time,
                stop_time,
                arg_string,
                preload: _,
            } = action
            else {
                continue;
            };
            if !plugin_paths.contains_key(plugin_id) {
                anyhow::bail!("add-application references unknown plugin id: {plugin_id}");
            }
            let mut matching = matching_hosts(host_pattern, &host_ids_by_name);
            if matching.is_empty() {
                anyhow::bail!("add-application host-pattern '{host_pattern}' matched no hosts");
            }
            matching.sort();

            let argv: Vec<String> = arg_string.split_whitespace().map(str::to_owned).collect();
            let start_at = EmulatedTime::SIMULATION_START.saturating_add(config::to_simulation_time(*start_time));

            for host_id in matching {
                let spawned = Arc::new(Mutex::new(None));
                let plugin_id = plugin_id.clone();
                let argv = argv.clone();
                let registry = Arc::clone(&registry);
                let spawned_for_start = Arc::clone(&spawned);
                let start_task = TaskRef::new(move |host: &mut Host, now: EmulatedTime| {
                    let Some(program) = registry.instantiate(&plugin_id) else {
                        return;
                    };
                    let pid = host.spawn_process(argv.clone(), program);
                    host.start_process(pid, now);
                    *spawned_for_start.lock().unwrap() = Some(pid);
                });
                policy.push(
                    Event::new(start_at, host_id, host_id, 0, start_task),
                    EmulatedTime::MAX,
                );

                if let Some(stop_time) = stop_time {
                    let stop_at = EmulatedTime::SIMULATION_START.saturating_add(config::to_simulation_time(*stop_time));
                    let spawned_for_stop = Arc::clone(&spawned);
                    let stop_task = TaskRef::new(move |host: &mut Host, _now: EmulatedTime| {
                        if let Some(pid) = *spawned_for_stop.lock().unwrap() {
                            host.kill_process(pid);
                        }
                    });
                    policy.push(Event::new(stop_at, host_id, host_id, 1, stop_task), EmulatedTime::MAX);
                }
            }
        }

        let seed = self.config.cli.seed;
        let mut now = EmulatedTime::SIMULATION_START;
        let mut round = 0u64;

        loop {
            if now >= end_time {
                break;
            }
            let min_next = (0..num_workers).map(|t| policy.next_time(t)).min().unwrap_or(EmulatedTime::MAX);
            if min_next == EmulatedTime::MAX {
                break;
            }
            let round_end = next_round_end(now, &runahead).min(end_time);

            pool.run_round(|thread_index| {
                let round_seed = seed ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15);
                worker::init_rng(round_seed, thread_index);
                while let Some(event) = policy.pop(thread_index, round_end) {
                    let host_arc = hosts
                        .get(&event.dst_host())
                        .expect("event addressed to a host that was never registered")
                        .clone();
                    let mut host = host_arc.borrow_mut();
                    worker::set_active_host(host.id(), host.name().to_string(), host.log_override(), event.time());
                    event.task().run(&mut host, event.time());
                    worker::clear_active_host();
                    stats.record_event(event.time());
                    for outbound in host.take_outbox() {
                        policy.push(outbound, round_end);
                    }

                    let src_host_id = host.id();
                    let src_sequence_base = host.next_sequence();
                    for (seq_offset, (packet, send_delay)) in
                        host.drain_egress(event.time()).into_iter().enumerate()
                    {
                        let Some(dst_host_id) = dns.addr_to_host_id(*packet.header().dst().ip()) else {
                            // unroutable destination: no host in this simulation owns that
                            // address, same as a real packet dying at the edge of the network.
                            continue;
                        };
                        if !topology.sample_delivered() {
                            continue;
                        }
                        let arrival = event
                            .time()
                            .saturating_add(send_delay)
                            .saturating_add(topology.sample_latency());
                        let deliver = TaskRef::new(move |dst_host: &mut Host, now: EmulatedTime| {
                            dst_host.ingress(packet.clone(), now);
                        });
                        policy.push(
                            Event::new(
                                arrival,
                                src_host_id,
                                dst_host_id,
                                src_sequence_base + seq_offset as u64,
                                deliver,
                            ),
                            round_end,
                        );
                    }
                }
            });

            let min_next_after = (0..num_workers).map(|t| policy.next_time(t)).min().unwrap_or(EmulatedTime::MAX);
            now = min_next_after.max(round_end);
            round += 1;
        }

        Ok(stats)
    }

    fn build_hosts(
        &self,
        policy: &Policy<Event>,
        num_workers: usize,
    ) -> anyhow::Result<(HashMap<HostId, Arc<AtomicRefCell<Host>>>, HashMap<String, HostId>, Dns)> {
        let mut hosts = HashMap::new();
        let mut host_ids_by_name = HashMap::new();
        let mut dns_builder = DnsBuilder::new();

        let mut next_host_id = 0u32;
        let mut next_ip_suffix = 0u32;

        let batch_interval = SimulationTime::from_duration(Duration::from_micros(self.config.cli.interface_batch_us));
        let qdisc = match self.config.cli.interface_qdisc {
            CliQdisc::Fifo => QdiscMode::Fifo,
            CliQdisc::Rr => QdiscMode::RoundRobin,
        };
        let cpu_threshold = SimulationTime::from_duration(Duration::from_micros(self.config.cli.cpu_threshold_us));
        let cpu_precision = SimulationTime::from_duration(Duration::from_micros(self.config.cli.cpu_precision_us));

        let mut tcp_config = tcp::TcpConfig::new(self.config.cli.tcp_congestion_control.into());
        tcp_config.send_buffer_initial = self
            .config
            .cli
            .socket_send_buffer
            .unwrap_or_else(|| self.config.cli.tcp_windows.saturating_mul(tcp::congestion::MSS));
        tcp_config.recv_buffer_initial = self
            .config
            .cli
            .socket_recv_buffer
            .unwrap_or_else(|| self.config.cli.tcp_windows.saturating_mul(tcp::congestion::MSS));
        tcp_config.autotuning_enabled =
            self.config.cli.socket_send_buffer.is_none() && self.config.cli.socket_recv_buffer.is_none();

        for action in &self.config.scenario.actions {
            let Action::CreateHost {
                id,
                ip_hint,
                bandwidth_up_kibps,
                bandwidth_down_kibps,
                cpu_freq_mhz,
                quantity,
            } = action
            else {
                continue;
            };
            if *quantity == 0 {
                anyhow::bail!("create-host '{id}' requested quantity 0");
            }
            for i in 0..*quantity {
                let name = if *quantity == 1 { id.clone() } else { format!("{id}{i}") };
                if host_ids_by_name.contains_key(&name) {
                    anyhow::bail!("duplicate host id: {name}");
                }

                let ip = if *quantity == 1 {
                    match ip_hint {
                        Some(hint) => hint
                            .parse()
                            .map_err(|_| anyhow::anyhow!("invalid ip-hint '{hint}' for host {name}"))?,
                        None => {
                            let ip = Ipv4Addr::from(AUTO_IP_BASE.wrapping_add(next_ip_suffix));
                            next_ip_suffix += 1;
                            ip
                        }
                    }
                } else {
                    let ip = Ipv4Addr::from(AUTO_IP_BASE.wrapping_add(next_ip_suffix));
                    next_ip_suffix += 1;
                    ip
                };

                let host_id = HostId::new(next_host_id);
                next_host_id += 1;

                let interface = NetworkInterface::new(
                    ip,
                    *bandwidth_up_kibps,
                    *bandwidth_down_kibps,
                    batch_interval,
                    qdisc,
                    EmulatedTime::SIMULATION_START,
                )
                .ok_or_else(|| anyhow::anyhow!("invalid network interface parameters for host {name}"))?;

                let hz = (*cpu_freq_mhz).saturating_mul(1_000_000);
                let cpu = Cpu::new(hz, hz, Some(cpu_threshold), Some(cpu_precision));
                let host = Host::new(host_id, name.clone(), ip, vec![interface], cpu, None, tcp_config);

                dns_builder.register(host_id, ip, name.clone());
                host_ids_by_name.insert(name, host_id);
                hosts.insert(host_id, Arc::new(AtomicRefCell::new(host)));

                let assigned_thread = (host_id.get() as usize) % num_workers;
                policy.add_host(host_id, assigned_thread);
            }
        }

        if hosts.is_empty() {
            anyhow::bail!("scenario has no create-host actions");
        }

        Ok((hosts, host_ids_by_name, dns_builder.into_dns()))
    }
}

fn collect_plugin_paths(actions: &[Action]) -> anyhow::Result<HashMap<String, std::path::PathBuf>> {
    let mut plugin_paths = HashMap::new();
    for action in actions {
        if let Action::CreatePlugin { id, path } = action {
            if plugin_paths.insert(id.clone(), path.clone()).is_some() {
                anyhow::bail!("duplicate plugin id: {id}");
            }
        }
    }
    Ok(plugin_paths)
}

fn build_topology(actions: &[Action]) -> anyhow::Result<FlatTopology> {
    let mut found = None;
    for action in actions {
        if let Action::CreateTopology {
            latency_cdf_ms,
            reliability,
            bandwidth_kibps: _,
        } = action
        {
            if found.replace((latency_cdf_ms.clone(), *reliability)).is_some() {
                anyhow::bail!("scenario has more than one create-topology action");
            }
        }
    }
    let (latency_cdf_ms, reliability) = found.ok_or_else(|| anyhow::anyhow!("scenario has no create-topology action"))?;
    FlatTopology::new(latency_cdf_ms, reliability)
}

/// `"*"` matches every known host; anything else must name a host exactly (an Open Question
/// decision — see `DESIGN.md` — since the distilled scenario format never specifies a glob
/// syntax for `host-pattern`).
fn matching_hosts(pattern: &str, host_ids_by_name: &HashMap<String, HostId>) -> Vec<HostId> {
    if pattern == "*" {
        host_ids_by_name.values().copied().collect()
    } else {
        host_ids_by_name.get(pattern).copied().into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{CliCongestionControl, CliOptions, CliSchedulerPolicy, Scenario};

    fn cli() -> CliOptions {
        CliOptions {
            scenario: "unused".into(),
            workers: 1,
            seed: 1,
            runahead_ms: 10,
            scheduler_policy: CliSchedulerPolicy::Host,
            cpu_threshold_us: 1000,
            cpu_precision_us: 200,
            tcp_windows: 10,
            tcp_congestion_control: CliCongestionControl::Reno,
            interface_buffer: 1024 * 1024,
            interface_batch_us: 5000,
            socket_send_buffer: None,
            socket_recv_buffer: None,
            interface_qdisc: CliQdisc::Fifo,
            log_level: None,
            debug_hosts: None,
        }
    }

    fn scenario(actions: Vec<Action>) -> Scenario {
        Scenario { actions }
    }

    #[test]
    fn run_with_no_applications_reaches_kill_at_and_records_no_events() {
        let config = SimConfig {
            cli: cli(),
            scenario: scenario(vec![
                Action::CreateTopology {
                    latency_cdf_ms: vec![10.0],
                    reliability: 1.0,
                    bandwidth_kibps: 1024,
                },
                Action::CreateHost {
                    id: "server".into(),
                    ip_hint: None,
                    bandwidth_up_kibps: 1024,
                    bandwidth_down_kibps: 1024,
                    cpu_freq_mhz: 2000,
                    quantity: 1,
                },
                Action::KillAt { time: 1.0 },
            ]),
        };
        let controller = Controller::new(config);
        let stats = controller.run().unwrap();
        assert_eq!(stats.events_executed(), 0);
        assert!(!stats.had_fatal_error());
    }

    #[test]
    fn add_application_referencing_unknown_plugin_id_is_rejected() {
        let config = SimConfig {
            cli: cli(),
            scenario: scenario(vec![
                Action::CreateTopology {
                    latency_cdf_ms: vec![10.0],
                    reliability: 1.0,
                    bandwidth_kibps: 1024,
                },
                Action::CreateHost {
                    id: "server".into(),
                    ip_hint: None,
                    bandwidth_up_kibps: 1024,
                    bandwidth_down_kibps: 1024,
                    cpu_freq_mhz: 2000,
                    quantity: 1,
                },
                Action::AddApplication {
                    host_pattern: "server".into(),
                    plugin_id: "nonexistent".into(),
                    start_time: 0.0,
                    stop_time: None,
                    arg_string: String::new(),
                    preload: false,
                },
            ]),
        };
        let controller = Controller::new(config);
        assert!(controller.run().is_err());
    }

    #[test]
    fn quantity_expands_hosts_with_suffixed_names() {
        let config = SimConfig {
            cli: cli(),
            scenario: scenario(vec![
                Action::CreateTopology {
                    latency_cdf_ms: vec![10.0],
                    reliability: 1.0,
                    bandwidth_kibps: 1024,
                },
                Action::CreateHost {
                    id: "client".into(),
                    ip_hint: None,
                    bandwidth_up_kibps: 1024,
                    bandwidth_down_kibps: 1024,
                    cpu_freq_mhz: 2000,
                    quantity: 3,
                },
                Action::KillAt { time: 1.0 },
            ]),
        };
        let controller = Controller::new(config);
        let stats = controller.run().unwrap();
        assert!(!stats.had_fatal_error());
    }

    #[test]
    fn scenario_without_a_topology_is_rejected() {
        let config = SimConfig {
            cli: cli(),
            scenario: scenario(vec![Action::CreateHost {
                id: "server".into(),
                ip_hint: None,
                bandwidth_up_kibps: 1024,
                bandwidth_down_kibps: 1024,
                cpu_freq_mhz: 2000,
                quantity: 1,
            }]),
        };
        let controller = Controller::new(config);
        assert!(controller.run().is_err());
    }
}
