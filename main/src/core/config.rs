//! CLI parsing (via [`clap`]) and the post-parse scenario struct tree (via [`serde`]) that make
//! up Shadow-rs's configuration surface. The actual scenario *parser* (originally XML) is out of
//! scope (`spec.md` §1); this module owns only what the core consumes — a YAML document shaped
//! like the action list in §6, since an `Action` tree is all the core actually needs and YAML is
//! already one of the teacher's dependencies.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use sim_time::SimulationTime;

use scheduler::PolicyKind;
use tcp::CongestionControlKind;

/// Mirrors `--scheduler-policy {global|thread|host|steal|threadXthread|threadXhost}` from §6.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliSchedulerPolicy {
    Global,
    Thread,
    Host,
    Steal,
    ThreadXthread,
    ThreadXhost,
}

impl From<CliSchedulerPolicy> for PolicyKind {
    fn from(p: CliSchedulerPolicy) -> Self {
        match p {
            CliSchedulerPolicy::Global => PolicyKind::GlobalSingle,
            CliSchedulerPolicy::Thread => PolicyKind::ThreadSingle,
            CliSchedulerPolicy::Host => PolicyKind::HostSingle,
            CliSchedulerPolicy::Steal => PolicyKind::HostSteal,
            CliSchedulerPolicy::ThreadXhost => PolicyKind::ThreadPerHost,
            CliSchedulerPolicy::ThreadXthread => PolicyKind::ThreadPerThread,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliCongestionControl {
    Aimd,
    Reno,
    Cubic,
}

impl From<CliCongestionControl> for CongestionControlKind {
    fn from(c: CliCongestionControl) -> Self {
        match c {
            CliCongestionControl::Aimd => CongestionControlKind::Aimd,
            CliCongestionControl::Reno => CongestionControlKind::Reno,
            CliCongestionControl::Cubic => CongestionControlKind::Cubic,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CliQdisc {
    Fifo,
    Rr,
}

/// Shadow-rs's CLI surface (§6). Corresponds 1:1 to the teacher's `CliOptions`/`GeneralOptions`
/// split, flattened here since this rewrite's option set is smaller.
#[derive(Debug, Clone, Parser)]
#[clap(name = "shadow-rs", about = "Run real applications over simulated networks.")]
pub struct CliOptions {
    /// Path to the YAML scenario document describing hosts, plugins, and topology edges.
    pub scenario: PathBuf,

    /// Number of worker threads. 0 means one single-threaded worker.
    #[clap(long, default_value_t = 0)]
    pub workers: u32,

    /// Master seed for all per-host RNGs.
    #[clap(long, default_value_t = 1)]
    pub seed: u64,

    /// Minimum network runahead, in milliseconds, to use before any topology edge latency has
    /// been observed.
    #[clap(long, default_value_t = 10)]
    pub runahead_ms: u64,

    #[clap(long, value_enum, default_value_t = CliSchedulerPolicy::Host)]
    pub scheduler_policy: CliSchedulerPolicy,

    /// CPU delay threshold, in microseconds, above which a host's CPU model begins throttling.
    #[clap(long, default_value_t = 1000)]
    pub cpu_threshold_us: u64,

    /// CPU model's delay accounting granularity, in microseconds.
    #[clap(long, default_value_t = 200)]
    pub cpu_precision_us: u64,

    /// TCP advertised window size, in MSS-sized segments.
    #[clap(long, default_value_t = 10)]
    pub tcp_windows: u32,

    #[clap(long, value_enum, default_value_t = CliCongestionControl::Reno)]
    pub tcp_congestion_control: CliCongestionControl,

    /// Network interface egress/ingress buffer size, in bytes.
    #[clap(long, default_value_t = 1024 * 1024)]
    pub interface_buffer: u64,

    /// Network interface token-bucket refill interval, in microseconds.
    #[clap(long, default_value_t = 5000)]
    pub interface_batch_us: u64,

    /// Initial TCP/UDP socket send buffer size, in bytes. Also disables buffer autotuning if set
    /// explicitly (§8 scenario 5), since an explicit size is a statement of intent.
    #[clap(long)]
    pub socket_send_buffer: Option<u32>,

    #[clap(long)]
    pub socket_recv_buffer: Option<u32>,

    #[clap(long, value_enum, default_value_t = CliQdisc::Fifo)]
    pub interface_qdisc: CliQdisc,

    #[clap(long, value_parser = parse_log_level)]
    pub log_level: Option<LevelFilter>,

    /// Pause process start on the comma-delimited list of hostnames, to allow a debugger to
    /// attach before the guest runs.
    #[clap(long, value_delimiter = ',')]
    pub debug_hosts: Option<HashSet<String>>,
}

fn parse_log_level(s: &str) -> Result<LevelFilter, String> {
    s.parse().map_err(|_| format!("invalid log level '{s}'"))
}

/// One entry of the scenario's action list (§6). The core consumes only the post-parse tree; an
/// external XML-or-otherwise parser is responsible for producing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    CreatePlugin { id: String, path: PathBuf },
    CreateTopology {
        latency_cdf_ms: Vec<f64>,
        reliability: f64,
        bandwidth_kibps: u64,
    },
    CreateHost {
        id: String,
        ip_hint: Option<String>,
        bandwidth_up_kibps: u64,
        bandwidth_down_kibps: u64,
        cpu_freq_mhz: u64,
        #[serde(default = "one")]
        quantity: u32,
    },
    AddApplication {
        host_pattern: String,
        plugin_id: String,
        start_time: SimulationTimeSeconds,
        stop_time: Option<SimulationTimeSeconds>,
        arg_string: String,
        #[serde(default)]
        preload: bool,
    },
    KillAt { time: SimulationTimeSeconds },
}

fn one() -> u32 {
    1
}

/// A plain `f64` of seconds in the scenario document, converted to [`SimulationTime`] once
/// loaded — keeping the wire format human-writable without coupling it to the nanosecond-count
/// internal representation.
pub type SimulationTimeSeconds = f64;

pub fn to_simulation_time(seconds: SimulationTimeSeconds) -> SimulationTime {
    SimulationTime::from_duration(std::time::Duration::from_secs_f64(seconds.max(0.0)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub actions: Vec<Action>,
}

impl Scenario {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading scenario file {}: {e}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing scenario file {}: {e}", path.display()))?;
        Ok(scenario)
    }
}

/// The fully-resolved simulation configuration: CLI options plus the loaded scenario, ready for
/// [`crate::core::controller::Controller::new`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub cli: CliOptions,
    pub scenario: Scenario,
}

impl SimConfig {
    pub fn from_cli(cli: &CliOptions) -> anyhow::Result<Self> {
        let scenario = Scenario::load(&cli.scenario)?;
        Ok(Self {
            cli: cli.clone(),
            scenario,
        })
    }

    pub fn num_workers(&self) -> usize {
        if self.cli.workers == 0 {
            1
        } else {
            self.cli.workers as usize
        }
    }
}
