//! The topology oracle: answers `latency`, `reliability`, and the run's current minimum link
//! latency (the scheduler's runahead floor). Grounded on the teacher's `network/graph` module,
//! but generalized away from its GML/`petgraph` edge-list model: the scenario actions this
//! workspace parses (`create-topology`) describe one flat network class at a time rather than a
//! graph of per-edge latencies, so there is nothing left to run a shortest-path search over —
//! every host pair draws from the same latency distribution.

use std::time::Duration;

use rand::Rng;
use sim_time::SimulationTime;

use crate::core::worker;

/// Answers latency/reliability queries for packet delivery between any two hosts.
pub trait Topology: Send + Sync {
    /// Draw one delivery latency. Re-sampled per packet so the CDF models jitter, not just a
    /// fixed per-pair delay.
    fn sample_latency(&self) -> SimulationTime;

    /// `true` if a packet sent now survives to delivery.
    fn sample_delivered(&self) -> bool;

    /// The smallest latency this topology can ever produce — the scheduler's conservative
    /// window barrier can never jump further than this without risking an out-of-order delivery.
    fn min_latency(&self) -> SimulationTime;
}

/// A single network class: one latency CDF (as a sorted list of millisecond samples) and one
/// scalar packet-survival probability, shared by every host pair in the simulation.
#[derive(Debug, Clone)]
pub struct FlatTopology {
    latency_cdf_ms: Vec<f64>,
    reliability: f64,
}

impl FlatTopology {
    pub fn new(mut latency_cdf_ms: Vec<f64>, reliability: f64) -> anyhow::Result<Self> {
        if latency_cdf_ms.is_empty() {
            anyhow::bail!("a topology's latency CDF must contain at least one sample");
        }
        if latency_cdf_ms.iter().any(|ms| !ms.is_finite() || *ms < 0.0) {
            anyhow::bail!("a topology's latency CDF samples must be finite and non-negative");
        }
        latency_cdf_ms.sort_by(f64::total_cmp);
        Ok(Self {
            latency_cdf_ms,
            reliability: reliability.clamp(0.0, 1.0),
        })
    }
}

impl Topology for FlatTopology {
    fn sample_latency(&self) -> SimulationTime {
        let ms = if self.latency_cdf_ms.len() == 1 {
            self.latency_cdf_ms[0]
        } else {
            let idx = worker::with_rng(|rng| rng.gen_range(0..self.latency_cdf_ms.len()));
            self.latency_cdf_ms[idx]
        };
        SimulationTime::from_duration(Duration::from_secs_f64(ms / 1000.0))
    }

    fn sample_delivered(&self) -> bool {
        if self.reliability >= 1.0 {
            return true;
        }
        if self.reliability <= 0.0 {
            return false;
        }
        worker::with_rng(|rng| rng.gen_bool(self.reliability))
    }

    fn min_latency(&self) -> SimulationTime {
        SimulationTime::from_duration(Duration::from_secs_f64(self.latency_cdf_ms[0] / 1000.0))
    }
}
