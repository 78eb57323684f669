//! The simulation core as a library: scenario configuration, the round-driving controller, the
//! per-host network/process model, and the in-process guest substrate. `src/main.rs` is a thin
//! CLI wrapper around [`core::controller::Controller`]; everything else (including integration
//! tests under `tests/`) links against this crate directly.

pub mod core;
pub mod host;
pub mod network;
pub mod shim;
