//! Time and identifier types shared across the simulator's crates.
//!
//! `SimulationTime` is a relative duration since simulation start; `EmulatedTime` is an absolute
//! instant, offset so that guest code which asks the wallclock for "now" sees a plausible recent
//! date rather than the Unix epoch. Keeping the two types distinct avoids an entire class of bugs
//! where a relative duration is mistaken for an absolute instant or vice versa.

pub mod emulated_time;
pub mod host_id;
pub mod simulation_time;

pub use emulated_time::EmulatedTime;
pub use host_id::HostId;
pub use simulation_time::SimulationTime;
