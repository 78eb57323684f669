//! Everything that models one simulated machine: its CPU delay model, its descriptor table and
//! the descriptor kinds it can hold, its network device, its guest processes, and the `Host`
//! struct tying them together.

pub mod cpu;
pub mod descriptor;
pub mod host;
pub mod network_interface;
pub mod process;
