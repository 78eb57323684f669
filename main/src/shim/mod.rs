//! The interposition layer (spec.md §4.5). Substitutes an in-process trait-object/message-passing
//! substrate for real `LD_PRELOAD` symbol interposition per Design Note 9 — see `DESIGN.md`'s
//! Open Question decisions for why.

pub mod api;
pub mod registry;

pub use api::{GuestProgram, SyscallApi, SyscallError};
pub use registry::PluginRegistry;
