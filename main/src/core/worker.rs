//! Thread-local context for the worker thread currently executing a host's event: which host and
//! process are active, a per-thread deterministic RNG, and a cache of "what time is it" — so code
//! deep in a call stack (logging, descriptor allocation, RNG use) doesn't need every intermediate
//! caller to thread these through explicitly.

use std::cell::RefCell;

use log::LevelFilter;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use sim_time::{EmulatedTime, HostId};

use crate::host::process::ProcessId;

#[derive(Default)]
struct WorkerContext {
    host_id: Option<HostId>,
    host_name: Option<String>,
    host_log_override: Option<LevelFilter>,
    process_id: Option<ProcessId>,
    now: Option<EmulatedTime>,
}

thread_local! {
    static CONTEXT: RefCell<WorkerContext> = RefCell::new(WorkerContext::default());
    static RNG: RefCell<Option<Xoshiro256PlusPlus>> = RefCell::new(None);
}

/// Seed this worker thread's RNG. Called once per worker thread at pool startup; `thread_index`
/// is folded into the master seed so every thread draws from an independent, reproducible stream.
pub fn init_rng(master_seed: u64, thread_index: usize) {
    let seed = master_seed ^ (thread_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    RNG.with(|rng| *rng.borrow_mut() = Some(Xoshiro256PlusPlus::seed_from_u64(seed)));
}

/// Run `f` with mutable access to this worker thread's RNG.
///
/// # Panics
/// Panics if [`init_rng`] was never called on this thread.
pub fn with_rng<R>(f: impl FnOnce(&mut Xoshiro256PlusPlus) -> R) -> R {
    RNG.with(|rng| {
        let mut rng = rng.borrow_mut();
        let rng = rng.as_mut().expect("worker RNG used before init_rng was called");
        f(rng)
    })
}

/// Mark `host` as the one whose event this thread is currently executing. Events always run with
/// exactly one host active; nested activation (an event scheduling another host's event inline)
/// is a programming error the scheduler never does — cross-host work always goes through a
/// posted `Event`, never a direct call.
pub fn set_active_host(host_id: HostId, host_name: String, log_override: Option<LevelFilter>, now: EmulatedTime) {
    CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.host_id = Some(host_id);
        ctx.host_name = Some(host_name);
        ctx.host_log_override = log_override;
        ctx.now = Some(now);
    });
}

pub fn clear_active_host() {
    CONTEXT.with(|ctx| *ctx.borrow_mut() = WorkerContext::default());
}

pub fn set_active_process(process_id: Option<ProcessId>) {
    CONTEXT.with(|ctx| ctx.borrow_mut().process_id = process_id);
}

pub fn active_host_id() -> Option<HostId> {
    CONTEXT.with(|ctx| ctx.borrow().host_id)
}

pub fn active_process_id() -> Option<ProcessId> {
    CONTEXT.with(|ctx| ctx.borrow().process_id)
}

pub fn active_host_display_name() -> Option<String> {
    CONTEXT.with(|ctx| ctx.borrow().host_name.clone())
}

pub fn active_host_log_override() -> Option<LevelFilter> {
    CONTEXT.with(|ctx| ctx.borrow().host_log_override)
}

/// The simulated time at which the currently-executing event was scheduled to run.
pub fn active_time() -> Option<EmulatedTime> {
    CONTEXT.with(|ctx| ctx.borrow().now)
}
