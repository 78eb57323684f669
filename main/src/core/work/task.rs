//! Deferred callables. A [`TaskRef`] is the Rust-native stand-in for the spec's reference-counted
//! `(callback, object ptr, argument ptr, free hooks)` tuple: instead of two opaque pointers and
//! two free-function pointers, we close over owned state in a boxed closure and let `Arc`'s drop
//! glue do the freeing.

use std::sync::Arc;

use sim_time::EmulatedTime;

use crate::host::host::Host;

/// A task is executed with its destination host locked (the active-host slot set) and may create
/// more tasks/events as a side effect of running.
pub trait Task: Send + Sync {
    fn run(&self, host: &mut Host, now: EmulatedTime);
}

impl<F> Task for F
where
    F: Fn(&mut Host, EmulatedTime) + Send + Sync,
{
    fn run(&self, host: &mut Host, now: EmulatedTime) {
        (self)(host, now)
    }
}

/// A cheaply-cloned reference to a [`Task`]. Cloning an `Event` clones this, not the task's
/// closed-over state — the last clone to drop runs the `Arc`'s destructor.
#[derive(Clone)]
pub struct TaskRef(Arc<dyn Task>);

impl TaskRef {
    pub fn new<T: Task + 'static>(task: T) -> Self {
        Self(Arc::new(task))
    }

    pub fn run(&self, host: &mut Host, now: EmulatedTime) {
        self.0.run(host, now);
    }
}

impl std::fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskRef(..)")
    }
}
