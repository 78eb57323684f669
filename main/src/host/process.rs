//! A simulated process: one guest program instance and its lifecycle state. Descriptors it opens
//! live in the owning host's [`crate::host::descriptor::table::DescriptorTable`] — a process
//! itself is just an identity plus the program driving it (spec.md §3's "Host ... a set of
//! Processes (guest instances)").

use crate::shim::{GuestProgram, SyscallApi};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u32);

impl ProcessId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "process-{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Exited,
}

pub struct Process {
    id: ProcessId,
    argv: Vec<String>,
    program: Box<dyn GuestProgram>,
    state: ProcessState,
}

impl Process {
    pub fn new(id: ProcessId, argv: Vec<String>, program: Box<dyn GuestProgram>) -> Self {
        Self {
            id,
            argv,
            program,
            state: ProcessState::NotStarted,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Calls the program's `new_cb`-equivalent entry point. A no-op, beyond the state
    /// transition, if already started.
    pub fn start(&mut self, api: &mut dyn SyscallApi) {
        if self.state != ProcessState::NotStarted {
            return;
        }
        self.program.start(api, &self.argv);
        self.state = ProcessState::Running;
    }

    /// Re-enters the program after a watched descriptor's readiness changed. A no-op for a
    /// process that hasn't started or has already exited.
    pub fn wake(&mut self, api: &mut dyn SyscallApi) {
        if self.state == ProcessState::Running {
            self.program.on_wake(api);
        }
    }

    pub fn kill(&mut self) {
        self.state = ProcessState::Exited;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shim::api::test_support::FakeSyscallApi;

    struct CountingProgram {
        starts: u32,
        wakes: u32,
    }

    impl GuestProgram for CountingProgram {
        fn start(&mut self, _api: &mut dyn SyscallApi, _argv: &[String]) {
            self.starts += 1;
        }

        fn on_wake(&mut self, _api: &mut dyn SyscallApi) {
            self.wakes += 1;
        }
    }

    #[test]
    fn start_is_idempotent() {
        let mut api = FakeSyscallApi::default();
        let mut process = Process::new(
            ProcessId::new(0),
            vec![],
            Box::new(CountingProgram { starts: 0, wakes: 0 }),
        );
        process.start(&mut api);
        process.start(&mut api);
        assert_eq!(process.state(), ProcessState::Running);
    }

    #[test]
    fn wake_before_start_or_after_kill_is_ignored() {
        let mut api = FakeSyscallApi::default();
        let mut process = Process::new(
            ProcessId::new(0),
            vec![],
            Box::new(CountingProgram { starts: 0, wakes: 0 }),
        );
        process.wake(&mut api);
        process.start(&mut api);
        process.kill();
        process.wake(&mut api);
        assert_eq!(process.state(), ProcessState::Exited);
    }
}
