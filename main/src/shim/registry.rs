//! Maps a scenario's plugin id (the `id` in a `CreatePlugin { id, path }` action) to a factory
//! producing a fresh [`GuestProgram`] per simulated process — the in-process stand-in for
//! `dlopen`ing a shared object and invoking its registered `new_cb`. Real `.so` loading is out of
//! scope (spec.md §1); an embedder that wants a scenario's applications to actually run code
//! registers a factory here under the same id the scenario's `CreatePlugin` action declares.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::api::GuestProgram;

type Factory = Arc<dyn Fn() -> Box<dyn GuestProgram> + Send + Sync>;

#[derive(Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, (PathBuf, Factory)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self { plugins: HashMap::new() }
    }

    /// Returns `false` if `id` was already registered (spec.md §7's "duplicate host id"-style
    /// config error applies equally to duplicate plugin ids).
    pub fn register(
        &mut self,
        id: impl Into<String>,
        path: PathBuf,
        factory: impl Fn() -> Box<dyn GuestProgram> + Send + Sync + 'static,
    ) -> bool {
        match self.plugins.entry(id.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert((path, Arc::new(factory)));
                true
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn path_of(&self, id: &str) -> Option<&PathBuf> {
        self.plugins.get(id).map(|(path, _)| path)
    }

    /// Instantiate a fresh program for `id`, or `None` if no factory was registered for it (the
    /// process is still schedulable — see `DESIGN.md` — it just never receives a `start` call).
    pub fn instantiate(&self, id: &str) -> Option<Box<dyn GuestProgram>> {
        self.plugins.get(id).map(|(_, factory)| factory())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shim::api::SyscallApi;

    struct NoOpProgram;
    impl GuestProgram for NoOpProgram {
        fn start(&mut self, _api: &mut dyn SyscallApi, _argv: &[String]) {}
        fn on_wake(&mut self, _api: &mut dyn SyscallApi) {}
    }

    #[test]
    fn registering_the_same_id_twice_is_rejected() {
        let mut registry = PluginRegistry::new();
        assert!(registry.register("echo", PathBuf::from("echo.so"), || Box::new(NoOpProgram)));
        assert!(!registry.register("echo", PathBuf::from("echo.so"), || Box::new(NoOpProgram)));
    }

    #[test]
    fn instantiate_produces_an_independent_program_each_call() {
        let mut registry = PluginRegistry::new();
        registry.register("echo", PathBuf::from("echo.so"), || Box::new(NoOpProgram));
        assert!(registry.instantiate("echo").is_some());
        assert!(registry.instantiate("missing").is_none());
    }
}
