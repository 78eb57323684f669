//! Readiness aggregator over a set of watched descriptor handles (spec §4.4). Register/modify/
//! remove touch a single `HashMap` entry; the ready set is a union of each watched handle's
//! current status bits masked by its registered interest.
//!
//! Pull model, consistent with [`crate::host::descriptor::timer::Timer`] and `tcp::TcpState`:
//! nothing here observes a watched descriptor's state changing on its own. The teacher's
//! `host/descriptor/epoll.rs` instead registers a `StatusListener` callback on every watched
//! descriptor and maintains a live ready set incrementally; this workspace recomputes it instead
//! via [`Epoll::refresh`], called by the host's event loop whenever a watched descriptor might
//! have changed state.

use std::collections::HashMap;

use crate::host::descriptor::table::DescriptorTable;

pub struct Epoll {
    interests: HashMap<u32, tcp::PollState>,
    ready_count: usize,
}

impl Epoll {
    pub fn new() -> Self {
        Self {
            interests: HashMap::new(),
            ready_count: 0,
        }
    }

    pub fn add(&mut self, handle: u32, interest: tcp::PollState) {
        self.interests.insert(handle, interest);
    }

    /// Returns `false` if `handle` wasn't registered.
    pub fn modify(&mut self, handle: u32, interest: tcp::PollState) -> bool {
        match self.interests.get_mut(&handle) {
            Some(slot) => {
                *slot = interest;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, handle: u32) -> bool {
        self.interests.remove(&handle).is_some()
    }

    pub fn is_watching(&self, handle: u32) -> bool {
        self.interests.contains_key(&handle)
    }

    /// The handles whose current status intersects their registered interest, paired with the
    /// intersected bits (mirrors `epoll_wait`'s `struct epoll_event` array).
    pub fn ready_set(&self, table: &DescriptorTable) -> Vec<(u32, tcp::PollState)> {
        self.interests
            .iter()
            .filter_map(|(&handle, &interest)| {
                let status = table.get(handle)?.poll_state() & interest;
                (!status.is_empty()).then_some((handle, status))
            })
            .collect()
    }

    /// Recompute the cached ready count against `table`. Must be called before `poll_state` is
    /// read if any watched descriptor may have changed state since the last call.
    pub fn refresh(&mut self, table: &DescriptorTable) {
        self.ready_count = self.ready_set(table).len();
    }

    pub fn poll_state(&self) -> tcp::PollState {
        if self.ready_count > 0 {
            tcp::PollState::READABLE
        } else {
            tcp::PollState::empty()
        }
    }
}

impl Default for Epoll {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::descriptor::timer::Timer;
    use crate::host::descriptor::Descriptor;

    fn timer_table_with_one_fired_timer() -> (DescriptorTable, u32) {
        let mut table = DescriptorTable::new();
        let mut timer = Timer::new();
        timer.arm(sim_time::EmulatedTime::MIN, sim_time::SimulationTime::ZERO);
        timer.on_timer(sim_time::EmulatedTime::MIN);
        let handle = table.add(Descriptor::Timer(timer), 0);
        (table, handle)
    }

    #[test]
    fn ready_set_is_empty_until_the_watched_descriptor_is_ready() {
        let (table, handle) = timer_table_with_one_fired_timer();
        let mut epoll = Epoll::new();
        epoll.add(handle, tcp::PollState::READABLE);
        assert_eq!(epoll.ready_set(&table).len(), 1);
    }

    #[test]
    fn interest_mask_filters_out_uninteresting_bits() {
        let (table, handle) = timer_table_with_one_fired_timer();
        let mut epoll = Epoll::new();
        epoll.add(handle, tcp::PollState::WRITABLE);
        assert!(epoll.ready_set(&table).is_empty());
    }

    #[test]
    fn refresh_then_poll_state_reflects_readiness() {
        let (table, handle) = timer_table_with_one_fired_timer();
        let mut epoll = Epoll::new();
        assert_eq!(epoll.poll_state(), tcp::PollState::empty());
        epoll.add(handle, tcp::PollState::READABLE);
        epoll.refresh(&table);
        assert!(epoll.poll_state().contains(tcp::PollState::READABLE));
    }

    #[test]
    fn remove_drops_a_handle_from_future_ready_sets() {
        let (table, handle) = timer_table_with_one_fired_timer();
        let mut epoll = Epoll::new();
        epoll.add(handle, tcp::PollState::READABLE);
        assert!(epoll.remove(handle));
        assert!(epoll.ready_set(&table).is_empty());
        assert!(!epoll.remove(handle));
    }
}
