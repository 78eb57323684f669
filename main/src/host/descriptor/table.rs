//! Maps file handles (smallest-available-integer, like Linux's `fd` allocator) to descriptors.
//! Owned by a [`crate::host::process::Process`].

use std::collections::{BTreeSet, HashMap};

use crate::host::descriptor::Descriptor;

/// The lowest handle [`DescriptorTable::add`] is ever asked to allocate at. Mirrors a real
/// process's fd 0/1/2 being reserved for stdio: every descriptor this workspace hands a guest
/// program lives at an index `>= MIN_DESCRIPTOR`, so a handle can never collide with one of those
/// three even though nothing here actually models stdin/stdout/stderr themselves.
pub const MIN_DESCRIPTOR: u32 = 3;

pub struct DescriptorTable {
    descriptors: HashMap<u32, Descriptor>,
    /// Indices below `next_index` known to be available.
    available_indices: BTreeSet<u32>,
    /// Lowest index not in `available_indices` that *might* be available; still needs
    /// `descriptors` checked, since [`Self::set`] can place something past it directly.
    next_index: u32,
}

impl DescriptorTable {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
            available_indices: BTreeSet::new(),
            next_index: 0,
        }
    }

    /// Add `descriptor` at the smallest unused index that is `>= min_index`, and return it.
    pub fn add(&mut self, descriptor: Descriptor, min_index: u32) -> u32 {
        let idx = if let Some(&idx) = self.available_indices.range(min_index..).next() {
            self.available_indices.remove(&idx);
            idx
        } else {
            let mut idx = self.next_index.max(min_index);
            let should_update_next_index = idx == self.next_index;
            while self.descriptors.contains_key(&idx) {
                idx += 1;
            }
            if should_update_next_index {
                self.next_index = idx + 1;
            }
            idx
        };

        let prev = self.descriptors.insert(idx, descriptor);
        debug_assert!(prev.is_none());
        idx
    }

    /// Free any entries in `available_indices` that are now contiguous with `next_index`.
    fn trim_tail(&mut self) {
        while let Some(&last) = self.available_indices.iter().next_back() {
            if last + 1 == self.next_index {
                self.next_index -= 1;
                self.available_indices.remove(&last);
            } else {
                break;
            }
        }
    }

    pub fn remove(&mut self, idx: u32) -> Option<Descriptor> {
        let removed = self.descriptors.remove(&idx);
        if removed.is_some() {
            self.available_indices.insert(idx);
            self.trim_tail();
        }
        removed
    }

    pub fn get(&self, idx: u32) -> Option<&Descriptor> {
        self.descriptors.get(&idx)
    }

    pub fn get_mut(&mut self, idx: u32) -> Option<&mut Descriptor> {
        self.descriptors.get_mut(&idx)
    }

    /// Install `descriptor` at exactly `index` (used by `dup2`-style syscalls), returning
    /// whatever was there before.
    pub fn set(&mut self, index: u32, descriptor: Descriptor) -> Option<Descriptor> {
        self.available_indices.remove(&index);
        self.descriptors.insert(index, descriptor)
    }

    pub fn remove_all(&mut self) -> impl Iterator<Item = Descriptor> {
        std::mem::take(&mut self.descriptors).into_values()
    }

    /// Every live descriptor and the fd it's installed at, for callers that need to scan the
    /// whole table (e.g. draining every socket's outgoing queue once per round).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut Descriptor)> {
        self.descriptors.iter_mut().map(|(&idx, d)| (idx, d))
    }

    /// Read-only counterpart of [`Self::iter_mut`], for scans that don't need to mutate (e.g.
    /// checking whether a candidate ephemeral port is already bound).
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Descriptor)> {
        self.descriptors.iter().map(|(&idx, d)| (idx, d))
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}
