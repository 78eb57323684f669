//! A stable numeric identifier for a simulated [`Host`](https://docs.rs/shadow-rs).

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(u32);

impl HostId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host-{}", self.0)
    }
}

impl From<u32> for HostId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<HostId> for u32 {
    fn from(id: HostId) -> Self {
        id.0
    }
}
