//! Discovery status tracking for the fixed bootstrap address set.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};

/// Discovery state of one bootstrap address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapStatus {
    /// Configured but never heard from
    Unknown,
    /// A heartbeat from this address has been merged
    Discovered,
    /// The last send towards this address failed
    Unreachable,
}

/// Exact status map over the bootstrap set, fronted by a 64-bucket summary
/// bitmask so "address was never registered" queries skip the map lookup.
///
/// The mask can only produce false positives: a collision between registered
/// addresses costs one extra map lookup, never a wrong answer, and a
/// registered address always has its bit set.
pub struct BootstrapTracker {
    status_map: HashMap<String, BootstrapStatus>,
    fast_filter: u64,
}

fn filter_bit(address: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    address.hash(&mut hasher);
    1u64 << (hasher.finish() & 63)
}

impl BootstrapTracker {
    /// Register the full bootstrap set; membership never changes afterwards.
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        let mut status_map = HashMap::new();
        let mut fast_filter = 0u64;

        for address in addresses {
            fast_filter |= filter_bit(&address);
            status_map.insert(address, BootstrapStatus::Unknown);
        }

        Self {
            status_map,
            fast_filter,
        }
    }

    /// Status of an address, or `None` when it was never registered.
    pub fn status(&self, address: &str) -> Option<BootstrapStatus> {
        if self.fast_filter & filter_bit(address) == 0 {
            return None;
        }

        self.status_map.get(address).copied()
    }

    /// Update a registered address; a no-op for everything else.
    pub fn update(&mut self, address: &str, status: BootstrapStatus) {
        if self.fast_filter & filter_bit(address) == 0 {
            return;
        }

        if let Some(entry) = self.status_map.get_mut(address) {
            *entry = status;
        }
    }

    /// All registered addresses currently in the given status.
    pub fn all_in_status(&self, status: BootstrapStatus) -> HashSet<String> {
        self.status_map
            .iter()
            .filter(|(_, current)| **current == status)
            .map(|(address, _)| address.clone())
            .collect()
    }

    /// Addresses the discovery sender must still reach: everything not yet
    /// marked `Discovered`.
    pub fn undiscovered(&self) -> HashSet<String> {
        self.status_map
            .iter()
            .filter(|(_, current)| **current != BootstrapStatus::Discovered)
            .map(|(address, _)| address.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.status_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.status_map.is_empty()
    }
}
