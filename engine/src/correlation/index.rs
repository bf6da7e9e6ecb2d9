use alloc::{collections::BTreeMap, vec::Vec};

use itertools::Itertools;

// SUPER ENTRY
// ================================================================================================

#[derive(Debug, Clone, Copy)]
struct SuccessorSlot {
    second: u64,
    pointer: u64,
    stamp: u64,
}

/// Successors observed after one first address: a small LRU set of
/// (second address → history pointer) pairs plus a cache of the most recent one.
#[derive(Debug, Clone)]
pub(super) struct SuperEntry {
    slots: Vec<Option<SuccessorSlot>>,
    clock: u64,
    mru_second: u64,
    mru_pointer: u64,
    /// Recency stamp managed by the owning [`IndexTable`].
    last_use: u64,
}

impl SuperEntry {
    pub fn new(second: u64, pointer: u64, size: usize) -> Self {
        let mut entry = Self {
            slots: (0..size).map(|_| None).collect(),
            clock: 0,
            mru_second: second,
            mru_pointer: pointer,
            last_use: 0,
        };
        entry.insert(second, pointer);
        entry
    }

    /// Records (second, pointer), replacing an existing pair for the same second address or the
    /// least-recent slot.
    pub fn insert(&mut self, second: u64, pointer: u64) {
        self.clock += 1;
        let stamp = self.clock;
        let way = self
            .slots
            .iter()
            .position(|slot| slot.is_some_and(|s| s.second == second))
            .or_else(|| self.slots.iter().position(Option::is_none))
            .unwrap_or_else(|| self.victim_way());
        self.slots[way] = Some(SuccessorSlot { second, pointer, stamp });
        self.mru_second = second;
        self.mru_pointer = pointer;
    }

    /// Looks up a second address, refreshing its recency on a hit.
    pub fn find(&mut self, second: u64) -> Option<u64> {
        self.clock += 1;
        let stamp = self.clock;
        self.slots
            .iter_mut()
            .flatten()
            .find(|slot| slot.second == second)
            .map(|slot| {
                slot.stamp = stamp;
                slot.pointer
            })
    }

    /// Most recently recorded successor.
    pub fn mru_second(&self) -> u64 {
        self.mru_second
    }

    #[cfg(test)]
    pub fn mru_pointer(&self) -> u64 {
        self.mru_pointer
    }

    fn victim_way(&self) -> usize {
        self.slots
            .iter()
            .position_min_by_key(|slot| slot.map_or(u64::MAX, |s| s.stamp))
            .unwrap_or(0)
    }
}

// INDEX TABLE
// ================================================================================================

/// First-address index: one [`SuperEntry`] per recently-seen address, bounded by evicting the
/// least-recently-used entry.
#[derive(Debug)]
pub(super) struct IndexTable {
    entries: BTreeMap<u64, SuperEntry>,
    capacity: usize,
    clock: u64,
}

impl IndexTable {
    pub fn new(capacity: usize) -> Self {
        Self { entries: BTreeMap::new(), capacity, clock: 0 }
    }

    /// Looks up a first address, refreshing its recency on a hit.
    pub fn get_mut(&mut self, first: u64) -> Option<&mut SuperEntry> {
        self.clock += 1;
        let stamp = self.clock;
        self.entries.get_mut(&first).map(|entry| {
            entry.last_use = stamp;
            entry
        })
    }

    pub fn insert(&mut self, first: u64, mut entry: SuperEntry) {
        self.clock += 1;
        entry.last_use = self.clock;
        if self.entries.len() >= self.capacity
            && !self.entries.contains_key(&first)
            && let Some(&lru) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_use)
                .map(|(first, _)| first)
        {
            self.entries.remove(&lru);
        }
        self.entries.insert(first, entry);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
