use alloc::{string::String, vec::Vec};

use itertools::Itertools;

// INDEX HASH
// ================================================================================================

/// XOR-folds every `index_bits`-wide block of `key` into the lowest block.
///
/// Only the low `index_bits` bits change, so applying the function twice returns the original
/// key; the tables below rely on this involution to recover the (truncated) key they were built
/// from without storing it twice.
pub fn hash_index(key: u64, index_bits: u32) -> u64 {
    if index_bits == 0 {
        return key;
    }
    let mask = (1u64 << index_bits) - 1;
    let mut folded = key;
    let mut tag = key >> index_bits;
    while tag > 0 {
        folded ^= tag & mask;
        tag >>= index_bits;
    }
    (key & !mask) | (folded & mask)
}

// ASSOCIATIVE TABLE
// ================================================================================================

/// A stored entry: the full key it was inserted under plus the caller's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<T> {
    pub key: u64,
    pub data: T,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    entry: Entry<T>,
    stamp: u64,
}

/// A set-associative store with true-LRU replacement.
///
/// Keys are pre-hashed by the caller (see [`hash_index`]); the table splits a key into
/// `index = key mod num_sets` and `tag = key / num_sets`. Within a set all valid tags are
/// distinct, and LRU stamps are drawn from a per-table monotonically increasing counter, so they
/// are totally ordered. Victim selection picks the minimum stamp, breaking ties towards the
/// lowest way.
#[derive(Debug, Clone)]
pub struct AssocTable<T> {
    sets: Vec<Vec<Option<Slot<T>>>>,
    num_sets: u64,
    num_ways: usize,
    index_bits: u32,
    clock: u64,
}

impl<T> AssocTable<T> {
    /// Creates a table of `size` total entries organised as `size / num_ways` sets.
    ///
    /// `size` and `num_ways` are validated by the configuration layer; this constructor only
    /// checks them in debug builds.
    pub fn new(size: usize, num_ways: usize) -> Self {
        debug_assert!(num_ways > 0 && size >= num_ways && size % num_ways == 0);
        let num_sets = (size / num_ways) as u64;
        debug_assert!(num_sets.is_power_of_two());
        Self {
            sets: (0..num_sets).map(|_| (0..num_ways).map(|_| None).collect()).collect(),
            num_sets,
            num_ways,
            index_bits: num_sets.trailing_zeros(),
            clock: 0,
        }
    }

    /// Number of index bits, i.e. log2 of the set count.
    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }

    pub fn num_sets(&self) -> u64 {
        self.num_sets
    }

    pub fn num_ways(&self) -> usize {
        self.num_ways
    }

    /// Splits a key into its tag portion (everything above the index bits).
    #[inline(always)]
    pub fn tag_of(&self, key: u64) -> u64 {
        key / self.num_sets
    }

    #[inline(always)]
    fn set_index(&self, key: u64) -> usize {
        (key % self.num_sets) as usize
    }

    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Looks up `key`; does not refresh recency.
    pub fn find(&self, key: u64) -> Option<&Entry<T>> {
        let set = &self.sets[self.set_index(key)];
        set.iter()
            .flatten()
            .find(|slot| slot.entry.key == key)
            .map(|slot| &slot.entry)
    }

    /// Looks up `key` for in-place mutation; does not refresh recency.
    pub fn find_mut(&mut self, key: u64) -> Option<&mut Entry<T>> {
        let index = self.set_index(key);
        self.sets[index]
            .iter_mut()
            .flatten()
            .find(|slot| slot.entry.key == key)
            .map(|slot| &mut slot.entry)
    }

    /// Marks `key` as the most recently used entry of its set.
    pub fn touch(&mut self, key: u64) {
        let stamp = self.next_stamp();
        let index = self.set_index(key);
        if let Some(slot) =
            self.sets[index].iter_mut().flatten().find(|slot| slot.entry.key == key)
        {
            slot.stamp = stamp;
        }
    }

    /// Inserts `data` under `key` as the MRU entry of its set and returns the victim evicted to
    /// make room, if any.
    ///
    /// Re-inserting an existing key replaces its payload in place (keeping tags distinct within
    /// the set) and evicts nothing.
    pub fn insert(&mut self, key: u64, data: T) -> Option<Entry<T>> {
        let stamp = self.next_stamp();
        let index = self.set_index(key);
        let set = &mut self.sets[index];

        if let Some(slot) = set.iter_mut().flatten().find(|slot| slot.entry.key == key) {
            slot.entry.data = data;
            slot.stamp = stamp;
            return None;
        }

        let way = match set.iter().position(Option::is_none) {
            Some(way) => way,
            None => Self::victim_way(set),
        };
        let evicted = set[way].take().map(|slot| slot.entry);
        set[way] = Some(Slot { entry: Entry { key, data }, stamp });
        evicted
    }

    /// Removes and returns the entry stored under `key`.
    pub fn erase(&mut self, key: u64) -> Option<Entry<T>> {
        let index = self.set_index(key);
        let set = &mut self.sets[index];
        let way = set
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.entry.key == key))?;
        set[way].take().map(|slot| slot.entry)
    }

    /// Iterates over the entries of the set `key` maps to, in way order.
    ///
    /// This is the raw walk the pattern history table needs for its masked-tag matching; plain
    /// lookups should use [`AssocTable::find`].
    pub fn set_entries(&self, key: u64) -> impl Iterator<Item = &Entry<T>> {
        self.sets[self.set_index(key)].iter().flatten().map(|slot| &slot.entry)
    }

    /// Iterates over every valid entry in the table.
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.sets.iter().flat_map(|set| set.iter().flatten().map(|slot| &slot.entry))
    }

    /// Total number of valid entries.
    pub fn len(&self) -> usize {
        self.sets.iter().map(|set| set.iter().flatten().count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Renders the table one row per valid entry (`[set, way, stamp, <payload>]`), for debug
    /// dumps.
    pub fn debug_rows(&self, render: impl Fn(&Entry<T>) -> String) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for (set_idx, set) in self.sets.iter().enumerate() {
            for (way, slot) in set.iter().enumerate() {
                if let Some(slot) = slot {
                    rows.push(vec![
                        format!("{set_idx}"),
                        format!("{way}"),
                        format!("{}", slot.stamp),
                        render(&slot.entry),
                    ]);
                }
            }
        }
        rows
    }

    fn victim_way(set: &[Option<Slot<T>>]) -> usize {
        // stamps are distinct, so the minimum is unique; an empty way never reaches here
        set.iter()
            .position_min_by_key(|slot| slot.as_ref().map_or(u64::MAX, |s| s.stamp))
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn stamps_of_set(&self, key: u64) -> Vec<u64> {
        self.sets[self.set_index(key)].iter().flatten().map(|slot| slot.stamp).collect()
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use alloc::collections::BTreeSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn hash_index_is_an_involution() {
        for key in [0u64, 1, 0xdead_beef, u64::MAX, 1 << 42] {
            for bits in [0u32, 1, 4, 9] {
                assert_eq!(hash_index(hash_index(key, bits), bits), key);
            }
        }
    }

    #[test]
    fn hash_index_only_touches_low_bits() {
        let key = 0xabcd_ef01_2345_6789u64;
        let hashed = hash_index(key, 8);
        assert_eq!(hashed >> 8, key >> 8);
    }

    #[test]
    fn find_after_insert() {
        let mut table = AssocTable::new(16, 4);
        assert!(table.insert(7, "a").is_none());
        assert_eq!(table.find(7).map(|e| e.data), Some("a"));
        assert!(table.find(8).is_none());
    }

    #[test]
    fn reinsert_replaces_in_place() {
        let mut table = AssocTable::new(16, 4);
        table.insert(7, "a");
        assert!(table.insert(7, "b").is_none());
        assert_eq!(table.find(7).map(|e| e.data), Some("b"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn lru_victim_is_least_recent() {
        // one set of 2 ways: keys 0 and 4 collide (4 sets)
        let mut table = AssocTable::new(8, 2);
        table.insert(0, 0u32);
        table.insert(4, 4u32);
        table.touch(0); // 4 is now LRU
        let victim = table.insert(8, 8u32).expect("set was full");
        assert_eq!(victim.key, 4);
        assert!(table.find(0).is_some());
        assert!(table.find(8).is_some());
    }

    #[test]
    fn victim_tie_breaks_towards_lowest_way() {
        let mut table = AssocTable::<u32>::new(2, 2);
        table.insert(0, 1);
        table.insert(1, 2);
        // no touches in between: way 0 has the older stamp
        let victim = table.insert(2, 3).unwrap();
        assert_eq!(victim.key, 0);
    }

    #[test]
    fn erase_returns_the_payload() {
        let mut table = AssocTable::new(16, 4);
        table.insert(3, "x");
        let gone = table.erase(3).unwrap();
        assert_eq!(gone.data, "x");
        assert!(table.find(3).is_none());
        assert!(table.erase(3).is_none());
    }

    proptest! {
        #[test]
        fn set_invariants_hold_under_arbitrary_ops(ops in prop::collection::vec((any::<u8>(), 0u64..64), 1..200)) {
            let mut table = AssocTable::new(16, 4);
            for (op, key) in ops {
                match op % 3 {
                    0 => { table.insert(key, key); },
                    1 => { table.erase(key); },
                    _ => table.touch(key),
                }
                // all valid keys (hence tags) distinct within each set
                for set in 0..table.num_sets() {
                    let keys: Vec<u64> =
                        table.set_entries(set).map(|e| e.key).collect();
                    let unique: BTreeSet<u64> = keys.iter().copied().collect();
                    prop_assert_eq!(keys.len(), unique.len());
                    // stamps totally ordered (strictly distinct) within the set
                    let stamps = table.stamps_of_set(set);
                    let unique_stamps: BTreeSet<u64> = stamps.iter().copied().collect();
                    prop_assert_eq!(stamps.len(), unique_stamps.len());
                }
            }
        }

        #[test]
        fn hash_round_trips(key in any::<u64>(), bits in 0u32..16) {
            prop_assert_eq!(hash_index(hash_index(key, bits), bits), key);
        }
    }
}
