use prefetch_core::{AssocTable, BitPattern, Entry, hash_index};

use super::region_key;

// ACCUMULATION TABLE
// ================================================================================================

/// Payload of an accumulation-table entry: the trigger access, the footprint observed so far, and
/// the mask that was predicted for the region when it was triggered.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct AccumData {
    pub pc: u64,
    pub offset: usize,
    pub observed: BitPattern,
    pub predicted: BitPattern,
}

/// Active regions collecting their footprint while the region stays hot.
///
/// Entries leave either by LRU victimisation or when any block of the region is evicted from the
/// cache; both paths retire the observed footprint into the pattern history table.
#[derive(Debug)]
pub(super) struct AccumulationTable {
    table: AssocTable<AccumData>,
    pattern_len: usize,
}

impl AccumulationTable {
    pub fn new(size: usize, ways: usize, pattern_len: usize) -> Self {
        Self { table: AssocTable::new(size, ways), pattern_len }
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern_len
    }

    /// Records a touch at `offset` if the region is being accumulated; returns false otherwise.
    pub fn observe(&mut self, region: u64, offset: usize) -> bool {
        let key = self.key(region);
        match self.table.find_mut(key) {
            Some(entry) => {
                entry.data.observed.set(offset, true);
                self.table.touch(key);
                true
            },
            None => false,
        }
    }

    /// Starts accumulating a freshly-promoted region; the observed pattern begins with only the
    /// trigger offset set. Returns the victim retired to make room, if any.
    pub fn insert_trigger(
        &mut self,
        region: u64,
        pc: u64,
        offset: usize,
        predicted: BitPattern,
    ) -> Option<Entry<AccumData>> {
        let mut observed = BitPattern::zeroed(self.pattern_len);
        observed.set(offset, true);
        let key = self.key(region);
        self.table.insert(key, AccumData { pc, offset, observed, predicted })
    }

    /// Inserts a level-up product: an already-merged observed pattern under the parent trigger.
    pub fn insert_merged(
        &mut self,
        region: u64,
        pc: u64,
        offset: usize,
        observed: BitPattern,
        predicted: BitPattern,
    ) -> Option<Entry<AccumData>> {
        debug_assert_eq!(observed.len(), self.pattern_len);
        let key = self.key(region);
        self.table.insert(key, AccumData { pc, offset, observed, predicted })
    }

    pub fn erase(&mut self, region: u64) -> Option<Entry<AccumData>> {
        let key = self.key(region);
        self.table.erase(key)
    }

    /// Recovers the (truncated) region number an entry was inserted under.
    pub fn region_of(&self, entry: &Entry<AccumData>) -> u64 {
        hash_index(entry.key, self.table.index_bits())
    }

    fn key(&self, region: u64) -> u64 {
        region_key(region, self.pattern_len, self.table.index_bits())
    }

    #[cfg(test)]
    pub fn get(&self, region: u64) -> Option<&Entry<AccumData>> {
        self.table.find(self.key(region))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.len()
    }
}
