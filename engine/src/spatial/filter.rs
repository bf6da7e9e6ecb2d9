use prefetch_core::{AssocTable, BitPattern, Entry, hash_index};

use super::region_key;

// FILTER TABLE
// ================================================================================================

/// Payload of a filter-table entry: the trigger access and the prefetch mask that was predicted
/// for it at trigger time.
#[derive(Debug, Clone, PartialEq)]
pub(super) struct FilterData {
    pub pc: u64,
    pub offset: usize,
    pub predicted: BitPattern,
}

/// One entry per recently-triggered region that has seen only a single offset so far.
///
/// A second touch at a different offset promotes the region into the accumulation table; a second
/// touch at the same offset only refreshes recency.
#[derive(Debug)]
pub(super) struct FilterTable {
    table: AssocTable<FilterData>,
    pattern_len: usize,
}

impl FilterTable {
    pub fn new(size: usize, ways: usize, pattern_len: usize) -> Self {
        Self { table: AssocTable::new(size, ways), pattern_len }
    }

    pub fn pattern_len(&self) -> usize {
        self.pattern_len
    }

    /// Looks up the region and refreshes its recency on a hit.
    pub fn find(&mut self, region: u64) -> Option<&Entry<FilterData>> {
        let key = self.key(region);
        if self.table.find(key).is_some() {
            self.table.touch(key);
        }
        self.table.find(key)
    }

    pub fn insert(&mut self, region: u64, pc: u64, offset: usize, predicted: BitPattern) {
        let key = self.key(region);
        self.table.insert(key, FilterData { pc, offset, predicted });
    }

    pub fn erase(&mut self, region: u64) -> Option<Entry<FilterData>> {
        let key = self.key(region);
        self.table.erase(key)
    }

    /// Recovers the (truncated) region number an entry was inserted under.
    pub fn region_of(&self, entry: &Entry<FilterData>) -> u64 {
        hash_index(entry.key, self.table.index_bits())
    }

    fn key(&self, region: u64) -> u64 {
        region_key(region, self.pattern_len, self.table.index_bits())
    }

    #[cfg(test)]
    pub fn get(&self, region: u64) -> Option<&Entry<FilterData>> {
        self.table.find(self.key(region))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.len()
    }
}
