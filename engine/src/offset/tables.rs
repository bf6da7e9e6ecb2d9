use prefetch_core::{AssocTable, BitPattern, Entry, hash_index};

// CONSTANTS
// ================================================================================================

/// Region-number bits participating in table keys.
const REGION_KEY_WIDTH: u32 = 36;

fn region_key(region: u64, index_bits: u32) -> u64 {
    hash_index(region & ((1u64 << REGION_KEY_WIDTH) - 1), index_bits)
}

// FILTER TABLE
// ================================================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct TriggerData {
    pub pc: u64,
    pub offset: usize,
}

/// Single-level filter table: the trigger access of each recently-touched region.
#[derive(Debug)]
pub(super) struct FilterTable {
    table: AssocTable<TriggerData>,
}

impl FilterTable {
    pub fn new(size: usize, ways: usize) -> Self {
        Self { table: AssocTable::new(size, ways) }
    }

    pub fn find(&mut self, region: u64) -> Option<&Entry<TriggerData>> {
        let key = self.key(region);
        if self.table.find(key).is_some() {
            self.table.touch(key);
        }
        self.table.find(key)
    }

    pub fn insert(&mut self, region: u64, pc: u64, offset: usize) {
        let key = self.key(region);
        self.table.insert(key, TriggerData { pc, offset });
    }

    pub fn erase(&mut self, region: u64) -> Option<Entry<TriggerData>> {
        let key = self.key(region);
        self.table.erase(key)
    }

    pub fn region_of(&self, entry: &Entry<TriggerData>) -> u64 {
        hash_index(entry.key, self.table.index_bits())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    fn key(&self, region: u64) -> u64 {
        region_key(region, self.table.index_bits())
    }
}

// ACCUMULATION TABLE
// ================================================================================================

#[derive(Debug, Clone, PartialEq)]
pub(super) struct FootprintData {
    pub pc: u64,
    pub offset: usize,
    pub observed: BitPattern,
}

/// Single-level accumulation table: the footprint of each active region.
#[derive(Debug)]
pub(super) struct AccumulationTable {
    table: AssocTable<FootprintData>,
    pattern_len: usize,
}

impl AccumulationTable {
    pub fn new(size: usize, ways: usize, pattern_len: usize) -> Self {
        Self { table: AssocTable::new(size, ways), pattern_len }
    }

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

    pub fn insert_trigger(
        &mut self,
        region: u64,
        pc: u64,
        offset: usize,
    ) -> Option<Entry<FootprintData>> {
        let mut observed = BitPattern::zeroed(self.pattern_len);
        observed.set(offset, true);
        let key = self.key(region);
        self.table.insert(key, FootprintData { pc, offset, observed })
    }

    pub fn erase(&mut self, region: u64) -> Option<Entry<FootprintData>> {
        let key = self.key(region);
        self.table.erase(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    fn key(&self, region: u64) -> u64 {
        region_key(region, self.table.index_bits())
    }
}
