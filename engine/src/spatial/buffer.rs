use alloc::vec::Vec;

use prefetch_core::{AssocTable, FillLevel, FillPattern, block_base, hash_index};

use crate::host::{CacheHost, has_queue_budget};

// PATTERN BUFFER
// ================================================================================================

#[derive(Debug, Clone, PartialEq)]
struct BufferData {
    /// Prefetch fill level for each block of the (top-level) region.
    fills: FillPattern,
}

/// Pending prefetch patterns, one entry per top-level region, drained incrementally as accesses
/// stream through the region.
///
/// Issue order expands outwards from the most recent access, preferring the positive direction at
/// equal distance, so nearby blocks are in flight first. Offsets are cleared as they are issued;
/// an entry whose pattern drains completely is dropped.
#[derive(Debug)]
pub(crate) struct PatternBuffer {
    table: AssocTable<BufferData>,
    pattern_len: usize,
    degree: i32,
    log2_block_size: u32,
}

impl PatternBuffer {
    pub fn new(
        size: usize,
        ways: usize,
        pattern_len: usize,
        degree: i32,
        log2_block_size: u32,
    ) -> Self {
        Self { table: AssocTable::new(size, ways), pattern_len, degree, log2_block_size }
    }

    /// Merges `fills` into the region's pending pattern; non-`None` incoming levels win.
    pub fn insert(&mut self, region: u64, fills: FillPattern) {
        debug_assert_eq!(fills.len(), self.pattern_len);
        let key = self.key(region);
        match self.table.find_mut(key) {
            Some(entry) => entry.data.fills.absorb(&fills),
            None => {
                self.table.insert(key, BufferData { fills });
            },
        }
        self.table.touch(key);
    }

    /// Issues pending prefetches around `block`, bounded by the configured degree and by the
    /// downstream queue budget. Returns the number of lines issued; issued targets are also
    /// appended to `proposed`.
    pub fn issue(
        &mut self,
        block: u64,
        cache: &mut dyn CacheHost,
        proposed: &mut Vec<u64>,
    ) -> usize {
        let len = self.pattern_len as u64;
        let region = block / len;
        let region_offset = (block % len) as i64;
        let key = self.key(region);

        let Some(entry) = self.table.find_mut(key) else {
            return 0;
        };
        // the accessed block itself is fetched by the demand miss, if at all
        entry.data.fills.set(region_offset as usize, FillLevel::None);
        self.table.touch(key);

        let base_addr = block_base(block, self.log2_block_size);
        let mut issued = 0;
        for distance in 1..self.pattern_len as i64 {
            for sign in [1i64, -1] {
                let pf_offset = region_offset + sign * distance;
                if pf_offset < 0 || pf_offset >= self.pattern_len as i64 {
                    continue;
                }
                // borrow re-established per iteration so the issue call can take the cache
                let fill = self
                    .table
                    .find(key)
                    .map(|e| e.data.fills.get(pf_offset as usize))
                    .unwrap_or_default();
                if !fill.is_fetch() {
                    continue;
                }
                let within_degree = self.degree <= 0 || issued < self.degree;
                if !(within_degree && has_queue_budget(cache)) {
                    // budget exhausted; whatever remains stays pending
                    return issued as usize;
                }
                let target =
                    block_base(region * len + pf_offset as u64, self.log2_block_size);
                cache.prefetch_line(0, base_addr, target, fill, 0);
                proposed.push(target);
                issued += 1;
                if let Some(entry) = self.table.find_mut(key) {
                    entry.data.fills.set(pf_offset as usize, FillLevel::None);
                }
            }
        }
        // every offset of the region has been considered; the entry is spent
        self.table.erase(key);
        issued as usize
    }

    #[cfg(test)]
    pub fn pending(&self, region: u64) -> Option<FillPattern> {
        self.table.find(self.key(region)).map(|e| e.data.fills.clone())
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn key(&self, region: u64) -> u64 {
        hash_index(region, self.table.index_bits())
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use prefetch_core::FillLevel;

    use super::*;
    use crate::host::StubCache;

    fn fill_pattern(len: usize, bits: &[usize]) -> FillPattern {
        let mut p = FillPattern::zeroed(len);
        for &b in bits {
            p.set(b, FillLevel::L2);
        }
        p
    }

    #[test]
    fn issues_outward_positive_first() {
        let mut pb = PatternBuffer::new(32, 16, 8, 0, 6);
        pb.insert(0, fill_pattern(8, &[1, 2, 4, 5]));

        let mut cache = StubCache::default();
        let mut proposed = Vec::new();
        // access block 3 of region 0
        let issued = pb.issue(3, &mut cache, &mut proposed);
        assert_eq!(issued, 4);
        // distance 1: +4, then 2; distance 2: +5, then 1
        assert_eq!(proposed, vec![4 << 6, 2 << 6, 5 << 6, 1 << 6]);
        // fully drained entries are dropped
        assert!(pb.is_empty());
    }

    #[test]
    fn degree_caps_one_call() {
        let mut pb = PatternBuffer::new(32, 16, 8, 2, 6);
        pb.insert(0, fill_pattern(8, &[1, 2, 4, 5]));

        let mut cache = StubCache::default();
        let mut proposed = Vec::new();
        assert_eq!(pb.issue(3, &mut cache, &mut proposed), 2);
        // the rest stays pending for the next access
        let pending = pb.pending(0).unwrap();
        assert_eq!(pending.get(1), FillLevel::L2);
        assert_eq!(pending.get(5), FillLevel::L2);
        assert_eq!(pending.get(4), FillLevel::None);
        assert_eq!(pending.get(2), FillLevel::None);
    }

    #[test]
    fn never_issues_without_queue_budget() {
        let mut pb = PatternBuffer::new(32, 16, 8, 0, 6);
        pb.insert(0, fill_pattern(8, &[1, 2]));

        let mut cache = StubCache::new(4, 8);
        cache.pq_occupancy = 4; // prefetch queue full
        let mut proposed = Vec::new();
        assert_eq!(pb.issue(0, &mut cache, &mut proposed), 0);
        assert!(cache.issued.is_empty());

        cache.pq_occupancy = 0;
        cache.mshr_occupancy = 7; // pq + mshr >= mshr_size - 1
        assert_eq!(pb.issue(0, &mut cache, &mut proposed), 0);
        assert!(cache.issued.is_empty());
    }

    #[test]
    fn accessed_offset_is_not_prefetched() {
        let mut pb = PatternBuffer::new(32, 16, 8, 0, 6);
        pb.insert(0, fill_pattern(8, &[3]));

        let mut cache = StubCache::default();
        let mut proposed = Vec::new();
        assert_eq!(pb.issue(3, &mut cache, &mut proposed), 0);
        assert!(proposed.is_empty());
    }

    #[test]
    fn merge_keeps_existing_levels() {
        let mut pb = PatternBuffer::new(32, 16, 8, 0, 6);
        let mut first = FillPattern::zeroed(8);
        first.set(1, FillLevel::Llc);
        pb.insert(0, first);
        let mut second = FillPattern::zeroed(8);
        second.set(1, FillLevel::L2);
        second.set(2, FillLevel::Llc);
        pb.insert(0, second);

        let pending = pb.pending(0).unwrap();
        assert_eq!(pending.get(1), FillLevel::L2);
        assert_eq!(pending.get(2), FillLevel::Llc);
    }
}
