use alloc::vec::Vec;

use prefetch_core::{AssocTable, BitPattern, hash_index};

// PATTERN HISTORY TABLE
// ================================================================================================

#[derive(Debug, Clone, PartialEq)]
struct HistoryData {
    /// Canonical (trigger-relative) footprint: offset 0 corresponds to the trigger offset.
    pattern: BitPattern,
}

/// Result of a pattern-history probe.
///
/// A strict match means the full (PC, address) key matched a stored entry and pre-empts
/// everything else in the set; loose matches share only the (PC, offset) part of the key and are
/// returned together so the caller can vote across them. All patterns are already rotated back to
/// the probing offset.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum HistoryMatch {
    Strict(BitPattern),
    Loose(Vec<BitPattern>),
    Miss,
}

/// Associative memory of retired region footprints, keyed by (PC, address) with two lookup
/// widths.
///
/// The set index is computed from PC and the within-region offset only, so every entry sharing a
/// (PC, offset) pair lands in the same set and can be found by a loose probe; the address bits
/// above the offset go into the tag and separate strict from loose matches.
#[derive(Debug)]
pub(super) struct PatternHistoryTable {
    table: AssocTable<HistoryData>,
    pattern_len: usize,
    pc_width: u32,
    min_addr_width: u32,
    max_addr_width: u32,
}

impl PatternHistoryTable {
    pub fn new(
        size: usize,
        ways: usize,
        pattern_len: usize,
        pc_width: u32,
        min_addr_width: u32,
        max_addr_width: u32,
    ) -> Self {
        Self {
            table: AssocTable::new(size, ways),
            pattern_len,
            pc_width,
            min_addr_width,
            max_addr_width,
        }
    }

    /// Stores `pattern` under (pc, address), rotated into canonical trigger-relative form.
    pub fn insert(&mut self, pc: u64, address: u64, pattern: BitPattern) {
        debug_assert_eq!(pattern.len(), self.pattern_len);
        let offset = (address % self.pattern_len as u64) as usize;
        let canonical = pattern.rotate_left(offset);
        let key = self.build_key(pc, address);
        self.table.insert(key, HistoryData { pattern: canonical });
    }

    /// Removes the entry stored under (pc, address) and returns its canonical pattern.
    pub fn erase(&mut self, pc: u64, address: u64) -> Option<BitPattern> {
        let key = self.build_key(pc, address);
        self.table.erase(key).map(|entry| entry.data.pattern)
    }

    /// Probes the set for (pc, address); see [`HistoryMatch`] for the outcome semantics.
    pub fn lookup(&mut self, pc: u64, address: u64) -> HistoryMatch {
        let key = self.build_key(pc, address);
        let tag = self.table.tag_of(key);
        let index_bits = self.table.index_bits();
        let min_mask = low_mask(self.pc_width + self.min_addr_width - index_bits);
        let max_mask = low_mask(self.pc_width + self.max_addr_width - index_bits);
        let offset = (address % self.pattern_len as u64) as usize;

        let mut strict: Option<(u64, BitPattern)> = None;
        let mut loose: Vec<BitPattern> = Vec::new();
        for entry in self.table.set_entries(key) {
            let entry_tag = self.table.tag_of(entry.key);
            if entry_tag & max_mask == tag & max_mask {
                strict = Some((entry.key, entry.data.pattern.clone()));
                break;
            }
            if entry_tag & min_mask == tag & min_mask {
                loose.push(entry.data.pattern.clone());
            }
        }

        if let Some((matched_key, pattern)) = strict {
            self.table.touch(matched_key);
            return HistoryMatch::Strict(pattern.rotate_right(offset));
        }
        if loose.is_empty() {
            HistoryMatch::Miss
        } else {
            HistoryMatch::Loose(loose.into_iter().map(|p| p.rotate_right(offset)).collect())
        }
    }

    #[cfg(test)]
    pub fn canonical(&self, pc: u64, address: u64) -> Option<BitPattern> {
        self.table.find(self.build_key(pc, address)).map(|e| e.data.pattern.clone())
    }

    /// Key layout: `[address bits above the offset | hash(pc ++ offset)]`.
    ///
    /// Only `pc_width` PC bits and `max_addr_width` address bits participate; the hashed low part
    /// spans `pc_width + min_addr_width` bits, of which the low `index_bits` select the set.
    fn build_key(&self, pc: u64, address: u64) -> u64 {
        let pc = pc & low_mask(self.pc_width);
        let address = address & low_mask(self.max_addr_width);
        let offset = address & low_mask(self.min_addr_width);
        let base = address >> self.min_addr_width;
        let index_key =
            hash_index((pc << self.min_addr_width) | offset, self.table.index_bits());
        (base << (self.pc_width + self.min_addr_width)) | index_key
    }
}

fn low_mask(bits: u32) -> u64 {
    (1u64 << bits) - 1
}

// TESTS
// ================================================================================================
