use alloc::vec::Vec;

use prefetch_core::{
    BitPattern, ConfigError, Entry, FillLevel, FillPattern, OffsetConfig, block_number,
};

use crate::{AccessEvent, CacheHost, FillEvent, PrefetchEngine, spatial::buffer::PatternBuffer};

mod counters;
mod tables;


use counters::CounterTable;
use tables::{AccumulationTable, FilterTable, FootprintData};

// STATISTICS
// ================================================================================================

/// Counters describing the offset engine's training and prediction activity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OffsetStats {
    /// Footprints folded into the counter tables.
    pub retirements: u64,
    /// Trigger accesses for which both counter tables produced a grading.
    pub predictions: u64,
}

// OFFSET PREFETCHER
// ================================================================================================

/// Counter-table offset prefetcher.
///
/// A single-level filter/accumulation front end collects region footprints, but instead of an
/// associative pattern history the footprints are folded into two small counter tables: one
/// keyed by trigger offset at full resolution, one keyed by PC at half resolution. Prediction
/// combines the two gradings: an offset both tables vouch for fills closer to the core than one
/// only the offset table knows about.
#[derive(Debug)]
pub struct OffsetPrefetcher {
    cfg: OffsetConfig,
    ft: FilterTable,
    at: AccumulationTable,
    offset_counters: CounterTable,
    pc_counters: CounterTable,
    streamer: PatternBuffer,
    stats: OffsetStats,
}

impl OffsetPrefetcher {
    /// Builds the engine, rejecting an invalid configuration.
    pub fn new(cfg: OffsetConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let len = cfg.region_blocks as usize;
        Ok(Self {
            ft: FilterTable::new(cfg.ft_size as usize, cfg.ft_ways as usize),
            at: AccumulationTable::new(cfg.at_size as usize, cfg.at_ways as usize, len),
            offset_counters: CounterTable::new(len, cfg.counter_max),
            pc_counters: CounterTable::new(len / 2, cfg.counter_max),
            // the streamer drains without a per-access degree cap
            streamer: PatternBuffer::new(
                cfg.ps_size as usize,
                cfg.ps_ways as usize,
                len,
                0,
                cfg.log2_block_size,
            ),
            stats: OffsetStats::default(),
            cfg,
        })
    }

    pub fn stats(&self) -> &OffsetStats {
        &self.stats
    }

    /// Trains the engine with one load access.
    pub fn access(&mut self, block: u64, pc: u64) {
        let len = self.cfg.region_blocks as u64;
        let region = block / len;
        let offset = (block % len) as usize;

        if self.at.observe(region, offset) {
            return;
        }
        let Some(entry) = self.ft.find(region).cloned() else {
            // trigger access
            self.ft.insert(region, pc, offset);
            if let Some(fills) = self.lookup(pc, block) {
                self.stats.predictions += 1;
                self.streamer.insert(region, fills);
            }
            return;
        };
        if entry.data.offset == offset {
            return;
        }
        // second distinct offset: move the region into the accumulation table
        let region = self.ft.region_of(&entry);
        let victim = self.at.insert_trigger(region, entry.data.pc, entry.data.offset);
        self.at.observe(region, offset);
        self.ft.erase(region);
        if let Some(victim) = victim {
            self.retire(victim);
        }
    }

    /// Clears the evicted block's region, folding an accumulated footprint into the counters.
    pub fn eviction(&mut self, block: u64) {
        let region = block / self.cfg.region_blocks as u64;
        self.ft.erase(region);
        if let Some(entry) = self.at.erase(region) {
            self.retire(entry);
        }
    }

    /// Drains pending prefetches around `block` into `proposed`.
    pub fn issue(
        &mut self,
        block: u64,
        cache: &mut dyn CacheHost,
        proposed: &mut Vec<u64>,
    ) -> usize {
        self.streamer.issue(block, cache, proposed)
    }

    /// Combines the two counter tables into a fill pattern anchored at the live offset.
    fn lookup(&self, pc: u64, block: u64) -> Option<FillPattern> {
        let len = self.cfg.region_blocks as usize;
        let offset = (block % len as u64) as usize;
        let by_offset =
            self.offset_counters.extract(offset as u64, self.cfg.hi_thresh, self.cfg.lo_thresh)?;
        let by_pc = self.pc_counters.extract(pc, self.cfg.hi_thresh, self.cfg.lo_thresh)?;

        let mut combined = FillPattern::zeroed(len);
        for i in 0..len {
            if by_offset.get(i).is_fetch() {
                let level =
                    if by_pc.get(i / 2).is_fetch() { FillLevel::L2 } else { FillLevel::Llc };
                combined.set(i, level);
            }
        }
        Some(combined.rotate_right(offset))
    }

    /// Folds a retired footprint into both counter tables, canonically rotated.
    fn retire(&mut self, entry: Entry<FootprintData>) {
        self.stats.retirements += 1;
        let len = self.cfg.region_blocks as usize;
        let canonical = entry.data.observed.rotate_left(entry.data.offset);
        let mut compressed = BitPattern::zeroed(len / 2);
        for i in 0..len / 2 {
            if canonical.get(2 * i) || canonical.get(2 * i + 1) {
                compressed.set(i, true);
            }
        }
        self.offset_counters.merge(entry.data.offset as u64, &canonical);
        self.pc_counters.merge(entry.data.pc, &compressed);
    }
}

// PREFETCH ENGINE IMPL
// ================================================================================================

impl PrefetchEngine for OffsetPrefetcher {
    fn on_access(&mut self, event: AccessEvent, cache: &mut dyn CacheHost) -> Vec<u64> {
        if !event.kind.is_load() {
            return Vec::new();
        }
        let block = block_number(event.addr, self.cfg.log2_block_size);
        self.access(block, event.pc);

        let mut proposed = Vec::new();
        self.issue(block, cache, &mut proposed);
        proposed
    }

    fn on_fill(&mut self, event: FillEvent, cache: &mut dyn CacheHost) {
        if !cache.evicted_valid(event.set, event.way) {
            return;
        }
        let evicted_block = block_number(event.evicted_addr, self.cfg.log2_block_size);
        self.eviction(evicted_block);
    }
}
