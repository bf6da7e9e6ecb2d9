use alloc::vec::Vec;

use prefetch_core::{
    BitPattern, ConfigError, Entry, FillLevel, FillPattern, SpatialConfig, block_number,
    hash_index,
};

use crate::{AccessEvent, CacheHost, FillEvent, PrefetchEngine};

mod accumulation;
pub(crate) mod buffer;
mod filter;
mod history;

#[cfg(test)]
mod tests;

use accumulation::{AccumData, AccumulationTable};
use buffer::PatternBuffer;
use filter::{FilterData, FilterTable};
use history::{HistoryMatch, PatternHistoryTable};

// CONSTANTS
// ================================================================================================

/// Block-address bits participating in region keys; regions are truncated to this window before
/// hashing.
const BLOCK_ADDR_WIDTH: u32 = 42;

/// Builds the table key of a region: truncate to the block-address window, then fold the tag into
/// the index bits.
fn region_key(region: u64, pattern_len: usize, index_bits: u32) -> u64 {
    let width = BLOCK_ADDR_WIDTH - pattern_len.trailing_zeros();
    hash_index(region & ((1u64 << width) - 1), index_bits)
}

// STATISTICS
// ================================================================================================

/// Counters describing how the spatial engine has been reshaping its regions.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SpatialStats {
    /// Filter-to-accumulation promotions (a region's second distinct offset).
    pub promotions: u64,
    /// Sibling coalescings into the next coarser level.
    pub level_ups: u64,
    /// Accumulation entries retired into the pattern history table.
    pub retirements: u64,
    /// Retirements that split the region into the next finer level.
    pub level_downs: u64,
}

// SPATIAL PREFETCHER
// ================================================================================================

/// Multi-level spatial pattern prefetcher.
///
/// Each level tracks regions of a fixed power-of-two size, doubling per level. Accesses flow
/// filter table → accumulation table → pattern history table; regions grow a level when two
/// adjacent siblings co-activate and shrink a level when the co-observed half retires empty or
/// inaccurate. Predictions out of the history table are merged into the pattern buffer at
/// top-level granularity and drained under the host's queue budget.
#[derive(Debug)]
pub struct SpatialPrefetcher {
    cfg: SpatialConfig,
    ft: Vec<FilterTable>,
    at: Vec<AccumulationTable>,
    pht: Vec<PatternHistoryTable>,
    pb: PatternBuffer,
    stats: SpatialStats,
}

impl SpatialPrefetcher {
    /// Builds the engine, rejecting an invalid configuration.
    pub fn new(cfg: SpatialConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let mut ft = Vec::with_capacity(cfg.levels);
        let mut at = Vec::with_capacity(cfg.levels);
        let mut pht = Vec::with_capacity(cfg.levels);
        for level in 0..cfg.levels {
            let len = cfg.pattern_len(level);
            ft.push(FilterTable::new(cfg.ft_size[level] as usize, cfg.ft_ways as usize, len));
            at.push(AccumulationTable::new(
                cfg.at_size[level] as usize,
                cfg.ft_ways as usize,
                len,
            ));
            pht.push(PatternHistoryTable::new(
                cfg.pht_size[level] as usize,
                cfg.pht_ways as usize,
                len,
                cfg.pc_width,
                cfg.min_addr_width[level],
                cfg.max_addr_width,
            ));
        }
        let pb = PatternBuffer::new(
            cfg.pb_size as usize,
            cfg.pb_ways as usize,
            cfg.top_pattern_len(),
            cfg.pf_degree,
            cfg.log2_block_size,
        );
        Ok(Self { cfg, ft, at, pht, pb, stats: SpatialStats::default() })
    }

    pub fn stats(&self) -> &SpatialStats {
        &self.stats
    }

    /// Trains the engine with one load access.
    pub fn access(&mut self, block: u64, pc: u64) {
        // an actively accumulated region absorbs the touch and nothing else happens
        for level in 0..self.cfg.levels {
            let len = self.at[level].pattern_len() as u64;
            if self.at[level].observe(block / len, (block % len) as usize) {
                tracing::trace!(level, block, "touch absorbed by accumulation table");
                return;
            }
        }

        let mut hit = None;
        for level in 0..self.cfg.levels {
            let len = self.ft[level].pattern_len() as u64;
            if let Some(entry) = self.ft[level].find(block / len) {
                hit = Some((level, entry.clone()));
                break;
            }
        }
        let Some((level, entry)) = hit else {
            self.trigger_access(block, pc);
            return;
        };

        let len = self.ft[level].pattern_len() as u64;
        let region_offset = (block % len) as usize;
        if entry.data.offset == region_offset {
            // repeated trigger offset: recency already refreshed by the probe
            return;
        }
        self.stats.promotions += 1;
        self.promote(level, entry, block, pc, region_offset);
    }

    /// Clears all state of the evicted block's regions and retires accumulated footprints.
    pub fn eviction(&mut self, block: u64) {
        for level in 0..self.cfg.levels {
            let len = self.at[level].pattern_len() as u64;
            let region = block / len;
            self.ft[level].erase(region);
            if let Some(entry) = self.at[level].erase(region) {
                self.retire(entry, level);
            }
        }
    }

    /// Drains pending prefetches around `block` into `proposed`.
    pub fn issue(
        &mut self,
        block: u64,
        cache: &mut dyn CacheHost,
        proposed: &mut Vec<u64>,
    ) -> usize {
        self.pb.issue(block, cache, proposed)
    }

    // TRIGGER PATH
    // --------------------------------------------------------------------------------------------

    /// First touch of a region nobody is tracking: consult the history and start filtering.
    fn trigger_access(&mut self, block: u64, pc: u64) {
        let prediction = self.find_in_pht(pc, block);
        let insert_level =
            prediction.as_ref().map_or(self.cfg.default_insert_level, |(_, level)| *level);
        let len = self.ft[insert_level].pattern_len();

        let mut predicted = BitPattern::zeroed(len);
        if let Some((fills, _)) = &prediction {
            for i in 0..len {
                if fills.get(i).is_fetch() {
                    predicted.set(i, true);
                }
            }
        }
        let region = block / len as u64;
        let offset = (block % len as u64) as usize;
        self.ft[insert_level].insert(region, pc, offset, predicted);

        if let Some((fills, level)) = prediction {
            tracing::debug!(level, block, "history hit on trigger access");
            let top_len = self.cfg.top_pattern_len();
            let mut expanded = FillPattern::zeroed(top_len);
            let start = (block % top_len as u64) as usize / fills.len() * fills.len();
            for i in 0..fills.len() {
                expanded.set(start + i, fills.get(i));
            }
            self.pb.insert(block / top_len as u64, expanded);
        }
    }

    // PROMOTION AND COALESCING
    // --------------------------------------------------------------------------------------------

    /// Second distinct offset in a filtered region: move it into the accumulation table, fusing
    /// with its sibling into the parent region when the sibling is also active.
    fn promote(
        &mut self,
        level: usize,
        entry: Entry<FilterData>,
        block: u64,
        pc: u64,
        region_offset: usize,
    ) {
        let region = self.ft[level].region_of(&entry);
        let len = self.ft[level].pattern_len();

        let mut merged = None;
        if level != self.cfg.levels - 1
            && let Some(sibling) = self.at[level].erase(region ^ 1)
        {
            self.stats.level_ups += 1;
            let sibling_region = self.at[level].region_of(&sibling);
            let sibling_addr = sibling_region * len as u64 + sibling.data.offset as u64;
            let current_is_upper = region & 1 == 1;

            // merged footprint: lower child first, plus the two offsets the current region has
            // seen so far
            let mut observed = BitPattern::zeroed(len * 2);
            let (sibling_base, current_base) =
                if current_is_upper { (0, len) } else { (len, 0) };
            for i in 0..len {
                if sibling.data.observed.get(i) {
                    observed.set(sibling_base + i, true);
                }
            }
            observed.set(current_base + entry.data.offset, true);
            observed.set(current_base + region_offset, true);

            let offset_trigger = sibling_base + sibling.data.offset;
            let predicted = if current_is_upper {
                sibling.data.predicted.concat(&entry.data.predicted)
            } else {
                entry.data.predicted.concat(&sibling.data.predicted)
            };

            // fuse the children's history entries into one parent entry, keyed by the sibling's
            // trigger
            let (lower, upper) = if current_is_upper {
                (
                    self.pht[level].erase(sibling.data.pc, sibling_addr),
                    self.pht[level].erase(pc, block),
                )
            } else {
                (
                    self.pht[level].erase(pc, block),
                    self.pht[level].erase(sibling.data.pc, sibling_addr),
                )
            };
            if lower.is_some() || upper.is_some() {
                let lower = lower.unwrap_or_else(|| BitPattern::zeroed(len));
                let upper = upper.unwrap_or_else(|| BitPattern::zeroed(len));
                self.pht[level + 1].insert(
                    sibling.data.pc,
                    sibling_addr,
                    lower.concat(&upper),
                );
            }

            tracing::debug!(
                level,
                parent_region = region >> 1,
                "level up: fused sibling regions"
            );
            merged = Some((sibling.data.pc, offset_trigger, observed, predicted));
        }

        let (victim, insert_level) = match merged {
            Some((pc_trigger, offset_trigger, observed, predicted)) => {
                let victim = self.at[level + 1].insert_merged(
                    region >> 1,
                    pc_trigger,
                    offset_trigger,
                    observed,
                    predicted,
                );
                (victim, level + 1)
            },
            None => {
                let victim = self.at[level].insert_trigger(
                    region,
                    entry.data.pc,
                    entry.data.offset,
                    entry.data.predicted.clone(),
                );
                self.at[level].observe(region, region_offset);
                (victim, level)
            },
        };
        self.ft[level].erase(region);
        if let Some(victim) = victim {
            self.retire(victim, insert_level);
        }
    }

    // RETIREMENT AND SPLITTING
    // --------------------------------------------------------------------------------------------

    /// End of a region's generation: store the footprint in the history table, splitting to the
    /// finer level when the half the trigger did not touch proved empty or inaccurate.
    fn retire(&mut self, entry: Entry<AccumData>, level: usize) {
        self.stats.retirements += 1;
        let pc = entry.data.pc;
        let offset = entry.data.offset;
        let len = self.at[level].pattern_len();
        let region = self.at[level].region_of(&entry);
        let address = region * len as u64 + offset as u64;
        let observed = entry.data.observed;
        let predicted = entry.data.predicted;
        debug_assert_eq!(observed.len(), len);

        if level == 0 {
            let pattern = if !predicted.is_empty()
                && observed.agrees_in(&predicted, 0..len, self.cfg.or_thresh)
            {
                observed.or_in(&predicted, 0..len)
            } else {
                observed
            };
            self.pht[0].insert(pc, address, pattern);
            return;
        }

        let half = len / 2;
        let (trigger_half, other_half) =
            if offset < half { (0..half, half..len) } else { (half..len, 0..half) };

        if predicted.is_empty() {
            if observed.is_zero_in(other_half) {
                tracing::debug!(level, region, "level down: untouched half");
                self.stats.level_downs += 1;
                self.pht[level - 1].insert(pc, address, observed.slice(trigger_half));
                self.pht[level].erase(pc, address);
            } else {
                self.pht[level].insert(pc, address, observed);
            }
            return;
        }

        let inaccurate = self.cfg.accuracy_leveldown
            && !observed.agrees_in(&predicted, other_half.clone(), self.cfg.accuracy_thresh);
        if observed.is_zero_in(other_half) || inaccurate {
            tracing::debug!(level, region, inaccurate, "level down on retirement");
            self.stats.level_downs += 1;
            let half_pattern =
                if observed.agrees_in(&predicted, trigger_half.clone(), self.cfg.or_thresh) {
                    observed.or_in(&predicted, trigger_half)
                } else {
                    observed.slice(trigger_half)
                };
            self.pht[level - 1].insert(pc, address, half_pattern);
            self.pht[level].erase(pc, address);
        } else {
            let pattern = if observed.agrees_in(&predicted, 0..len, self.cfg.or_thresh) {
                observed.or_in(&predicted, 0..len)
            } else {
                observed
            };
            self.pht[level].insert(pc, address, pattern);
        }
    }

    // PREDICTION
    // --------------------------------------------------------------------------------------------

    /// Queries every level's history and grades the result into fill levels.
    ///
    /// A strict PC+Address match at any level short-circuits; otherwise levels vote
    /// independently, preferring the configured default level, then the coarsest level that
    /// produced a non-empty vote.
    fn find_in_pht(&mut self, pc: u64, block: u64) -> Option<(FillPattern, usize)> {
        let mut voted: Vec<Option<FillPattern>> = (0..self.cfg.levels).map(|_| None).collect();
        for level in 0..self.cfg.levels {
            match self.pht[level].lookup(pc, block) {
                HistoryMatch::Strict(pattern) => {
                    let strict_fill = self.cfg.fill_profile.strict();
                    let fills = pattern
                        .iter()
                        .map(|bit| if bit { strict_fill } else { FillLevel::None })
                        .collect();
                    return Some((fills, level));
                },
                HistoryMatch::Loose(matches) => voted[level] = self.vote(&matches),
                HistoryMatch::Miss => {},
            }
        }
        if let Some(fills) = voted[self.cfg.default_insert_level].take() {
            return Some((fills, self.cfg.default_insert_level));
        }
        for level in (0..self.cfg.levels).rev() {
            if let Some(fills) = voted[level].take() {
                return Some((fills, level));
            }
        }
        None
    }

    /// Grades each offset by the fraction of loose matches that vouch for it.
    fn vote(&self, voters: &[BitPattern]) -> Option<FillPattern> {
        if voters.is_empty() {
            return None;
        }
        let len = voters[0].len();
        let n = voters.len() as f32;
        let mut any_fetch = false;
        let fills: FillPattern = (0..len)
            .map(|i| {
                let count = voters.iter().filter(|v| v.get(i)).count() as f32;
                let fraction = count / n;
                if fraction >= self.cfg.vote_high_thresh {
                    any_fetch = true;
                    self.cfg.fill_profile.vote_high
                } else if fraction >= self.cfg.vote_low_thresh {
                    any_fetch = true;
                    self.cfg.fill_profile.vote_low
                } else {
                    FillLevel::None
                }
            })
            .collect();
        any_fetch.then_some(fills)
    }
}

// PREFETCH ENGINE IMPL
// ================================================================================================

impl PrefetchEngine for SpatialPrefetcher {
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
