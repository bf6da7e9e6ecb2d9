use alloc::{collections::BTreeSet, vec::Vec};

use prefetch_core::{ConfigError, CorrelationConfig, FillLevel, block_base, block_number};

use crate::{AccessEvent, CacheHost, FillEvent, PrefetchEngine};

mod history;
mod index;
mod stream;

#[cfg(test)]
mod tests;

use history::HistoryBuffer;
use index::{IndexTable, SuperEntry};
use stream::ActiveStreamSet;

// STATISTICS
// ================================================================================================

/// Counters describing how the correlation engine has been predicting.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationStats {
    /// Accesses that passed the miss/prefetched-hit gate.
    pub accesses: u64,
    /// Accesses consumed by an in-flight stream.
    pub stream_advances: u64,
    /// Second-address matches that started a replay stream.
    pub replays: u64,
    /// First-address matches that armed a candidate.
    pub arms: u64,
}

// CORRELATION PREFETCHER
// ================================================================================================

/// Address-correlation prefetcher.
///
/// Every qualifying access is appended to a history ring and indexed under its predecessor, so
/// the table maps each address to the successors that have followed it. Prediction is a
/// three-step ladder per access: advance an in-flight stream the access belongs to, else replay
/// history behind a second-address match on the candidate armed by the previous access, else arm
/// a new candidate from a first-address match.
#[derive(Debug)]
pub struct CorrelationPrefetcher {
    cfg: CorrelationConfig,
    history: HistoryBuffer,
    index: IndexTable,
    streams: ActiveStreamSet,
    /// First address whose super-entry the next access will try to second-match.
    candidate: Option<u64>,
    /// Blocks this engine has prefetched and not yet seen evicted.
    prefetched: BTreeSet<u64>,
    last_block: u64,
    stats: CorrelationStats,
}

impl CorrelationPrefetcher {
    /// Builds the engine, rejecting an invalid configuration.
    pub fn new(cfg: CorrelationConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            history: HistoryBuffer::new(cfg.history_capacity),
            index: IndexTable::new(cfg.index_table_size),
            streams: ActiveStreamSet::new(cfg.active_stream_size),
            candidate: None,
            prefetched: BTreeSet::new(),
            last_block: 0,
            stats: CorrelationStats::default(),
            cfg,
        })
    }

    pub fn stats(&self) -> &CorrelationStats {
        &self.stats
    }

    /// Observes one qualifying access; emitted predictions are block numbers.
    fn access(&mut self, block: u64) -> Vec<u64> {
        self.stats.accesses += 1;
        let mut proposed = Vec::new();

        if self.streams.advance(block, &self.history, &mut proposed) {
            self.stats.stream_advances += 1;
        } else if self.replay_second(block, &mut proposed) {
            self.stats.replays += 1;
        } else if self.arm_first(block, &mut proposed) {
            self.stats.arms += 1;
        }

        self.record(block);
        proposed
    }

    /// Second step of the ladder: the candidate armed by the previous access is probed for
    /// `block` among its successors; a hit replays the history that followed and opens a stream.
    fn replay_second(&mut self, block: u64, proposed: &mut Vec<u64>) -> bool {
        let Some(first) = self.candidate else {
            return false;
        };
        // the candidate may have aged out of the index since it was armed
        let Some(entry) = self.index.get_mut(first) else {
            return false;
        };
        let Some(pointer) = entry.find(block) else {
            return false;
        };

        tracing::debug!(first, block, pointer, "second-address match, replaying history");
        let mut pending = BTreeSet::new();
        let mut emitted = 0u64;
        for i in 1..=self.cfg.degree as u64 {
            let Some(next) = self.history.get(pointer + i) else {
                break;
            };
            proposed.push(next);
            pending.insert(next);
            emitted = i;
        }
        self.streams.create(pointer + emitted, pending);
        true
    }

    /// Third step: a first-address hit emits the most recent successor and arms the entry as the
    /// candidate for the next access.
    fn arm_first(&mut self, block: u64, proposed: &mut Vec<u64>) -> bool {
        match self.index.get_mut(block) {
            Some(entry) => {
                proposed.push(entry.mru_second());
                self.candidate = Some(block);
                true
            },
            None => {
                self.candidate = None;
                false
            },
        }
    }

    /// Appends the access to the history and indexes it under its predecessor.
    fn record(&mut self, block: u64) {
        let pointer = self.history.push(block);
        if self.last_block != 0 {
            match self.index.get_mut(self.last_block) {
                Some(entry) => entry.insert(block, pointer),
                None => {
                    let entry = SuperEntry::new(block, pointer, self.cfg.super_entry_size);
                    self.index.insert(self.last_block, entry);
                },
            }
        }
        self.last_block = block;
    }
}

// PREFETCH ENGINE IMPL
// ================================================================================================

impl PrefetchEngine for CorrelationPrefetcher {
    fn on_access(&mut self, event: AccessEvent, cache: &mut dyn CacheHost) -> Vec<u64> {
        if !event.kind.is_load() {
            return Vec::new();
        }
        let block = block_number(event.addr, self.cfg.log2_block_size);
        // train on misses and on hits to blocks this engine itself brought in
        if event.cache_hit && !self.prefetched.contains(&block) {
            return Vec::new();
        }
        if block == self.last_block {
            return Vec::new();
        }

        let blocks = self.access(block);
        let mut proposed = Vec::with_capacity(blocks.len());
        for b in blocks {
            let target = block_base(b, self.cfg.log2_block_size);
            cache.prefetch_line(event.pc, event.addr, target, FillLevel::L2, 0);
            self.prefetched.insert(b);
            proposed.push(target);
        }
        proposed
    }

    fn on_fill(&mut self, event: FillEvent, _cache: &mut dyn CacheHost) {
        let evicted = block_number(event.evicted_addr, self.cfg.log2_block_size);
        self.prefetched.remove(&evicted);
    }
}
