use alloc::vec::Vec;

use prefetch_core::{ConfigError, FillLevel, StructuralConfig, block_base, block_number};

use crate::{AccessEvent, CacheHost, FillEvent, PrefetchEngine};

mod training;
mod translator;


use training::{PairOutcome, TrainingUnit};
use translator::{CONFIDENCE_MAX, CONFIDENCE_TENTATIVE, StructuralTranslator};

// STATISTICS
// ================================================================================================

/// Counters describing how the structural engine has been translating and training.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StructuralStats {
    /// Qualifying (deduplicated load) accesses.
    pub accesses: u64,
    /// Candidate addresses emitted.
    pub predictions: u64,
    /// Accesses whose block had no structural address.
    pub no_prediction: u64,
    /// Predictions cut short by a stream boundary.
    pub stream_ends: u64,
    /// Structural successors with no physical binding during prediction.
    pub no_translation: u64,
    /// Pairs that diverged from an established stream.
    pub stream_divergences: u64,
    /// Fresh streams allocated because the predecessor sat at a stream boundary.
    pub boundary_allocations: u64,
}

// STRUCTURAL PREFETCHER
// ================================================================================================

/// Structural-address prefetcher.
///
/// Physical addresses that appear consecutively under the same PC are assigned numerically
/// adjacent *structural* addresses, so arbitrary pointer-chasing sequences become sequential
/// streams in structural space. Prediction walks the structural successors of the accessed
/// block and translates them back to physical addresses; training keeps the bidirectional
/// mapping consistent under a per-binding confidence counter.
#[derive(Debug)]
pub struct StructuralPrefetcher {
    cfg: StructuralConfig,
    translator: StructuralTranslator,
    training: TrainingUnit,
    alloc_counter: u32,
    last_block: u64,
    stats: StructuralStats,
}

impl StructuralPrefetcher {
    /// Builds the engine, rejecting an invalid configuration.
    pub fn new(cfg: StructuralConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            translator: StructuralTranslator::new(),
            training: TrainingUnit::new(),
            alloc_counter: 0,
            last_block: 0,
            stats: StructuralStats::default(),
        })
    }

    pub fn stats(&self) -> &StructuralStats {
        &self.stats
    }

    /// Reserves the next stream of structural addresses and returns its first address.
    fn fresh_stream(&mut self) -> u32 {
        self.alloc_counter = self.alloc_counter.wrapping_add(self.cfg.stream_max_length);
        self.alloc_counter
    }

    /// Emits up to `degree` physical candidates around the trigger's structural address.
    fn predict(&mut self, trigger_structural: u32, proposed: &mut Vec<u64>) {
        let max_len = self.cfg.stream_max_length;
        if self.cfg.is_restrict_region {
            // walk the trigger's whole stream window
            let base = (trigger_structural >> self.cfg.stream_max_length_bits)
                << self.cfg.stream_max_length_bits;
            for i in 0..max_len {
                let candidate = base + i;
                if candidate == trigger_structural {
                    continue;
                }
                if let Some(phys) = self.translator.physical_of(candidate) {
                    proposed.push(phys);
                    if proposed.len() >= self.cfg.degree {
                        break;
                    }
                }
            }
        } else {
            // walk ahead of the trigger, stopping at the stream boundary
            for i in 0..max_len {
                if proposed.len() >= self.cfg.degree {
                    break;
                }
                let candidate = trigger_structural + 1 + i;
                if candidate % max_len == 0 {
                    self.stats.stream_ends += 1;
                    break;
                }
                match self.translator.physical_of(candidate) {
                    Some(phys) => proposed.push(phys),
                    None => self.stats.no_translation += 1,
                }
            }
        }
    }

    /// Trains the correlated pair (A → B), given A's structural address; returns B's.
    fn train(&mut self, structural_a: u32, phys_b: u64) -> u32 {
        if let Some(structural_b) = self.translator.structural_of(phys_b) {
            if structural_b == structural_a + 1 {
                let confidence = self.translator.raise_confidence(phys_b);
                tracing::trace!(phys_b, structural_b, confidence, "pair confirmed");
                return structural_b;
            }
            // B already belongs elsewhere; keep it until its confidence drains
            if self.translator.lower_confidence(phys_b) > 0 {
                return structural_b;
            }
            self.translator.invalidate(phys_b, structural_b);
        }

        if (structural_a + 1) % self.cfg.stream_max_length == 0 {
            // A closes its stream; B is as good as a stream start
            self.stats.boundary_allocations += 1;
            let structural_b = self.fresh_stream();
            self.translator.bind(phys_b, structural_b, CONFIDENCE_MAX);
            return structural_b;
        }

        if self.translator.physical_of(structural_a + 1).is_some() {
            // stream divergence: the successor slot is taken by an established binding, which
            // survives; B starts a tentative stream of its own
            self.stats.stream_divergences += 1;
            tracing::debug!(structural_a, phys_b, "stream divergence");
            let structural_b = self.fresh_stream();
            self.translator.bind(phys_b, structural_b, CONFIDENCE_TENTATIVE);
            return structural_b;
        }

        let structural_b = structural_a + 1;
        self.translator.bind(phys_b, structural_b, CONFIDENCE_MAX);
        structural_b
    }
}

// PREFETCH ENGINE IMPL
// ================================================================================================

impl PrefetchEngine for StructuralPrefetcher {
    fn on_access(&mut self, event: AccessEvent, cache: &mut dyn CacheHost) -> Vec<u64> {
        if !event.kind.is_load() {
            return Vec::new();
        }
        let block = block_number(event.addr, self.cfg.log2_block_size);
        if block == self.last_block {
            return Vec::new();
        }
        self.last_block = block;
        self.stats.accesses += 1;

        let mut candidates = Vec::new();
        let structural = self.translator.structural_of(block);
        match structural {
            Some(trigger) => {
                self.predict(trigger, &mut candidates);
                self.stats.predictions += candidates.len() as u64;
            },
            None => self.stats.no_prediction += 1,
        }

        let mut proposed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let target = block_base(candidate, self.cfg.log2_block_size);
            cache.prefetch_line(event.pc, event.addr, target, FillLevel::L2, 0);
            proposed.push(target);
        }

        // pair this access with the PC's previous one and train the translator
        let trained = match self.training.observe(event.pc, block) {
            PairOutcome::Pair { last_block, last_structural } => {
                let structural_a = match last_structural {
                    Some(s) => s,
                    None => {
                        // second access of the PC: its first block gets a stream of its own
                        let s = self.fresh_stream();
                        self.translator.bind(last_block, s, CONFIDENCE_MAX);
                        s
                    },
                };
                Some(self.train(structural_a, block))
            },
            PairOutcome::NoPair => structural,
        };
        self.training.update(event.pc, block, trained);

        proposed
    }

    fn on_fill(&mut self, _event: FillEvent, _cache: &mut dyn CacheHost) {
        // the structural maps persist until explicitly invalidated by training
    }
}
