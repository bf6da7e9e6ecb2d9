#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

use alloc::{boxed::Box, vec::Vec};

pub mod correlation;
pub mod host;
pub mod offset;
pub mod spatial;
pub mod structural;

pub use correlation::CorrelationPrefetcher;
pub use host::{CacheHost, StubCache};
pub use offset::OffsetPrefetcher;
pub use prefetch_core::{
    AccessType, ConfigError, CorrelationConfig, FillLevel, FillProfile, OffsetConfig,
    SpatialConfig, StructuralConfig,
};
pub use spatial::SpatialPrefetcher;
pub use structural::StructuralPrefetcher;

// EVENTS
// ================================================================================================

/// One cache access as reported by the host simulator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AccessEvent {
    /// Program counter of the instruction that issued the access.
    pub pc: u64,
    /// Byte address of the access.
    pub addr: u64,
    /// Whether the access hit in the cache the engine is attached to.
    pub cache_hit: bool,
    /// Demand-stream classification.
    pub kind: AccessType,
}

/// One cache fill as reported by the host simulator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FillEvent {
    /// Byte address of the line that was filled.
    pub addr: u64,
    /// Set the line landed in.
    pub set: u32,
    /// Way the line landed in.
    pub way: u32,
    /// Whether the fill was caused by a prefetch.
    pub was_prefetch: bool,
    /// Byte address of the line evicted to make room.
    pub evicted_addr: u64,
}

// PREFETCH ENGINE
// ================================================================================================

/// The event interface every prefetcher core implements.
///
/// The host drives the engine synchronously: one [`PrefetchEngine::on_access`] per cache lookup
/// and one [`PrefetchEngine::on_fill`] per fill. Engines issue prefetches through the
/// [`CacheHost`] callback and additionally return the block-aligned byte addresses they proposed,
/// so hosts that queue prefetches themselves can consume the return value instead.
pub trait PrefetchEngine {
    /// Observes an access, trains the engine's tables, and returns the proposed prefetch
    /// addresses (byte-aligned, block-aligned).
    fn on_access(&mut self, event: AccessEvent, cache: &mut dyn CacheHost) -> Vec<u64>;

    /// Observes a fill and clears transient bookkeeping for the evicted line.
    fn on_fill(&mut self, event: FillEvent, cache: &mut dyn CacheHost);
}

// ENGINE SELECTION
// ================================================================================================

/// Selects which core to build; each variant carries that core's full configuration.
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum EngineConfig {
    /// Multi-level spatial pattern engine.
    Spatial(SpatialConfig),
    /// Address-correlation engine.
    Correlation(CorrelationConfig),
    /// Structural-address engine.
    Structural(StructuralConfig),
    /// Counter-table offset engine.
    Offset(OffsetConfig),
}

/// Builds the selected engine, rejecting invalid configurations up front.
pub fn build_engine(config: EngineConfig) -> Result<Box<dyn PrefetchEngine>, ConfigError> {
    Ok(match config {
        EngineConfig::Spatial(cfg) => Box::new(SpatialPrefetcher::new(cfg)?),
        EngineConfig::Correlation(cfg) => Box::new(CorrelationPrefetcher::new(cfg)?),
        EngineConfig::Structural(cfg) => Box::new(StructuralPrefetcher::new(cfg)?),
        EngineConfig::Offset(cfg) => Box::new(OffsetPrefetcher::new(cfg)?),
    })
}
