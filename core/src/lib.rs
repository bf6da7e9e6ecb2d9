#![no_std]

#[macro_use]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod errors;
pub mod pattern;
pub mod table;

pub use config::{
    CorrelationConfig, FillProfile, OffsetConfig, SpatialConfig, StructuralConfig,
};
pub use errors::ConfigError;
pub use pattern::{BitPattern, FillPattern, Pattern};
pub use table::{AssocTable, Entry, hash_index};

// CONSTANTS
// ================================================================================================

/// Default cache-line width: 64-byte blocks.
pub const DEFAULT_LOG2_BLOCK_SIZE: u32 = 6;

// ACCESS TYPE
// ================================================================================================

/// Demand-stream classification of a cache access, as reported by the host simulator.
///
/// The prefetcher cores train and predict only on [`AccessType::Load`]; every other kind is
/// observed and ignored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccessType {
    /// A demand load.
    Load,
    /// A read-for-ownership (store miss).
    Rfo,
    /// A fill generated by a prefetch.
    Prefetch,
    /// A dirty-block writeback from an inner level.
    Writeback,
    /// A page-walk or other translation access.
    Translation,
}

impl AccessType {
    /// Returns true if the access should drive training and prediction.
    pub fn is_load(self) -> bool {
        matches!(self, AccessType::Load)
    }
}

// FILL LEVEL
// ================================================================================================

/// The cache level a prefetched line should be filled into.
///
/// Doubles as the per-offset "grade" of a predicted pattern: offsets the predictor is confident
/// about are filled closer to the core, low-confidence offsets stop at the LLC, and
/// [`FillLevel::None`] marks offsets that should not be fetched at all.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum FillLevel {
    /// Do not prefetch this offset.
    #[default]
    None = 0,
    /// Fill into the L1 data cache.
    L1 = 1,
    /// Fill into the L2 cache.
    L2 = 2,
    /// Fill into the last-level cache.
    Llc = 3,
}

impl FillLevel {
    /// Returns true for any level other than [`FillLevel::None`].
    pub fn is_fetch(self) -> bool {
        self != FillLevel::None
    }
}

impl core::fmt::Display for FillLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            FillLevel::None => "-",
            FillLevel::L1 => "L1",
            FillLevel::L2 => "L2",
            FillLevel::Llc => "LLC",
        };
        f.write_str(s)
    }
}

// BLOCK ARITHMETIC
// ================================================================================================

/// Converts a byte address into a block number by dropping the low `log2_block_size` bits.
#[inline(always)]
pub fn block_number(addr: u64, log2_block_size: u32) -> u64 {
    addr >> log2_block_size
}

/// Converts a block number back into the byte address of the first byte of the block.
#[inline(always)]
pub fn block_base(block: u64, log2_block_size: u32) -> u64 {
    block << log2_block_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trip() {
        let addr = 0xdead_beef_u64;
        let block = block_number(addr, DEFAULT_LOG2_BLOCK_SIZE);
        assert_eq!(block, 0xdead_beef >> 6);
        assert_eq!(block_base(block, DEFAULT_LOG2_BLOCK_SIZE), addr & !0x3f);
    }

    #[test]
    fn only_loads_train() {
        assert!(AccessType::Load.is_load());
        assert!(!AccessType::Rfo.is_load());
        assert!(!AccessType::Prefetch.is_load());
        assert!(!AccessType::Writeback.is_load());
    }
}
