use alloc::vec::Vec;

use crate::{DEFAULT_LOG2_BLOCK_SIZE, FillLevel, errors::ConfigError};

// FILL PROFILE
// ================================================================================================

/// The fill levels a spatial engine grades its votes with.
///
/// The suite ships two variants of the spatial engine that differ only in where their prefetches
/// terminate: the LLC-side variant grades high-confidence offsets `L2` and low-confidence ones
/// `LLC`, while the L1-side variant grades them `L1` / `L2`. A strict PC+Address match always
/// fills to L2 in both variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FillProfile {
    pub vote_high: FillLevel,
    pub vote_low: FillLevel,
}

impl FillProfile {
    /// Grading used when the engine sits in front of the last-level cache.
    pub const fn llc() -> Self {
        Self { vote_high: FillLevel::L2, vote_low: FillLevel::Llc }
    }

    /// Grading used when the engine feeds the L1 data cache.
    pub const fn l1d() -> Self {
        Self { vote_high: FillLevel::L1, vote_low: FillLevel::L2 }
    }

    /// Fill level of a strict PC+Address pattern-history match.
    pub const fn strict(&self) -> FillLevel {
        FillLevel::L2
    }
}

// SPATIAL CONFIG
// ================================================================================================

/// Configuration of the multi-level spatial pattern engine.
///
/// Per-level vectors (`region_blocks`, `min_addr_width`, `ft_size`, `at_size`, `pht_size`) carry
/// one value per level, level 0 being the finest granularity. A region at level `l` spans
/// `region_blocks[l]` cache blocks, which is also the pattern length of that level; sizes must
/// double from one level to the next so that two adjacent regions fuse into one parent region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpatialConfig {
    /// Number of spatial levels.
    pub levels: usize,
    /// Region size in blocks per level; equals the pattern length of the level.
    pub region_blocks: Vec<u32>,
    /// Low PC bits participating in pattern-history keys.
    pub pc_width: u32,
    /// Per-level address bits participating in the loose (PC+Offset) match.
    pub min_addr_width: Vec<u32>,
    /// Address bits participating in the strict (PC+Address) match.
    pub max_addr_width: u32,
    /// Filter table entries per level.
    pub ft_size: Vec<u32>,
    /// Accumulation table entries per level.
    pub at_size: Vec<u32>,
    /// Pattern history table entries per level.
    pub pht_size: Vec<u32>,
    /// Associativity of the filter and accumulation tables.
    pub ft_ways: u32,
    /// Associativity of the pattern history tables.
    pub pht_ways: u32,
    /// Pattern buffer entries.
    pub pb_size: u32,
    /// Pattern buffer associativity.
    pub pb_ways: u32,
    /// Level a trigger access trains at when no history matched.
    pub default_insert_level: usize,
    /// Vote fraction at or above which an offset is graded with the profile's high fill level.
    pub vote_high_thresh: f32,
    /// Vote fraction at or above which an offset is graded with the profile's low fill level.
    pub vote_low_thresh: f32,
    /// Agreement fraction below which a retired half-region is considered inaccurate.
    pub accuracy_thresh: f32,
    /// Agreement fraction at or above which a retired pattern is OR-merged with its prediction.
    pub or_thresh: f32,
    /// Maximum prefetches issued per access; zero or negative disables the cap.
    pub pf_degree: i32,
    /// Split regions whose co-observed half disagreed with the prediction (not just empty halves).
    pub accuracy_leveldown: bool,
    /// Vote grading (LLC-side or L1-side variant).
    pub fill_profile: FillProfile,
    /// log2 of the cache block size in bytes.
    pub log2_block_size: u32,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            levels: 2,
            region_blocks: vec![32, 64],
            pc_width: 16,
            min_addr_width: vec![5, 6],
            max_addr_width: 16,
            ft_size: vec![64, 64],
            at_size: vec![128, 128],
            pht_size: vec![4096, 4096],
            ft_ways: 16,
            pht_ways: 16,
            pb_size: 128,
            pb_ways: 16,
            default_insert_level: 1,
            vote_high_thresh: 0.50,
            vote_low_thresh: 0.25,
            accuracy_thresh: 0.50,
            or_thresh: 0.50,
            pf_degree: 4,
            accuracy_leveldown: true,
            fill_profile: FillProfile::llc(),
            log2_block_size: DEFAULT_LOG2_BLOCK_SIZE,
        }
    }
}

impl SpatialConfig {
    /// Pattern length (= region size in blocks) of the given level.
    pub fn pattern_len(&self, level: usize) -> usize {
        self.region_blocks[level] as usize
    }

    /// Pattern length of the coarsest level, the granularity of the pattern buffer.
    pub fn top_pattern_len(&self) -> usize {
        self.region_blocks[self.levels - 1] as usize
    }

    /// Checks the whole record; every engine constructor calls this first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels == 0 {
            return Err(ConfigError::LevelsOutOfRange { levels: 0 });
        }
        check_shape("region_blocks", self.levels, self.region_blocks.len())?;
        check_shape("min_addr_width", self.levels, self.min_addr_width.len())?;
        check_shape("ft_size", self.levels, self.ft_size.len())?;
        check_shape("at_size", self.levels, self.at_size.len())?;
        check_shape("pht_size", self.levels, self.pht_size.len())?;

        for (level, &len) in self.region_blocks.iter().enumerate() {
            if !len.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo {
                    field: "region_blocks",
                    value: len as u64,
                });
            }
            if level > 0 {
                let prev = self.region_blocks[level - 1];
                if len != prev * 2 {
                    return Err(ConfigError::RegionNotDoubling { level, prev, next: len });
                }
            }
        }

        for level in 0..self.levels {
            check_geometry("ft_size", self.ft_size[level], self.ft_ways)?;
            check_geometry("at_size", self.at_size[level], self.ft_ways)?;
            check_geometry("pht_size", self.pht_size[level], self.pht_ways)?;

            let min = self.min_addr_width[level];
            if min > self.max_addr_width {
                return Err(ConfigError::AddressWidthOrder {
                    level,
                    min,
                    max: self.max_addr_width,
                });
            }
            let key_bits = self.pc_width + min;
            let index_bits = (self.pht_size[level] / self.pht_ways).trailing_zeros();
            if key_bits == 0 || key_bits < index_bits {
                return Err(ConfigError::KeyTooNarrow { level, key_bits, index_bits });
            }
        }

        let widest = self.pc_width + self.max_addr_width;
        if widest >= 58 {
            return Err(ConfigError::KeyTooWide { bits: widest });
        }

        check_geometry("pb_size", self.pb_size, self.pb_ways)?;

        if self.default_insert_level >= self.levels {
            return Err(ConfigError::InsertLevelOutOfRange {
                level: self.default_insert_level,
                levels: self.levels,
            });
        }

        check_thresh("vote_high_thresh", self.vote_high_thresh)?;
        check_thresh("vote_low_thresh", self.vote_low_thresh)?;
        check_thresh("accuracy_thresh", self.accuracy_thresh)?;
        check_thresh("or_thresh", self.or_thresh)?;
        if self.vote_high_thresh < self.vote_low_thresh {
            return Err(ConfigError::VoteThresholdOrder {
                high: self.vote_high_thresh,
                low: self.vote_low_thresh,
            });
        }

        Ok(())
    }
}

// CORRELATION CONFIG
// ================================================================================================

/// Configuration of the address-correlation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CorrelationConfig {
    /// Successor slots per index-table entry.
    pub super_entry_size: usize,
    /// Addresses replayed ahead of a matched history position.
    pub degree: usize,
    /// Concurrently tracked in-flight streams.
    pub active_stream_size: usize,
    /// Ring capacity of the history buffer, in recorded accesses.
    pub history_capacity: usize,
    /// First-address entries kept in the index table.
    pub index_table_size: usize,
    /// log2 of the cache block size in bytes.
    pub log2_block_size: u32,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            super_entry_size: 8,
            degree: 4,
            active_stream_size: 16,
            history_capacity: 1 << 16,
            index_table_size: 4096,
            log2_block_size: DEFAULT_LOG2_BLOCK_SIZE,
        }
    }
}

impl CorrelationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_nonzero("super_entry_size", self.super_entry_size)?;
        check_nonzero("degree", self.degree)?;
        check_nonzero("active_stream_size", self.active_stream_size)?;
        check_nonzero("history_capacity", self.history_capacity)?;
        check_nonzero("index_table_size", self.index_table_size)?;
        Ok(())
    }
}

// STRUCTURAL CONFIG
// ================================================================================================

/// Configuration of the structural-address engine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructuralConfig {
    /// Structural addresses per stream; streams start at multiples of this length.
    pub stream_max_length: u32,
    /// log2 of `stream_max_length`.
    pub stream_max_length_bits: u32,
    /// Maximum predictions emitted per trigger.
    pub degree: usize,
    /// Predict within the trigger's whole stream window instead of ahead of it.
    pub is_restrict_region: bool,
    /// log2 of the cache block size in bytes.
    pub log2_block_size: u32,
}

impl Default for StructuralConfig {
    fn default() -> Self {
        Self {
            stream_max_length: 1024,
            stream_max_length_bits: 10,
            degree: 8,
            is_restrict_region: false,
            log2_block_size: DEFAULT_LOG2_BLOCK_SIZE,
        }
    }
}

impl StructuralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.stream_max_length.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "stream_max_length",
                value: self.stream_max_length as u64,
            });
        }
        if self.stream_max_length != 1 << self.stream_max_length_bits {
            return Err(ConfigError::StreamLengthMismatch {
                length: self.stream_max_length,
                bits: self.stream_max_length_bits,
            });
        }
        check_nonzero("degree", self.degree)?;
        Ok(())
    }
}

// OFFSET CONFIG
// ================================================================================================

/// Configuration of the counter-table offset engine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OffsetConfig {
    /// Region size in blocks (single level).
    pub region_blocks: u32,
    /// Saturation point of the per-row trigger counter; reaching it halves the whole row.
    pub counter_max: u32,
    /// Filter table entries.
    pub ft_size: u32,
    /// Filter table associativity.
    pub ft_ways: u32,
    /// Accumulation table entries.
    pub at_size: u32,
    /// Accumulation table associativity.
    pub at_ways: u32,
    /// Prefetch streamer entries.
    pub ps_size: u32,
    /// Prefetch streamer associativity.
    pub ps_ways: u32,
    /// Counter fraction at or above which an offset is graded for the near level.
    pub hi_thresh: f32,
    /// Counter fraction at or above which an offset is graded for the far level.
    pub lo_thresh: f32,
    /// log2 of the cache block size in bytes.
    pub log2_block_size: u32,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            region_blocks: 64,
            counter_max: 32,
            ft_size: 64,
            ft_ways: 8,
            at_size: 128,
            at_ways: 16,
            ps_size: 128,
            ps_ways: 16,
            hi_thresh: 0.60,
            lo_thresh: 0.30,
            log2_block_size: DEFAULT_LOG2_BLOCK_SIZE,
        }
    }
}

impl OffsetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.region_blocks.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo {
                field: "region_blocks",
                value: self.region_blocks as u64,
            });
        }
        check_nonzero("counter_max", self.counter_max as usize)?;
        check_geometry("ft_size", self.ft_size, self.ft_ways)?;
        check_geometry("at_size", self.at_size, self.at_ways)?;
        check_geometry("ps_size", self.ps_size, self.ps_ways)?;
        check_thresh("hi_thresh", self.hi_thresh)?;
        check_thresh("lo_thresh", self.lo_thresh)?;
        if self.hi_thresh < self.lo_thresh {
            return Err(ConfigError::VoteThresholdOrder {
                high: self.hi_thresh,
                low: self.lo_thresh,
            });
        }
        Ok(())
    }
}

// HELPERS
// ================================================================================================

fn check_shape(field: &'static str, expected: usize, actual: usize) -> Result<(), ConfigError> {
    if actual != expected {
        return Err(ConfigError::PerLevelShape { field, expected, actual });
    }
    Ok(())
}

fn check_geometry(field: &'static str, size: u32, ways: u32) -> Result<(), ConfigError> {
    if ways == 0 || size == 0 || size % ways != 0 || !(size / ways).is_power_of_two() {
        return Err(ConfigError::TableGeometry { field, size, ways });
    }
    Ok(())
}

fn check_thresh(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { field, value });
    }
    Ok(())
}

fn check_nonzero(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroCapacity { field });
    }
    Ok(())
}

// TESTS
// ================================================================================================
