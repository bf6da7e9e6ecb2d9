// CONFIG ERROR
// ================================================================================================

/// Rejection diagnostics for malformed prefetcher configurations.
///
/// Every engine constructor validates its configuration record up front and refuses to start on
/// the first violation; nothing is range-checked again on the hot path.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("prefetcher needs at least one level, got {levels}")]
    LevelsOutOfRange { levels: usize },
    #[error("per-level option '{field}' must have one value per level ({expected}), got {actual}")]
    PerLevelShape { field: &'static str, expected: usize, actual: usize },
    #[error("option '{field}' must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: u64 },
    #[error("region sizes must double per level, but level {level} has {next} after {prev}")]
    RegionNotDoubling { level: usize, prev: u32, next: u32 },
    #[error("table '{field}' of {size} entries cannot be split into power-of-two sets of {ways} ways")]
    TableGeometry { field: &'static str, size: u32, ways: u32 },
    #[error("default insert level {level} is out of range for {levels} levels")]
    InsertLevelOutOfRange { level: usize, levels: usize },
    #[error("threshold '{field}' must lie in [0, 1], got {value}")]
    ThresholdOutOfRange { field: &'static str, value: f32 },
    #[error("high-confidence vote threshold {high} must not be below the low one {low}")]
    VoteThresholdOrder { high: f32, low: f32 },
    #[error("level {level} minimum address width {min} exceeds the maximum address width {max}")]
    AddressWidthOrder { level: usize, min: u32, max: u32 },
    #[error(
        "level {level} key of {key_bits} bits (pc + min address) cannot index {index_bits} set bits"
    )]
    KeyTooNarrow { level: usize, key_bits: u32, index_bits: u32 },
    #[error("pc width plus maximum address width is {bits} bits, which does not fit a 64-bit key")]
    KeyTooWide { bits: u32 },
    #[error("stream length {length} does not match 2^{bits}")]
    StreamLengthMismatch { length: u32, bits: u32 },
    #[error("option '{field}' must be non-zero")]
    ZeroCapacity { field: &'static str },
}
