use alloc::vec::Vec;

use prefetch_core::FillLevel;

// CACHE HOST
// ================================================================================================

/// The narrow view of the enclosing cache an engine is allowed to see.
///
/// Engines read queue occupancy to rate-limit themselves and call
/// [`CacheHost::prefetch_line`] to issue; they never mutate cache state directly.
pub trait CacheHost {
    /// Current prefetch-queue occupancy.
    fn pq_occupancy(&self) -> usize;

    /// Prefetch-queue capacity.
    fn pq_size(&self) -> usize;

    /// Current MSHR occupancy.
    fn mshr_occupancy(&self) -> usize;

    /// MSHR capacity.
    fn mshr_size(&self) -> usize;

    /// Whether the frame at (set, way) held a valid line before the reported fill; a fill into an
    /// invalid frame evicts nothing.
    fn evicted_valid(&self, set: u32, way: u32) -> bool;

    /// Queues a prefetch of `target_addr`, to be filled into `fill`.
    fn prefetch_line(
        &mut self,
        pc: u64,
        trigger_addr: u64,
        target_addr: u64,
        fill: FillLevel,
        metadata: u32,
    );
}

/// Returns true while the downstream queues can absorb one more prefetch.
///
/// The budget keeps one MSHR entry in reserve for demand misses: issue requires
/// `pq + mshr < mshr_size - 1` as well as a free prefetch-queue slot.
pub(crate) fn has_queue_budget(cache: &dyn CacheHost) -> bool {
    cache.pq_occupancy() + cache.mshr_occupancy() + 1 < cache.mshr_size()
        && cache.pq_occupancy() < cache.pq_size()
}

// STUB CACHE
// ================================================================================================

/// An issued prefetch as recorded by [`StubCache`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IssuedPrefetch {
    pub pc: u64,
    pub trigger_addr: u64,
    pub target_addr: u64,
    pub fill: FillLevel,
    pub metadata: u32,
}

/// A stand-in cache that records every issued prefetch.
///
/// Useful for offline replay and for tests: occupancy values are plain fields, so a harness can
/// model queue pressure by adjusting them between accesses. By default every frame reads as
/// valid, so every reported fill counts as an eviction.
#[derive(Debug, Clone)]
pub struct StubCache {
    pub pq_occupancy: usize,
    pub pq_size: usize,
    pub mshr_occupancy: usize,
    pub mshr_size: usize,
    pub issued: Vec<IssuedPrefetch>,
    /// When set, prefetch-queue occupancy grows with every issued line.
    pub count_issues: bool,
}

impl StubCache {
    pub fn new(pq_size: usize, mshr_size: usize) -> Self {
        Self {
            pq_occupancy: 0,
            pq_size,
            mshr_occupancy: 0,
            mshr_size,
            issued: Vec::new(),
            count_issues: false,
        }
    }

    /// Targets of every issued prefetch, in issue order.
    pub fn targets(&self) -> Vec<u64> {
        self.issued.iter().map(|p| p.target_addr).collect()
    }
}

impl Default for StubCache {
    fn default() -> Self {
        Self::new(32, 64)
    }
}

impl CacheHost for StubCache {
    fn pq_occupancy(&self) -> usize {
        self.pq_occupancy
    }

    fn pq_size(&self) -> usize {
        self.pq_size
    }

    fn mshr_occupancy(&self) -> usize {
        self.mshr_occupancy
    }

    fn mshr_size(&self) -> usize {
        self.mshr_size
    }

    fn evicted_valid(&self, _set: u32, _way: u32) -> bool {
        true
    }

    fn prefetch_line(
        &mut self,
        pc: u64,
        trigger_addr: u64,
        target_addr: u64,
        fill: FillLevel,
        metadata: u32,
    ) {
        self.issued.push(IssuedPrefetch { pc, trigger_addr, target_addr, fill, metadata });
        if self.count_issues {
            self.pq_occupancy += 1;
        }
    }
}
