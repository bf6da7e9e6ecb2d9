use pretty_assertions::assert_eq;
use prefetch_core::{AccessType, CorrelationConfig};

use super::*;
use crate::host::StubCache;

const PC: u64 = 0xBEEF;
const X: u64 = 1000;

fn config() -> CorrelationConfig {
    CorrelationConfig { degree: 4, ..Default::default() }
}

fn miss(block: u64) -> AccessEvent {
    AccessEvent { pc: PC, addr: block << 6, cache_hit: false, kind: AccessType::Load }
}

fn hit(block: u64) -> AccessEvent {
    AccessEvent { pc: PC, addr: block << 6, cache_hit: true, kind: AccessType::Load }
}

/// Feeds the canonical training sequence x, x+1, ..., x+6 as misses.
fn trained() -> (CorrelationPrefetcher, StubCache) {
    let mut pf = CorrelationPrefetcher::new(config()).unwrap();
    let mut cache = StubCache::default();
    for block in X..=X + 6 {
        pf.on_access(miss(block), &mut cache);
    }
    cache.issued.clear();
    (pf, cache)
}

#[test]
fn cold_training_proposes_nothing() {
    let (pf, _) = trained();
    assert_eq!(pf.stats().accesses, 7);
    assert_eq!(pf.stats().replays, 0);
    assert_eq!(pf.stats().stream_advances, 0);
}

#[test]
fn first_address_match_emits_the_mru_successor() {
    let (mut pf, mut cache) = trained();
    let proposed = pf.on_access(miss(X), &mut cache);
    assert_eq!(proposed, vec![(X + 1) << 6]);
    assert_eq!(pf.stats().arms, 1);
}

#[test]
fn second_address_match_replays_and_opens_a_stream() {
    let (mut pf, mut cache) = trained();
    pf.on_access(miss(X), &mut cache); // arms candidate X, prefetches X+1
    let proposed = pf.on_access(miss(X + 1), &mut cache);
    // pair (X -> X+1) sits at pointer 1; degree 4 replays pointers 2..=5
    let expected: Vec<u64> = (X + 2..=X + 5).map(|b| b << 6).collect();
    assert_eq!(proposed, expected);
    assert_eq!(pf.stats().replays, 1);
}

#[test]
fn stream_advances_one_step_per_consumed_prefetch() {
    let (mut pf, mut cache) = trained();
    pf.on_access(miss(X), &mut cache);
    pf.on_access(miss(X + 1), &mut cache); // stream now covers X+2..=X+5

    // the prefetched X+2 arrives as a hit; the gate lets it through and the stream extends
    let proposed = pf.on_access(hit(X + 2), &mut cache);
    assert_eq!(proposed, vec![(X + 6) << 6]);
    assert_eq!(pf.stats().stream_advances, 1);
}

#[test]
fn plain_hits_do_not_train() {
    let mut pf = CorrelationPrefetcher::new(config()).unwrap();
    let mut cache = StubCache::default();
    pf.on_access(miss(X), &mut cache);
    assert!(pf.on_access(hit(X + 1), &mut cache).is_empty());
    assert_eq!(pf.stats().accesses, 1, "a hit on a never-prefetched block is invisible");
}

#[test]
fn repeated_blocks_are_dropped() {
    let mut pf = CorrelationPrefetcher::new(config()).unwrap();
    let mut cache = StubCache::default();
    pf.on_access(miss(X), &mut cache);
    pf.on_access(miss(X), &mut cache);
    assert_eq!(pf.stats().accesses, 1);
}

#[test]
fn eviction_clears_the_prefetched_gate() {
    let (mut pf, mut cache) = trained();
    pf.on_access(miss(X), &mut cache); // prefetches X+1
    assert!(pf.prefetched.contains(&(X + 1)));

    let fill = FillEvent {
        addr: 0,
        set: 0,
        way: 0,
        was_prefetch: false,
        evicted_addr: (X + 1) << 6,
    };
    pf.on_fill(fill, &mut cache);
    assert!(!pf.prefetched.contains(&(X + 1)));
    // a subsequent plain hit on it is invisible again
    assert!(pf.on_access(hit(X + 1), &mut cache).is_empty());
}

#[test]
fn replay_stops_at_the_ring_boundary() {
    let cfg = CorrelationConfig { history_capacity: 4, ..config() };
    let mut pf = CorrelationPrefetcher::new(cfg).unwrap();
    let mut cache = StubCache::default();
    for block in X..=X + 6 {
        pf.on_access(miss(block), &mut cache);
    }
    // pair (X -> X+1) lives at pointer 1, which has wrapped out of the 4-deep ring
    pf.on_access(miss(X), &mut cache);
    let proposed = pf.on_access(miss(X + 1), &mut cache);
    assert!(proposed.is_empty(), "wrapped-out history must not be replayed");
}

#[test]
fn issued_lines_fill_to_l2() {
    let (mut pf, mut cache) = trained();
    pf.on_access(miss(X), &mut cache);
    assert!(cache.issued.iter().all(|p| p.fill == FillLevel::L2));
}
