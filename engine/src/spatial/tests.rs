use pretty_assertions::assert_eq;
use prefetch_core::{AccessType, BitPattern, FillLevel, FillProfile, SpatialConfig};

use super::*;
use crate::host::StubCache;

const PC: u64 = 0xA;

fn two_level_config() -> SpatialConfig {
    SpatialConfig {
        levels: 2,
        region_blocks: vec![4, 8],
        pc_width: 8,
        min_addr_width: vec![2, 3],
        max_addr_width: 12,
        ft_size: vec![16, 16],
        at_size: vec![16, 16],
        pht_size: vec![64, 64],
        ft_ways: 4,
        pht_ways: 4,
        pb_size: 16,
        pb_ways: 4,
        default_insert_level: 0,
        vote_high_thresh: 0.50,
        vote_low_thresh: 0.25,
        accuracy_thresh: 0.50,
        or_thresh: 0.50,
        pf_degree: 0,
        accuracy_leveldown: true,
        fill_profile: FillProfile::llc(),
        log2_block_size: 6,
    }
}

fn single_level_config() -> SpatialConfig {
    SpatialConfig {
        levels: 1,
        region_blocks: vec![32],
        min_addr_width: vec![5],
        ft_size: vec![64],
        at_size: vec![128],
        pht_size: vec![4096],
        default_insert_level: 0,
        ..two_level_config()
    }
}

fn load(addr: u64) -> AccessEvent {
    AccessEvent { pc: PC, addr, cache_hit: false, kind: AccessType::Load }
}

fn fill_evicting(evicted_addr: u64) -> FillEvent {
    FillEvent { addr: 0, set: 0, way: 0, was_prefetch: false, evicted_addr }
}

// PROMOTION AND COALESCING
// ================================================================================================

#[test]
fn second_offset_promotes_into_accumulation() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    pf.access(0, PC);
    assert!(pf.ft[0].get(0).is_some());
    assert_eq!(pf.at[0].len(), 0);

    pf.access(1, PC);
    assert!(pf.ft[0].get(0).is_none());
    let entry = pf.at[0].get(0).expect("region should be accumulating");
    assert_eq!(entry.data.observed, BitPattern::with_bits(4, &[0, 1]));
    assert_eq!(pf.stats().promotions, 1);
}

#[test]
fn sibling_coactivation_levels_up() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    // activate level-0 region 0 (blocks 0..4)
    pf.access(0, PC);
    pf.access(1, PC);
    // trigger level-0 region 1 (blocks 4..8); its promotion fuses with the sibling
    pf.access(4, PC);
    assert_eq!(pf.at[0].len(), 1);
    pf.access(5, PC);

    assert_eq!(pf.at[0].len(), 0, "both children must leave level 0");
    assert_eq!(pf.ft[0].len(), 0);
    let parent = pf.at[1].get(0).expect("parent region should be accumulating");
    assert_eq!(parent.data.observed, BitPattern::with_bits(8, &[0, 1, 4, 5]));
    // the parent inherits the sibling's trigger (it was there first)
    assert_eq!(parent.data.pc, PC);
    assert_eq!(parent.data.offset, 0);
    assert_eq!(pf.stats().level_ups, 1);

    // later touches land in the fused region directly
    pf.access(6, PC);
    let parent = pf.at[1].get(0).unwrap();
    assert_eq!(parent.data.observed, BitPattern::with_bits(8, &[0, 1, 4, 5, 6]));
}

#[test]
fn level_up_merges_child_history_entries() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    // seed level-0 history for both children: (pc, addr 0) and (pc, addr 5)
    pf.pht[0].insert(PC, 0, BitPattern::with_bits(4, &[0, 1]));
    pf.pht[0].insert(PC, 5, BitPattern::with_bits(4, &[1, 2]));

    pf.access(0, PC);
    pf.access(1, PC);
    pf.access(4, PC);
    pf.access(5, PC);

    // children gone from level 0, exactly one merged entry at level 1 under the sibling's key
    assert!(pf.pht[0].canonical(PC, 0).is_none());
    assert!(pf.pht[0].canonical(PC, 5).is_none());
    assert!(pf.pht[1].canonical(PC, 0).is_some());
}

// RETIREMENT AND SPLITTING
// ================================================================================================

#[test]
fn untouched_half_splits_on_retirement() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    // a level-1 region whose upper half was never touched; trigger offset 1
    pf.at[1].insert_merged(
        0,
        PC,
        1,
        BitPattern::with_bits(8, &[0, 1, 3]),
        BitPattern::empty(),
    );
    // a stale level-1 history entry for the same key must not survive the split
    pf.pht[1].insert(PC, 1, BitPattern::with_bits(8, &[0, 1]));

    pf.eviction(1);

    assert_eq!(pf.stats().level_downs, 1);
    assert!(pf.pht[1].canonical(PC, 1).is_none(), "stale level-1 entry must be erased");
    // trigger half 1101, stored canonically (rotated left by offset 1 within 4)
    assert_eq!(
        pf.pht[0].canonical(PC, 1),
        Some(BitPattern::with_bits(4, &[0, 2, 3]))
    );
}

#[test]
fn inaccurate_half_splits_even_when_touched() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    // upper half was touched, but the prediction promised a very different footprint there
    let observed = BitPattern::with_bits(8, &[0, 1, 4]);
    let predicted = BitPattern::with_bits(8, &[0, 1, 5, 6, 7]);
    pf.at[1].insert_merged(0, PC, 1, observed, predicted);

    pf.eviction(1);

    // agreement on the upper half is 1/4 < 0.5: split to level 0
    assert_eq!(pf.stats().level_downs, 1);
    assert!(pf.pht[0].canonical(PC, 1).is_some());
}

#[test]
fn agreeing_full_pattern_retires_in_place() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    let observed = BitPattern::with_bits(8, &[0, 1, 5, 6]);
    let predicted = BitPattern::with_bits(8, &[0, 1, 5, 7]);
    pf.at[1].insert_merged(0, PC, 1, observed, predicted);

    pf.eviction(1);

    assert_eq!(pf.stats().level_downs, 0);
    // agreement 6/8 >= or-threshold: the OR of observation and prediction is stored
    let canonical = pf.pht[1].canonical(PC, 1).unwrap();
    assert_eq!(canonical, BitPattern::with_bits(8, &[0, 1, 5, 6, 7]).rotate_left(1));
}

#[test]
fn eviction_clears_every_level() {
    let mut pf = SpatialPrefetcher::new(two_level_config()).unwrap();
    pf.access(0, PC);
    pf.access(1, PC); // level-0 region 0 accumulating
    pf.access(8, PC); // level-0 region 2 filtering

    pf.eviction(0);
    pf.eviction(8);
    for level in 0..2 {
        assert_eq!(pf.ft[level].len(), 0, "filter level {level}");
        assert_eq!(pf.at[level].len(), 0, "accumulation level {level}");
    }
    // the accumulated region retired into the history table
    assert!(pf.pht[0].canonical(PC, 0).is_some());
}

// PREDICTION AND ISSUE
// ================================================================================================

#[test]
fn learned_stride_is_replayed_into_the_pattern_buffer() {
    let mut pf = SpatialPrefetcher::new(single_level_config()).unwrap();
    let mut cache = StubCache::default();

    // learn a dense footprint over region 3 (blocks 96..128), trigger offset 4
    for block in 100..128 {
        pf.on_access(load(block << 6), &mut cache);
    }
    assert!(cache.issued.is_empty(), "nothing to propose while learning cold");
    pf.on_fill(fill_evicting(100 << 6), &mut cache);
    assert!(pf.pht[0].canonical(PC, 100).is_some());

    // the same pc touching a fresh region at the same offset replays the footprint
    let proposed = pf.on_access(load(132 << 6), &mut cache);
    let expected: Vec<u64> = (133..160).map(|b| b << 6).collect();
    assert_eq!(proposed, expected);
    assert_eq!(cache.targets(), expected);
    assert!(cache.issued.iter().all(|p| p.fill == FillLevel::L2));
}

#[test]
fn strict_match_short_circuits_with_l2_fills() {
    let mut pf = SpatialPrefetcher::new(single_level_config()).unwrap();
    let mut cache = StubCache::default();
    for block in 100..128 {
        pf.on_access(load(block << 6), &mut cache);
    }
    pf.on_fill(fill_evicting(100 << 6), &mut cache);

    // re-touching the very same region matches PC+Address strictly
    let proposed = pf.on_access(load(100 << 6), &mut cache);
    let expected: Vec<u64> = (101..128).map(|b| b << 6).collect();
    assert_eq!(proposed, expected);
}

#[test]
fn degree_limits_proposals_per_access() {
    let cfg = SpatialConfig { pf_degree: 4, ..single_level_config() };
    let mut pf = SpatialPrefetcher::new(cfg).unwrap();
    let mut cache = StubCache::default();
    for block in 100..128 {
        pf.on_access(load(block << 6), &mut cache);
    }
    pf.on_fill(fill_evicting(100 << 6), &mut cache);

    let proposed = pf.on_access(load(132 << 6), &mut cache);
    assert_eq!(proposed.len(), 4);
    // the remainder drains on subsequent accesses in the region
    let proposed = pf.on_access(load(133 << 6), &mut cache);
    assert_eq!(proposed.len(), 4);
}

#[test]
fn non_load_accesses_are_ignored() {
    let mut pf = SpatialPrefetcher::new(single_level_config()).unwrap();
    let mut cache = StubCache::default();
    let ev = AccessEvent { pc: PC, addr: 100 << 6, cache_hit: false, kind: AccessType::Rfo };
    assert!(pf.on_access(ev, &mut cache).is_empty());
    assert_eq!(pf.ft[0].len(), 0);
}

#[test]
fn vote_grades_by_agreement_fraction() {
    let cfg = SpatialConfig {
        vote_high_thresh: 0.75,
        vote_low_thresh: 0.40,
        ..two_level_config()
    };
    let pf = SpatialPrefetcher::new(cfg).unwrap();
    let voters = vec![
        BitPattern::with_bits(4, &[0, 1]),
        BitPattern::with_bits(4, &[0, 2]),
    ];
    let fills = pf.vote(&voters).unwrap();
    assert_eq!(fills.get(0), FillLevel::L2); // 2/2 voters
    assert_eq!(fills.get(1), FillLevel::Llc); // 1/2 voters
    assert_eq!(fills.get(2), FillLevel::Llc);
    assert_eq!(fills.get(3), FillLevel::None);

    // below every threshold: no prediction at all
    let sparse = vec![
        BitPattern::with_bits(4, &[1]),
        BitPattern::zeroed(4),
        BitPattern::zeroed(4),
    ];
    assert!(pf.vote(&sparse).is_none());
}
