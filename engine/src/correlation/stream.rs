use alloc::{collections::BTreeSet, vec::Vec};

use itertools::Itertools;

use super::history::HistoryBuffer;

// ACTIVE STREAMS
// ================================================================================================

#[derive(Debug, Clone)]
struct StreamSlot {
    /// History position of the last address prefetched for this stream.
    pointer: u64,
    /// Prefetched addresses not yet consumed by a demand access.
    pending: BTreeSet<u64>,
    stamp: u64,
}

/// In-flight replay streams, advanced one step whenever an access consumes one of their
/// outstanding prefetches.
#[derive(Debug)]
pub(super) struct ActiveStreamSet {
    slots: Vec<Option<StreamSlot>>,
    clock: u64,
}

impl ActiveStreamSet {
    pub fn new(size: usize) -> Self {
        Self { slots: (0..size).map(|_| None).collect(), clock: 0 }
    }

    /// Starts tracking a stream whose last prefetched address sits at `pointer`, replacing the
    /// least-recently-advanced stream if all slots are busy.
    pub fn create(&mut self, pointer: u64, pending: BTreeSet<u64>) {
        if pending.is_empty() {
            return;
        }
        self.clock += 1;
        let stamp = self.clock;
        let way = self
            .slots
            .iter()
            .position(Option::is_none)
            .unwrap_or_else(|| self.victim_way());
        self.slots[way] = Some(StreamSlot { pointer, pending, stamp });
    }

    /// If `block` is an outstanding prefetch of some stream, advances that stream: the consumed
    /// address leaves the pending set and the next history entry (if still recorded) is emitted
    /// and becomes pending. Returns true exactly when a stream consumed the access.
    pub fn advance(
        &mut self,
        block: u64,
        history: &HistoryBuffer,
        proposed: &mut Vec<u64>,
    ) -> bool {
        self.clock += 1;
        let stamp = self.clock;
        for slot in self.slots.iter_mut().flatten() {
            if slot.pending.remove(&block) {
                slot.pointer += 1;
                if let Some(next) = history.get(slot.pointer) {
                    proposed.push(next);
                    slot.pending.insert(next);
                }
                slot.stamp = stamp;
                return true;
            }
        }
        false
    }

    fn victim_way(&self) -> usize {
        self.slots
            .iter()
            .position_min_by_key(|slot| slot.as_ref().map_or(u64::MAX, |s| s.stamp))
            .unwrap_or(0)
    }
}
