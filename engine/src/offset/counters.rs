use alloc::vec::Vec;

use prefetch_core::{BitPattern, FillLevel, FillPattern};

// COUNTER TABLE
// ================================================================================================

/// A direct-mapped table of saturating counter rows, one counter per region offset.
///
/// Row 0's counter (the canonical trigger position) counts how many footprints have been merged
/// into the row and serves as the denominator when extracting; when it reaches the saturation
/// point the whole row is halved, so stale history decays instead of pinning the prediction.
#[derive(Debug)]
pub(super) struct CounterTable {
    rows: Vec<Vec<u32>>,
    counter_max: u32,
}

impl CounterTable {
    /// A square table: `rows` rows of `rows` counters.
    pub fn new(rows: usize, counter_max: u32) -> Self {
        Self { rows: vec![vec![0; rows]; rows], counter_max }
    }

    /// Folds one canonical footprint into the row selected by `key`.
    pub fn merge(&mut self, key: u64, pattern: &BitPattern) {
        let idx = (key % self.rows.len() as u64) as usize;
        let row = &mut self.rows[idx];
        debug_assert_eq!(pattern.len(), row.len());
        for (counter, bit) in row.iter_mut().zip(pattern.iter()) {
            if bit {
                *counter += 1;
            }
        }
        if row[0] == self.counter_max {
            for counter in row.iter_mut() {
                *counter /= 2;
            }
        }
    }

    /// Grades the row selected by `key` against the trigger counter, or `None` if the row has
    /// never been trained.
    ///
    /// Offset 0 is the trigger itself and is never graded.
    pub fn extract(&self, key: u64, hi_thresh: f32, lo_thresh: f32) -> Option<FillPattern> {
        let row = &self.rows[(key % self.rows.len() as u64) as usize];
        let trigger = row[0];
        if trigger == 0 {
            return None;
        }
        let mut graded = FillPattern::zeroed(row.len());
        for (i, &counter) in row.iter().enumerate().skip(1) {
            let level = if counter as f32 >= hi_thresh * trigger as f32 {
                FillLevel::L1
            } else if counter as f32 >= lo_thresh * trigger as f32 {
                FillLevel::L2
            } else {
                FillLevel::None
            };
            graded.set(i, level);
        }
        Some(graded)
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn untrained_rows_extract_nothing() {
        let table = CounterTable::new(4, 8);
        assert!(table.extract(0, 0.6, 0.3).is_none());
    }

    #[test]
    fn grading_compares_against_the_trigger_counter() {
        let mut table = CounterTable::new(4, 100);
        // 4 merges; offset 1 seen 4 times, offset 2 twice, offset 3 once
        table.merge(0, &BitPattern::with_bits(4, &[0, 1, 2]));
        table.merge(0, &BitPattern::with_bits(4, &[0, 1, 2]));
        table.merge(0, &BitPattern::with_bits(4, &[0, 1, 3]));
        table.merge(0, &BitPattern::with_bits(4, &[0, 1]));

        let graded = table.extract(0, 0.75, 0.40).unwrap();
        assert_eq!(graded.get(0), FillLevel::None, "trigger offset is never graded");
        assert_eq!(graded.get(1), FillLevel::L1); // 4/4
        assert_eq!(graded.get(2), FillLevel::L2); // 2/4
        assert_eq!(graded.get(3), FillLevel::None); // 1/4
    }

    #[test]
    fn saturated_rows_decay_by_halving() {
        let mut table = CounterTable::new(4, 2);
        table.merge(0, &BitPattern::with_bits(4, &[0, 1]));
        // second merge saturates the trigger counter and halves the row
        table.merge(0, &BitPattern::with_bits(4, &[0, 3]));
        assert_eq!(table.rows[0], vec![1, 0, 0, 0]);
    }

    #[test]
    fn keys_wrap_into_rows() {
        let mut table = CounterTable::new(4, 100);
        table.merge(6, &BitPattern::with_bits(4, &[0, 1]));
        assert!(table.extract(2, 0.5, 0.5).is_some());
        assert!(table.extract(1, 0.5, 0.5).is_none());
    }
}
