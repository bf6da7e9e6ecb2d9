use alloc::collections::BTreeMap;

// CONSTANTS
// ================================================================================================

/// Saturation point of the 2-bit confidence counter.
pub(super) const CONFIDENCE_MAX: u8 = 3;

/// Confidence given to a binding created on a diverging stream, low enough that one more
/// contradiction invalidates it.
pub(super) const CONFIDENCE_TENTATIVE: u8 = 1;

// STRUCTURAL TRANSLATOR
// ================================================================================================

#[derive(Debug, Clone, Copy)]
struct PhysToStructural {
    structural: u32,
    confidence: u8,
}

/// Bidirectional physical ↔ structural address map with per-binding confidence.
///
/// Invariant: the two directions always agree; `phys -> s` is present exactly when `s -> phys`
/// is. Every mutation goes through [`StructuralTranslator::bind`] and
/// [`StructuralTranslator::invalidate`], which maintain both sides together.
#[derive(Debug, Default)]
pub(super) struct StructuralTranslator {
    ps: BTreeMap<u64, PhysToStructural>,
    sp: BTreeMap<u32, u64>,
}

impl StructuralTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Structural address currently assigned to a physical address.
    pub fn structural_of(&self, phys: u64) -> Option<u32> {
        self.ps.get(&phys).map(|entry| entry.structural)
    }

    /// Physical address currently bound to a structural address.
    pub fn physical_of(&self, structural: u32) -> Option<u64> {
        self.sp.get(&structural).copied()
    }

    pub fn confidence_of(&self, phys: u64) -> Option<u8> {
        self.ps.get(&phys).map(|entry| entry.confidence)
    }

    /// Binds `phys ↔ structural` with the given starting confidence, displacing any stale
    /// binding either address was part of.
    pub fn bind(&mut self, phys: u64, structural: u32, confidence: u8) {
        if let Some(old) = self.ps.insert(phys, PhysToStructural { structural, confidence }) {
            self.sp.remove(&old.structural);
        }
        if let Some(old_phys) = self.sp.insert(structural, phys)
            && old_phys != phys
        {
            self.ps.remove(&old_phys);
        }
    }

    /// Removes both directions of a binding.
    pub fn invalidate(&mut self, phys: u64, structural: u32) {
        debug_assert_eq!(self.structural_of(phys), Some(structural));
        self.ps.remove(&phys);
        self.sp.remove(&structural);
    }

    /// Bumps the binding's confidence, saturating at the maximum. Returns the new value, or 0 if
    /// the binding does not exist (which the training algorithm treats as already-dead).
    pub fn raise_confidence(&mut self, phys: u64) -> u8 {
        debug_assert!(self.ps.contains_key(&phys));
        match self.ps.get_mut(&phys) {
            Some(entry) => {
                entry.confidence = (entry.confidence + 1).min(CONFIDENCE_MAX);
                entry.confidence
            },
            None => 0,
        }
    }

    /// Drops the binding's confidence, saturating at zero. Returns the new value, or 0 if the
    /// binding does not exist.
    pub fn lower_confidence(&mut self, phys: u64) -> u8 {
        debug_assert!(self.ps.contains_key(&phys));
        match self.ps.get_mut(&phys) {
            Some(entry) => {
                entry.confidence = entry.confidence.saturating_sub(1);
                entry.confidence
            },
            None => 0,
        }
    }

    #[cfg(test)]
    pub fn bindings(&self) -> impl Iterator<Item = (u64, u32)> + '_ {
        self.ps.iter().map(|(&phys, entry)| (phys, entry.structural))
    }
}

// TESTS
// ================================================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn bind_and_lookup_both_directions() {
        let mut tr = StructuralTranslator::new();
        tr.bind(0x100, 7, CONFIDENCE_MAX);
        assert_eq!(tr.structural_of(0x100), Some(7));
        assert_eq!(tr.physical_of(7), Some(0x100));
    }

    #[test]
    fn rebinding_a_structural_slot_unbinds_the_old_phys() {
        let mut tr = StructuralTranslator::new();
        tr.bind(0x100, 7, CONFIDENCE_MAX);
        tr.bind(0x200, 7, CONFIDENCE_MAX);
        assert_eq!(tr.structural_of(0x100), None);
        assert_eq!(tr.physical_of(7), Some(0x200));
    }

    #[test]
    fn rebinding_a_phys_unbinds_its_old_slot() {
        let mut tr = StructuralTranslator::new();
        tr.bind(0x100, 7, CONFIDENCE_MAX);
        tr.bind(0x100, 9, CONFIDENCE_MAX);
        assert_eq!(tr.physical_of(7), None);
        assert_eq!(tr.physical_of(9), Some(0x100));
    }

    #[test]
    fn confidence_saturates_both_ways() {
        let mut tr = StructuralTranslator::new();
        tr.bind(0x100, 7, CONFIDENCE_MAX);
        assert_eq!(tr.raise_confidence(0x100), CONFIDENCE_MAX);
        for expected in [2, 1, 0, 0] {
            assert_eq!(tr.lower_confidence(0x100), expected);
        }
    }

    #[test]
    fn invalidate_removes_both_directions() {
        let mut tr = StructuralTranslator::new();
        tr.bind(0x100, 7, CONFIDENCE_MAX);
        tr.invalidate(0x100, 7);
        assert_eq!(tr.structural_of(0x100), None);
        assert_eq!(tr.physical_of(7), None);
    }

    proptest! {
        #[test]
        fn translator_stays_bijective(ops in prop::collection::vec((0u64..16, 0u32..16, any::<bool>()), 1..200)) {
            let mut tr = StructuralTranslator::new();
            for (phys, structural, unbind) in ops {
                if unbind {
                    if let Some(s) = tr.structural_of(phys) {
                        tr.invalidate(phys, s);
                    }
                } else {
                    tr.bind(phys, structural, CONFIDENCE_MAX);
                }
                for (p, s) in tr.bindings() {
                    prop_assert_eq!(tr.physical_of(s), Some(p));
                }
                prop_assert_eq!(tr.ps.len(), tr.sp.len());
            }
        }
    }
}
