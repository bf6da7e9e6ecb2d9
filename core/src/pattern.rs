use core::ops::Range;

use smallvec::SmallVec;

use crate::FillLevel;

// PATTERN
// ================================================================================================

/// A fixed-length per-offset vector describing one spatial region.
///
/// Two instantiations are used throughout the suite:
///
/// - [`BitPattern`] records which offsets of a region have been observed (accumulation) or are
///   predicted (pattern history).
/// - [`FillPattern`] carries a [`FillLevel`] per offset and is what ultimately drives prefetch
///   issue.
///
/// The length of a pattern always equals the region size (in blocks) of the level it belongs to,
/// which is bounded by the largest configured region; patterns therefore live inline and are
/// cheap to copy around.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern<T>(SmallVec<[T; 64]>);

/// Observed/predicted footprint of a region: one bit per block offset.
pub type BitPattern = Pattern<bool>;

/// Prefetch decision for a region: one fill level per block offset.
pub type FillPattern = Pattern<FillLevel>;

impl<T: Copy + Default + PartialEq> Pattern<T> {
    /// Returns an all-default pattern of the given length.
    pub fn zeroed(len: usize) -> Self {
        Self(smallvec::smallvec![T::default(); len])
    }

    /// Returns an empty (zero-length) pattern, the "no prediction" sentinel.
    pub fn empty() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_slice(values: &[T]) -> Self {
        Self(SmallVec::from_slice(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline(always)]
    pub fn get(&self, offset: usize) -> T {
        self.0[offset]
    }

    #[inline(always)]
    pub fn set(&mut self, offset: usize, value: T) {
        self.0[offset] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.0.iter().copied()
    }

    /// Rotates the pattern towards lower offsets: element `i` of the result is element
    /// `(i + n) mod len` of the input.
    ///
    /// Rotating an observed pattern left by its trigger offset produces the canonical,
    /// trigger-relative form stored in the pattern history table.
    pub fn rotate_left(&self, n: usize) -> Self {
        if self.is_empty() {
            return Self::empty();
        }
        let len = self.len();
        let n = n % len;
        Self((0..len).map(|i| self.0[(i + n) % len]).collect())
    }

    /// Rotates the pattern towards higher offsets; the inverse of [`Pattern::rotate_left`].
    ///
    /// Rotating a canonical pattern right by a live offset re-anchors the prediction at that
    /// offset.
    pub fn rotate_right(&self, n: usize) -> Self {
        if self.is_empty() {
            return Self::empty();
        }
        let len = self.len();
        let n = n % len;
        Self((0..len).map(|i| self.0[(i + len - n) % len]).collect())
    }

    /// Concatenates two sibling patterns into the pattern of their parent region, lower child
    /// first.
    pub fn concat(&self, upper: &Self) -> Self {
        let mut out = self.0.clone();
        out.extend_from_slice(&upper.0);
        Self(out)
    }

    /// Returns a copy of the sub-range as a standalone pattern.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self(SmallVec::from_slice(&self.0[range]))
    }

    /// Returns true if every element in the range is the default value.
    pub fn is_zero_in(&self, range: Range<usize>) -> bool {
        self.0[range].iter().all(|v| *v == T::default())
    }

    /// Returns true if any element anywhere is non-default.
    pub fn any_set(&self) -> bool {
        self.0.iter().any(|v| *v != T::default())
    }
}

impl<T: Copy + Default + PartialEq> FromIterator<T> for Pattern<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// BIT PATTERN OPERATIONS
// ================================================================================================

impl BitPattern {
    /// Builds a pattern of the given length with exactly the listed offsets set.
    pub fn with_bits(len: usize, bits: &[usize]) -> Self {
        let mut p = Self::zeroed(len);
        for &b in bits {
            p.set(b, true);
        }
        p
    }

    /// Number of set offsets.
    pub fn count_set(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    /// Element-wise OR over the given range; the result has the length of the range.
    pub fn or_in(&self, other: &Self, range: Range<usize>) -> Self {
        range.map(|i| self.get(i) || other.get(i)).collect()
    }

    /// Counts the offsets in the range on which the two patterns agree (both set or both clear).
    ///
    /// This is the metric behind both the OR-merge policy and the accuracy-driven level-down
    /// policy: a retired footprint is compared against the pattern that was predicted for it.
    pub fn agreement_in(&self, other: &Self, range: Range<usize>) -> usize {
        range.filter(|&i| self.get(i) == other.get(i)).count()
    }

    /// Returns true if the agreement over `range` meets `thresh` as a fraction of the range.
    pub fn agrees_in(&self, other: &Self, range: Range<usize>, thresh: f32) -> bool {
        let len = range.len();
        self.agreement_in(other, range) as f32 >= len as f32 * thresh
    }
}

// FILL PATTERN OPERATIONS
// ================================================================================================

impl FillPattern {
    /// Reduces the fill pattern to the set of offsets that will be fetched at any level.
    pub fn to_bits(&self) -> BitPattern {
        self.iter().map(|f| f.is_fetch()).collect()
    }

    /// Merges `incoming` into `self`, offset by offset; a non-`None` incoming level always
    /// replaces whatever was there.
    pub fn absorb(&mut self, incoming: &FillPattern) {
        debug_assert_eq!(self.len(), incoming.len());
        for i in 0..self.len().min(incoming.len()) {
            if incoming.get(i).is_fetch() {
                self.set(i, incoming.get(i));
            }
        }
    }
}

// DISPLAY
// ================================================================================================

impl core::fmt::Display for BitPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for b in self.iter() {
            f.write_str(if b { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl core::fmt::Display for FillPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for level in self.iter() {
            write!(f, "{}", level as u8)?;
        }
        Ok(())
    }
}

// TESTS
// ================================================================================================
