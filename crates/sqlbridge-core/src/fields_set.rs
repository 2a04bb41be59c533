//! Compact set of field indices.
//!
//! Used to report which fields of a tracked record differ from its
//! baseline, and by the write builder to restrict an UPDATE to those fields.

/// A bitset over field indices `0..len`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldsSet {
    len: usize,
    bits: Box<[u64]>,
}

impl FieldsSet {
    /// Create an empty set for `len` fields.
    #[must_use]
    pub fn empty(len: usize) -> Self {
        Self {
            len,
            bits: vec![0u64; len.div_ceil(64)].into_boxed_slice(),
        }
    }

    /// Create a set containing every index below `len`.
    #[must_use]
    pub fn all(len: usize) -> Self {
        let mut s = Self::empty(len);
        for idx in 0..len {
            s.insert(idx);
        }
        s
    }

    /// Number of fields the set ranges over.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.len
    }

    /// Number of indices in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if no index is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Add an index. Indices outside `0..capacity` are ignored.
    pub fn insert(&mut self, idx: usize) {
        if idx >= self.len {
            return;
        }
        if let Some(w) = self.bits.get_mut(idx / 64) {
            *w |= 1u64 << (idx % 64);
        }
    }

    /// Check whether an index is in the set.
    #[must_use]
    pub fn contains(&self, idx: usize) -> bool {
        idx < self.len
            && self
                .bits
                .get(idx / 64)
                .is_some_and(|w| (w & (1u64 << (idx % 64))) != 0)
    }

    /// Indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).filter(|idx| self.contains(*idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut set = FieldsSet::empty(70);
        assert!(set.is_empty());
        set.insert(3);
        set.insert(65);
        set.insert(70);
        assert!(set.contains(3));
        assert!(set.contains(65));
        assert!(!set.contains(70));
        assert_eq!(set.count(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 65]);
    }

    #[test]
    fn test_all() {
        let set = FieldsSet::all(5);
        assert_eq!(set.capacity(), 5);
        assert_eq!(set.count(), 5);
        assert!(FieldsSet::all(0).is_empty());
    }
}
