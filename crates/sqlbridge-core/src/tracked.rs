//! Records paired with the baseline they were loaded from.

use std::ops::{Deref, DerefMut};

use crate::fields_set::FieldsSet;
use crate::model::Model;

/// A record together with a snapshot of its last persisted state.
///
/// Baseline-diff updates compare the current record against this snapshot.
/// Call [`Tracked::mark_persisted`] after a successful write so the next
/// diff starts from the new state.
#[derive(Debug, Clone)]
pub struct Tracked<M: Model + Clone> {
    current: M,
    baseline: M,
}

impl<M: Model + Clone> Tracked<M> {
    /// Track `record`, using its present state as the baseline.
    pub fn new(record: M) -> Self {
        Self {
            baseline: record.clone(),
            current: record,
        }
    }

    /// Track `current` against an explicitly supplied baseline.
    pub fn with_baseline(current: M, baseline: M) -> Self {
        Self { current, baseline }
    }

    /// Baseline snapshot.
    pub fn baseline(&self) -> &M {
        &self.baseline
    }

    /// Fields whose current value differs from the baseline.
    pub fn changed_fields(&self) -> FieldsSet {
        let fields = M::fields();
        let mut changed = FieldsSet::empty(fields.len());
        for idx in 0..fields.len() {
            if self.current.get_field(idx) != self.baseline.get_field(idx) {
                changed.insert(idx);
            }
        }
        changed
    }

    /// True if any field differs from the baseline.
    pub fn is_dirty(&self) -> bool {
        !self.changed_fields().is_empty()
    }

    /// Take the current state as the new baseline.
    pub fn mark_persisted(&mut self) {
        self.baseline = self.current.clone();
    }

    /// Stop tracking and return the record.
    pub fn into_inner(self) -> M {
        self.current
    }
}

impl<M: Model + Clone> Deref for Tracked<M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.current
    }
}

impl<M: Model + Clone> DerefMut for Tracked<M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.current
    }
}
