//! Per-learner completion state for one roadmap.
//!
//! `ProgressRecord` owns the completion map and the statistics derived from
//! it. The map is only ever changed through [`ProgressRecord::toggle`], and
//! every change (including structure reconciliation) ends with a full
//! recount, so `completed_count` and `percentage` cannot drift from the map.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::ids::{RoadmapId, UserId};
use crate::model::roadmap::{Roadmap, StepKey};

/// `round(100 * completed / total)` with halves rounded up; `0` when `total == 0`.
///
/// `completed` is clamped to `total`, so the result never leaves `0..=100`.
#[must_use]
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let total = u64::from(total);
    let completed = u64::from(completed).min(total);
    let rounded = (200 * completed + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}

/// Where a record sits on its way to 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStage {
    NotStarted,
    InProgress,
    Complete,
}

impl ProgressStage {
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0 => Self::NotStarted,
            100.. => Self::Complete,
            _ => Self::InProgress,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }
}

/// What `reconcile` had to fix to line a record up with its roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reconciliation {
    /// `(stored, current)` when the denominator was stale.
    pub total_steps: Option<(u32, u32)>,
    /// Keys that no longer exist in the roadmap structure.
    pub dropped: Vec<StepKey>,
}

impl Reconciliation {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.total_steps.is_none() && self.dropped.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    user_id: UserId,
    roadmap_id: RoadmapId,
    completed: BTreeMap<StepKey, bool>,
    completed_count: u32,
    percentage: u8,
    total_steps: u32,
}

impl ProgressRecord {
    /// Fresh record with an empty completion map, seeded from the roadmap.
    #[must_use]
    pub fn new(user_id: UserId, roadmap: &Roadmap) -> Self {
        Self {
            user_id,
            roadmap_id: roadmap.id(),
            completed: BTreeMap::new(),
            completed_count: 0,
            percentage: 0,
            total_steps: roadmap.step_count(),
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// Derived fields are never read back: they are recounted from
    /// `completed` against the stored `total_steps`. That total may be stale,
    /// so the result is only exact once `reconcile` has run against the
    /// current roadmap; repositories do that before handing records out.
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        roadmap_id: RoadmapId,
        completed: BTreeMap<StepKey, bool>,
        total_steps: u32,
    ) -> Self {
        let mut record = Self {
            user_id,
            roadmap_id,
            completed,
            completed_count: 0,
            percentage: 0,
            total_steps,
        };
        record.recompute();
        record
    }

    /// Set one step's completion and recount everything.
    ///
    /// The record is first reconciled with `roadmap`, so the denominator is
    /// always the roadmap's current step count. Applying the same
    /// `(key, value)` twice leaves the record unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::RoadmapMismatch` if `roadmap` is not the one
    /// this record tracks, and `ProgressError::UnknownStep` if `key` is not
    /// part of its current structure.
    pub fn toggle(
        &mut self,
        roadmap: &Roadmap,
        key: StepKey,
        value: bool,
    ) -> Result<Reconciliation, ProgressError> {
        self.ensure_same_roadmap(roadmap)?;
        if !roadmap.contains_step(key) {
            return Err(ProgressError::UnknownStep {
                roadmap_id: roadmap.id(),
                key,
            });
        }
        let fixed = self.sync_structure(roadmap);
        self.completed.insert(key, value);
        self.recompute();
        Ok(fixed)
    }

    /// Line the record up with the roadmap's current structure and recount.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::RoadmapMismatch` if `roadmap` is not the one
    /// this record tracks.
    pub fn reconcile(&mut self, roadmap: &Roadmap) -> Result<Reconciliation, ProgressError> {
        self.ensure_same_roadmap(roadmap)?;
        let fixed = self.sync_structure(roadmap);
        self.recompute();
        Ok(fixed)
    }

    fn ensure_same_roadmap(&self, roadmap: &Roadmap) -> Result<(), ProgressError> {
        if roadmap.id() == self.roadmap_id {
            Ok(())
        } else {
            Err(ProgressError::RoadmapMismatch {
                expected: self.roadmap_id,
                actual: roadmap.id(),
            })
        }
    }

    fn sync_structure(&mut self, roadmap: &Roadmap) -> Reconciliation {
        let mut fixed = Reconciliation::default();

        let current = roadmap.step_count();
        if current != self.total_steps {
            fixed.total_steps = Some((self.total_steps, current));
            self.total_steps = current;
        }

        self.completed.retain(|key, _| {
            let keep = roadmap.contains_step(*key);
            if !keep {
                fixed.dropped.push(*key);
            }
            keep
        });

        fixed
    }

    fn recompute(&mut self) {
        let count = self.completed.values().filter(|done| **done).count();
        self.completed_count = u32::try_from(count).unwrap_or(u32::MAX);
        self.percentage = completion_percentage(self.completed_count, self.total_steps);
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn roadmap_id(&self) -> RoadmapId {
        self.roadmap_id
    }

    #[must_use]
    pub fn completed(&self) -> &BTreeMap<StepKey, bool> {
        &self.completed
    }

    #[must_use]
    pub fn is_completed(&self, key: StepKey) -> bool {
        self.completed.get(&key).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn completed_count(&self) -> u32 {
        self.completed_count
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    #[must_use]
    pub fn total_steps(&self) -> u32 {
        self.total_steps
    }

    #[must_use]
    pub fn stage(&self) -> ProgressStage {
        ProgressStage::from_percentage(self.percentage)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("step {key} does not exist in roadmap {roadmap_id}")]
    UnknownStep { roadmap_id: RoadmapId, key: StepKey },

    #[error("progress record tracks roadmap {expected}, got roadmap {actual}")]
    RoadmapMismatch {
        expected: RoadmapId,
        actual: RoadmapId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::roadmap::fixtures::{draft, roadmap};
    use proptest::prelude::*;

    fn user() -> UserId {
        UserId::new("learner-1").unwrap()
    }

    fn count_true(record: &ProgressRecord) -> u32 {
        u32::try_from(record.completed().values().filter(|v| **v).count()).unwrap()
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(5, 0), 0);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 8), 13);
        assert_eq!(completion_percentage(1, 200), 1);
        assert_eq!(completion_percentage(10, 10), 100);
        assert_eq!(completion_percentage(11, 10), 100);
    }

    #[test]
    fn new_record_starts_empty() {
        let r = roadmap(&[4, 6]);
        let record = ProgressRecord::new(user(), &r);
        assert_eq!(record.total_steps(), 10);
        assert_eq!(record.completed_count(), 0);
        assert_eq!(record.percentage(), 0);
        assert_eq!(record.stage(), ProgressStage::NotStarted);
    }

    #[test]
    fn three_of_ten_is_thirty_percent_and_fourth_keeps_the_rest() {
        let r = roadmap(&[5, 5]);
        let mut record = ProgressRecord::new(user(), &r);
        for key in [StepKey::at(0, 0), StepKey::at(0, 1), StepKey::at(1, 4)] {
            record.toggle(&r, key, true).unwrap();
        }
        assert_eq!(record.completed_count(), 3);
        assert_eq!(record.percentage(), 30);

        record.toggle(&r, StepKey::at(1, 0), true).unwrap();
        assert_eq!(record.completed_count(), 4);
        assert_eq!(record.percentage(), 40);
        for key in [StepKey::at(0, 0), StepKey::at(0, 1), StepKey::at(1, 4)] {
            assert!(record.is_completed(key));
        }
    }

    #[test]
    fn toggle_is_idempotent() {
        let r = roadmap(&[3]);
        let mut record = ProgressRecord::new(user(), &r);
        record.toggle(&r, StepKey::at(0, 2), true).unwrap();
        let once = record.clone();
        record.toggle(&r, StepKey::at(0, 2), true).unwrap();
        assert_eq!(record, once);
    }

    #[test]
    fn stage_moves_both_ways() {
        let r = roadmap(&[2]);
        let mut record = ProgressRecord::new(user(), &r);
        record.toggle(&r, StepKey::at(0, 0), true).unwrap();
        assert_eq!(record.stage(), ProgressStage::InProgress);
        record.toggle(&r, StepKey::at(0, 1), true).unwrap();
        assert_eq!(record.stage(), ProgressStage::Complete);
        record.toggle(&r, StepKey::at(0, 0), false).unwrap();
        assert_eq!(record.stage(), ProgressStage::InProgress);
    }

    #[test]
    fn toggle_rejects_unknown_step() {
        let r = roadmap(&[2]);
        let mut record = ProgressRecord::new(user(), &r);
        let err = record.toggle(&r, StepKey::at(0, 2), true).unwrap_err();
        assert_eq!(
            err,
            ProgressError::UnknownStep {
                roadmap_id: r.id(),
                key: StepKey::at(0, 2)
            }
        );
        assert!(record.completed().is_empty());
    }

    #[test]
    fn toggle_rejects_other_roadmap() {
        let r = roadmap(&[2]);
        let other = draft("Other", &[2])
            .validate(crate::time::fixed_now())
            .unwrap()
            .assign_id(RoadmapId::new(2));
        let mut record = ProgressRecord::new(user(), &r);
        assert!(matches!(
            record.toggle(&other, StepKey::at(0, 0), true),
            Err(ProgressError::RoadmapMismatch { .. })
        ));
    }

    #[test]
    fn rehydration_recounts_stale_derived_fields() {
        let mut completed = BTreeMap::new();
        completed.insert(StepKey::at(0, 0), true);
        completed.insert(StepKey::at(0, 1), true);
        completed.insert(StepKey::at(0, 2), false);
        let record = ProgressRecord::from_persisted(user(), RoadmapId::new(1), completed, 4);
        assert_eq!(record.completed_count(), 2);
        assert_eq!(record.percentage(), 50);
    }

    #[test]
    fn undersized_stored_total_is_exact_after_reconcile() {
        let current = roadmap(&[4]);
        let completed = (0..3).map(|s| (StepKey::at(0, s), true)).collect();
        let mut record = ProgressRecord::from_persisted(user(), current.id(), completed, 2);
        assert_eq!(record.percentage(), 100);

        record.reconcile(&current).unwrap();
        assert_eq!(record.total_steps(), 4);
        assert_eq!(record.completed_count(), 3);
        assert_eq!(record.percentage(), 75);
    }

    #[test]
    fn toggle_refreshes_stale_denominator() {
        let before = roadmap(&[4]);
        let mut record = ProgressRecord::new(user(), &before);
        record.toggle(&before, StepKey::at(0, 0), true).unwrap();
        assert_eq!(record.percentage(), 25);

        let after = before.revise(draft("Rust", &[4, 4])).unwrap();
        let fixed = record.toggle(&after, StepKey::at(1, 0), true).unwrap();
        assert_eq!(fixed.total_steps, Some((4, 8)));
        assert_eq!(record.total_steps(), 8);
        assert_eq!(record.percentage(), 25);
    }

    #[test]
    fn reconcile_drops_vanished_steps() {
        let before = roadmap(&[2, 2]);
        let mut record = ProgressRecord::new(user(), &before);
        record.toggle(&before, StepKey::at(0, 0), true).unwrap();
        record.toggle(&before, StepKey::at(1, 1), true).unwrap();

        let after = before.revise(draft("Rust", &[2])).unwrap();
        let fixed = record.reconcile(&after).unwrap();
        assert_eq!(fixed.dropped, vec![StepKey::at(1, 1)]);
        assert_eq!(record.completed_count(), 1);
        assert_eq!(record.total_steps(), 2);
        assert_eq!(record.percentage(), 50);

        assert!(record.reconcile(&after).unwrap().is_clean());
    }

    fn toggles() -> impl Strategy<Value = Vec<(usize, usize, bool)>> {
        proptest::collection::vec((0..4usize, 0..6usize, any::<bool>()), 0..40)
    }

    proptest! {
        #[test]
        fn derived_fields_always_match_the_map(
            shape in proptest::collection::vec(0..6usize, 1..4),
            ops in toggles(),
        ) {
            let r = roadmap(&shape);
            let mut record = ProgressRecord::new(user(), &r);
            for (m, s, value) in ops {
                let key = StepKey::at(m, s);
                let result = record.toggle(&r, key, value);
                prop_assert_eq!(result.is_ok(), r.contains_step(key));

                prop_assert_eq!(record.completed_count(), count_true(&record));
                prop_assert!(record.percentage() <= 100);
                if record.total_steps() == 0 {
                    prop_assert_eq!(record.percentage(), 0);
                } else {
                    let exact = 100.0 * f64::from(record.completed_count())
                        / f64::from(record.total_steps());
                    prop_assert_eq!(f64::from(record.percentage()), (exact + 0.5).floor());
                }
            }
        }

        #[test]
        fn true_then_false_restores_statistics(
            shape in proptest::collection::vec(1..6usize, 1..4),
            ops in toggles(),
            pick in any::<proptest::sample::Index>(),
        ) {
            let r = roadmap(&shape);
            let mut record = ProgressRecord::new(user(), &r);
            for (m, s, value) in ops {
                let _ = record.toggle(&r, StepKey::at(m, s), value);
            }
            let keys: Vec<StepKey> = r.step_keys().collect();
            let key = keys[pick.index(keys.len())];
            record.toggle(&r, key, false).unwrap();
            let (count, pct) = (record.completed_count(), record.percentage());

            record.toggle(&r, key, true).unwrap();
            record.toggle(&r, key, false).unwrap();
            prop_assert_eq!(record.completed_count(), count);
            prop_assert_eq!(record.percentage(), pct);
        }
    }
}
