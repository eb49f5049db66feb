use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::RoadmapId;

//
// ─── STEP KEY ──────────────────────────────────────────────────────────────────
//

/// Positional identifier of one step: `"{month_index}-{step_index}"`, zero-based.
///
/// Only the canonical decimal form is accepted, so two spellings of the same
/// position (`"1-2"` and `"01-2"`) can never coexist in a completion map.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepKey {
    month: usize,
    step: usize,
}

impl StepKey {
    #[must_use]
    pub fn at(month: usize, step: usize) -> Self {
        Self { month, step }
    }

    /// Parse a client-supplied key.
    ///
    /// # Errors
    ///
    /// Returns `StepKeyError::Malformed` unless the input is exactly two
    /// canonical non-negative integers separated by `-`.
    pub fn parse(raw: &str) -> Result<Self, StepKeyError> {
        let malformed = || StepKeyError::Malformed(raw.to_string());
        let (month, step) = raw.split_once('-').ok_or_else(malformed)?;
        let month = parse_index(month).ok_or_else(malformed)?;
        let step = parse_index(step).ok_or_else(malformed)?;
        Ok(Self { month, step })
    }

    #[must_use]
    pub fn month(&self) -> usize {
        self.month
    }

    #[must_use]
    pub fn step(&self) -> usize {
        self.step
    }
}

fn parse_index(part: &str) -> Option<usize> {
    let canonical = part == "0" || (!part.starts_with('0') && !part.is_empty());
    if !canonical || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

impl fmt::Display for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.month, self.step)
    }
}

impl fmt::Debug for StepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepKey({self})")
    }
}

impl FromStr for StepKey {
    type Err = StepKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for StepKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StepKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepKeyError {
    #[error("malformed step key {0:?}, expected \"<month>-<step>\"")]
    Malformed(String),
}

//
// ─── STRUCTURE ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub day: String,
    pub topic: String,
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Month {
    pub month: String,
    pub steps: Vec<Step>,
}

//
// ─── DRAFT / VALIDATION ────────────────────────────────────────────────────────
//

/// Roadmap document as produced by the authoring surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub months: Vec<Month>,
}

impl RoadmapDraft {
    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `RoadmapError::EmptyTitle` if the title is blank,
    /// `RoadmapError::NoMonths` if there are no months, and
    /// `RoadmapError::EmptyDetails` for the first step without details.
    pub fn validate(self, now: DateTime<Utc>) -> Result<ValidatedRoadmap, RoadmapError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(RoadmapError::EmptyTitle);
        }
        if self.months.is_empty() {
            return Err(RoadmapError::NoMonths);
        }
        for (m, month) in self.months.iter().enumerate() {
            for (s, step) in month.steps.iter().enumerate() {
                if step.details.is_empty() {
                    return Err(RoadmapError::EmptyDetails {
                        key: StepKey::at(m, s),
                    });
                }
            }
        }

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(ValidatedRoadmap {
            title,
            description,
            months: self.months,
            created_at: now,
        })
    }
}

/// A roadmap that passed validation but has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRoadmap {
    pub title: String,
    pub description: Option<String>,
    pub months: Vec<Month>,
    pub created_at: DateTime<Utc>,
}

impl ValidatedRoadmap {
    #[must_use]
    pub fn assign_id(self, id: RoadmapId) -> Roadmap {
        Roadmap {
            id,
            title: self.title,
            description: self.description,
            months: self.months,
            created_at: self.created_at,
        }
    }
}

//
// ─── ROADMAP ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roadmap {
    id: RoadmapId,
    title: String,
    description: Option<String>,
    months: Vec<Month>,
    created_at: DateTime<Utc>,
}

impl Roadmap {
    /// Rehydrate a roadmap from persisted storage, re-checking its invariants.
    ///
    /// # Errors
    ///
    /// Returns `RoadmapError` if the stored structure is no longer valid.
    pub fn from_persisted(
        id: RoadmapId,
        title: String,
        description: Option<String>,
        months: Vec<Month>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, RoadmapError> {
        let draft = RoadmapDraft {
            title,
            description,
            months,
        };
        Ok(draft.validate(created_at)?.assign_id(id))
    }

    /// Replace title, description and structure, keeping id and creation time.
    ///
    /// # Errors
    ///
    /// Returns `RoadmapError` if the draft fails validation.
    pub fn revise(&self, draft: RoadmapDraft) -> Result<Self, RoadmapError> {
        Ok(draft.validate(self.created_at)?.assign_id(self.id))
    }

    #[must_use]
    pub fn id(&self) -> RoadmapId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn months(&self) -> &[Month] {
        &self.months
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Authoritative number of steps in the current structure.
    #[must_use]
    pub fn step_count(&self) -> u32 {
        let total: usize = self.months.iter().map(|m| m.steps.len()).sum();
        u32::try_from(total).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn step(&self, key: StepKey) -> Option<&Step> {
        self.months.get(key.month)?.steps.get(key.step)
    }

    #[must_use]
    pub fn contains_step(&self, key: StepKey) -> bool {
        self.step(key).is_some()
    }

    /// Every step key of the current structure, in curriculum order.
    pub fn step_keys(&self) -> impl Iterator<Item = StepKey> + '_ {
        self.months
            .iter()
            .enumerate()
            .flat_map(|(m, month)| (0..month.steps.len()).map(move |s| StepKey::at(m, s)))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoadmapError {
    #[error("roadmap title cannot be empty")]
    EmptyTitle,
    #[error("roadmap must contain at least one month")]
    NoMonths,
    #[error("step {key} has no details")]
    EmptyDetails { key: StepKey },
}


#[cfg(test)]
mod tests {
    use super::fixtures::{draft, roadmap};
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn step_key_round_trips_canonical_form() {
        let key = StepKey::parse("3-12").unwrap();
        assert_eq!(key, StepKey::at(3, 12));
        assert_eq!(key.to_string(), "3-12");
        assert_eq!(StepKey::parse("0-0").unwrap(), StepKey::at(0, 0));
    }

    #[test]
    fn step_key_rejects_non_canonical_input() {
        for raw in ["", "1", "1-", "-1", "01-2", "1-02", "a-b", "1-2-3", "+1-2", " 1-2"] {
            assert!(StepKey::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn step_key_serializes_as_string() {
        let json = serde_json::to_string(&StepKey::at(1, 4)).unwrap();
        assert_eq!(json, "\"1-4\"");
        assert!(serde_json::from_str::<StepKey>("\"x\"").is_err());
    }

    #[test]
    fn validate_trims_title_and_blank_description() {
        let mut d = draft("  Backend  ", &[2]);
        d.description = Some("   ".into());
        let v = d.validate(fixed_now()).unwrap();
        assert_eq!(v.title, "Backend");
        assert_eq!(v.description, None);
    }

    #[test]
    fn validate_rejects_empty_structure() {
        assert_eq!(
            draft("Rust", &[]).validate(fixed_now()).unwrap_err(),
            RoadmapError::NoMonths
        );
        assert_eq!(
            draft(" ", &[1]).validate(fixed_now()).unwrap_err(),
            RoadmapError::EmptyTitle
        );
    }

    #[test]
    fn validate_rejects_step_without_details() {
        let mut d = draft("Rust", &[1, 2]);
        d.months[1].steps[1].details.clear();
        assert_eq!(
            d.validate(fixed_now()).unwrap_err(),
            RoadmapError::EmptyDetails {
                key: StepKey::at(1, 1)
            }
        );
    }

    #[test]
    fn step_count_spans_all_months() {
        let r = roadmap(&[3, 0, 4]);
        assert_eq!(r.step_count(), 7);
        assert_eq!(r.step_keys().count(), 7);
        assert!(r.contains_step(StepKey::at(2, 3)));
        assert!(!r.contains_step(StepKey::at(1, 0)));
        assert!(!r.contains_step(StepKey::at(3, 0)));
    }

    #[test]
    fn revise_keeps_identity() {
        let r = roadmap(&[2]);
        let revised = r.revise(draft("Rust 2", &[2, 2])).unwrap();
        assert_eq!(revised.id(), r.id());
        assert_eq!(revised.created_at(), r.created_at());
        assert_eq!(revised.title(), "Rust 2");
        assert_eq!(revised.step_count(), 4);
    }
}
