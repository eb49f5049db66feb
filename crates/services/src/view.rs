//! Serializable shapes handed to outer surfaces (CLI output, HTTP handlers).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use roadmap_core::model::{Month, ProgressRecord, Roadmap, RoadmapId, StepKey};
use serde::Serialize;

/// `{completed, percentage, completedCount, totalSteps}` for one user and roadmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub user_id: String,
    pub roadmap_id: RoadmapId,
    pub completed: BTreeMap<StepKey, bool>,
    pub percentage: u8,
    pub completed_count: u32,
    pub total_steps: u32,
    pub stage: &'static str,
}

impl From<&ProgressRecord> for ProgressSnapshot {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            user_id: record.user_id().to_string(),
            roadmap_id: record.roadmap_id(),
            completed: record.completed().clone(),
            percentage: record.percentage(),
            completed_count: record.completed_count(),
            total_steps: record.total_steps(),
            stage: record.stage().as_str(),
        }
    }
}

/// One line of a roadmap listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapSummary {
    pub id: RoadmapId,
    pub title: String,
    pub description: Option<String>,
    pub months: usize,
    pub step_count: u32,
}

impl From<&Roadmap> for RoadmapSummary {
    fn from(roadmap: &Roadmap) -> Self {
        Self {
            id: roadmap.id(),
            title: roadmap.title().to_owned(),
            description: roadmap.description().map(ToOwned::to_owned),
            months: roadmap.months().len(),
            step_count: roadmap.step_count(),
        }
    }
}

/// Full roadmap document including structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoadmapDocument {
    pub id: RoadmapId,
    pub title: String,
    pub description: Option<String>,
    pub months: Vec<Month>,
    pub step_count: u32,
    pub created_at: DateTime<Utc>,
}

impl From<&Roadmap> for RoadmapDocument {
    fn from(roadmap: &Roadmap) -> Self {
        Self {
            id: roadmap.id(),
            title: roadmap.title().to_owned(),
            description: roadmap.description().map(ToOwned::to_owned),
            months: roadmap.months().to_vec(),
            step_count: roadmap.step_count(),
            created_at: roadmap.created_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmap_core::model::{RoadmapDraft, Step, UserId};
    use roadmap_core::time::fixed_now;

    #[test]
    fn snapshot_uses_persisted_field_names() {
        let roadmap = RoadmapDraft {
            title: "Rust".into(),
            description: None,
            months: vec![Month {
                month: "Month 1".into(),
                steps: vec![
                    Step {
                        day: "Day 1".into(),
                        topic: "Ownership".into(),
                        details: vec!["book ch. 4".into()],
                    },
                    Step {
                        day: "Day 2".into(),
                        topic: "Borrowing".into(),
                        details: vec!["book ch. 4.2".into()],
                    },
                ],
            }],
        }
        .validate(fixed_now())
        .unwrap()
        .assign_id(RoadmapId::new(3));

        let mut record = ProgressRecord::new(UserId::new("u1").unwrap(), &roadmap);
        record.toggle(&roadmap, StepKey::at(0, 1), true).unwrap();

        let json = serde_json::to_value(ProgressSnapshot::from(&record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "userId": "u1",
                "roadmapId": 3,
                "completed": { "0-1": true },
                "percentage": 50,
                "completedCount": 1,
                "totalSteps": 2,
                "stage": "in_progress",
            })
        );

        let summary = serde_json::to_value(RoadmapSummary::from(&roadmap)).unwrap();
        assert_eq!(summary["stepCount"], 2);
    }
}
