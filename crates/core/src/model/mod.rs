mod ids;
mod progress;
mod roadmap;

pub use ids::{IdError, RoadmapId, UserId};
pub use progress::{
    ProgressError, ProgressRecord, ProgressStage, Reconciliation, completion_percentage,
};
pub use roadmap::{
    Month, Roadmap, RoadmapDraft, RoadmapError, Step, StepKey, StepKeyError, ValidatedRoadmap,
};
