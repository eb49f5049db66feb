use thiserror::Error;

use crate::model::{IdError, ProgressError, RoadmapError, StepKeyError};

/// Umbrella error for callers that do not care which domain rule failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Roadmap(#[from] RoadmapError),
    #[error(transparent)]
    StepKey(#[from] StepKeyError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
}
