//! Shared error types for the services crate.

use thiserror::Error;

use roadmap_core::model::{ProgressError, RoadmapError, RoadmapId, StepKeyError, UserId};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification callers (HTTP layer, CLI) branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed roadmap, malformed or unknown step key.
    Validation,
    /// A uniqueness rule rejected a create.
    Conflict,
    /// Roadmap or progress record does not exist.
    NotFound,
    /// Infrastructure failure.
    Storage,
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict => ErrorKind::Conflict,
        StorageError::Progress(_) => ErrorKind::Validation,
        _ => ErrorKind::Storage,
    }
}

/// Errors emitted by `RoadmapCatalog`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error(transparent)]
    Roadmap(#[from] RoadmapError),
    #[error("a roadmap titled {title:?} already exists")]
    DuplicateTitle { title: String },
    #[error("roadmap {0} not found")]
    NotFound(RoadmapId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CatalogError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Roadmap(_) => ErrorKind::Validation,
            Self::DuplicateTitle { .. } => ErrorKind::Conflict,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    StepKey(#[from] StepKeyError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error("roadmap {0} not found")]
    RoadmapNotFound(RoadmapId),
    #[error("no progress recorded for user {user_id} on roadmap {roadmap_id}")]
    ProgressNotFound {
        user_id: UserId,
        roadmap_id: RoadmapId,
    },
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ProgressServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Progress(inner) => Self::Progress(inner),
            other => Self::Storage(other),
        }
    }
}

impl ProgressServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StepKey(_) | Self::Progress(_) => ErrorKind::Validation,
            Self::RoadmapNotFound(_) | Self::ProgressNotFound { .. } => ErrorKind::NotFound,
            Self::Storage(err) => storage_kind(err),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use roadmap_core::model::StepKey;

    #[test]
    fn storage_progress_errors_become_validation() {
        let err: ProgressServiceError = StorageError::Progress(ProgressError::UnknownStep {
            roadmap_id: RoadmapId::new(1),
            key: StepKey::at(0, 4),
        })
        .into();
        assert!(matches!(err, ProgressServiceError::Progress(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn storage_conflict_keeps_its_kind() {
        let err: ProgressServiceError = StorageError::Conflict.into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(CatalogError::from(StorageError::Conflict).kind(), ErrorKind::Conflict);
        assert_eq!(
            CatalogError::from(StorageError::Connection("down".into())).kind(),
            ErrorKind::Storage
        );
    }
}
