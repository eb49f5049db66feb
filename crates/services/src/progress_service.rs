use std::sync::Arc;

use roadmap_core::model::{ProgressError, ProgressRecord, Roadmap, RoadmapId, StepKey, UserId};
use storage::repository::{ProgressRepository, RoadmapRepository, StepChange, StorageError};

use crate::error::ProgressServiceError;

/// Result of an explicit `start_progress` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// This call created the record.
    Created(ProgressRecord),
    /// Somebody else got there first; this is their record.
    Existing(ProgressRecord),
}

impl StartOutcome {
    #[must_use]
    pub fn record(&self) -> &ProgressRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    #[must_use]
    pub fn into_record(self) -> ProgressRecord {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    #[must_use]
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Orchestrates completion writes and progress reads.
///
/// Every write goes through `ProgressRepository::apply_changes`, which
/// re-reads the roadmap, merges via `ProgressRecord::toggle` and persists
/// atomically. Keys are checked here first against a loaded copy so that a
/// bad batch fails before any write; the repository checks them again
/// against the structure current at write time.
#[derive(Clone)]
pub struct ProgressService {
    roadmaps: Arc<dyn RoadmapRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(roadmaps: Arc<dyn RoadmapRepository>, progress: Arc<dyn ProgressRepository>) -> Self {
        Self { roadmaps, progress }
    }

    /// Mark one step done or not done and return the resulting record.
    ///
    /// Creates the record on first use. Idempotent per `(step_key, done)`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::RoadmapNotFound` for unknown roadmaps,
    /// `ProgressServiceError::StepKey` / `ProgressServiceError::Progress` for
    /// malformed or unknown keys, and `ProgressServiceError::Storage` if
    /// persistence fails.
    #[tracing::instrument(skip(self))]
    pub async fn set_completion(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
        step_key: &str,
        done: bool,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        self.set_completions(user_id, roadmap_id, &[(step_key, done)])
            .await
    }

    /// Apply several completion changes in one atomic write.
    ///
    /// All keys are validated before anything is written; one bad key
    /// rejects the whole batch.
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_completion`].
    #[tracing::instrument(skip(self, changes), fields(changes = changes.len()))]
    pub async fn set_completions(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
        changes: &[(&str, bool)],
    ) -> Result<ProgressRecord, ProgressServiceError> {
        let roadmap = self.load_roadmap(roadmap_id).await?;
        let parsed = changes
            .iter()
            .map(|(raw, done)| -> Result<StepChange, ProgressServiceError> {
                Ok(StepChange::new(step_in(&roadmap, raw)?, *done))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let record = self
            .progress
            .apply_changes(user_id, roadmap_id, &parsed)
            .await
            .map_err(|err| not_found_as_roadmap(err, roadmap_id))?;
        tracing::debug!(
            completed = record.completed_count(),
            total = record.total_steps(),
            percentage = record.percentage(),
            "completion recorded"
        );
        Ok(record)
    }

    /// Read the record for a user and roadmap.
    ///
    /// The repository reconciles the returned statistics against the
    /// roadmap's current structure; the stored row is left as is until the
    /// next write.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::RoadmapNotFound` or
    /// `ProgressServiceError::ProgressNotFound` if either is missing.
    #[tracing::instrument(skip(self))]
    pub async fn get_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        if let Some(record) = self.progress.get_progress(user_id, roadmap_id).await? {
            return Ok(record);
        }
        self.load_roadmap(roadmap_id).await?;
        Err(ProgressServiceError::ProgressNotFound {
            user_id: user_id.clone(),
            roadmap_id,
        })
    }

    /// Explicitly create an empty record for a user and roadmap.
    ///
    /// A create that collides with an existing record is recovered here by
    /// merging into the existing one, so concurrent callers all end up with
    /// the same single record and exactly one of them sees `Created`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::RoadmapNotFound` for unknown roadmaps,
    /// or `ProgressServiceError::Storage` if both the create and the merge fail.
    #[tracing::instrument(skip(self))]
    pub async fn start_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<StartOutcome, ProgressServiceError> {
        match self.progress.insert_progress(user_id, roadmap_id).await {
            Ok(record) => Ok(StartOutcome::Created(record)),
            Err(StorageError::Conflict) => {
                tracing::debug!("progress already exists; merging into it");
                let existing = self
                    .progress
                    .apply_changes(user_id, roadmap_id, &[])
                    .await
                    .map_err(|err| not_found_as_roadmap(err, roadmap_id))?;
                Ok(StartOutcome::Existing(existing))
            }
            Err(other) => Err(not_found_as_roadmap(other, roadmap_id)),
        }
    }

    async fn load_roadmap(&self, roadmap_id: RoadmapId) -> Result<Roadmap, ProgressServiceError> {
        self.roadmaps
            .get_roadmap(roadmap_id)
            .await?
            .ok_or(ProgressServiceError::RoadmapNotFound(roadmap_id))
    }
}

/// Progress writes only report `NotFound` when the roadmap is missing.
fn not_found_as_roadmap(err: StorageError, roadmap_id: RoadmapId) -> ProgressServiceError {
    match err {
        StorageError::NotFound => ProgressServiceError::RoadmapNotFound(roadmap_id),
        other => other.into(),
    }
}

fn step_in(roadmap: &Roadmap, raw: &str) -> Result<StepKey, ProgressServiceError> {
    let key = StepKey::parse(raw)?;
    if !roadmap.contains_step(key) {
        return Err(ProgressError::UnknownStep {
            roadmap_id: roadmap.id(),
            key,
        }
        .into());
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    use roadmap_core::model::{Month, RoadmapDraft, Step};
    use roadmap_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    use crate::error::ErrorKind;

    async fn setup(steps: usize) -> (ProgressService, InMemoryRepository, Roadmap) {
        let repo = InMemoryRepository::new();
        let draft = RoadmapDraft {
            title: "Rust".into(),
            description: None,
            months: vec![Month {
                month: "Month 1".into(),
                steps: (0..steps)
                    .map(|i| Step {
                        day: format!("Day {}", i + 1),
                        topic: format!("Topic {i}"),
                        details: vec!["exercise".into()],
                    })
                    .collect(),
            }],
        };
        let id = repo
            .insert_roadmap(draft.validate(fixed_now()).unwrap())
            .await
            .unwrap();
        let roadmap = repo.get_roadmap(id).await.unwrap().unwrap();
        let service = ProgressService::new(Arc::new(repo.clone()), Arc::new(repo.clone()));
        (service, repo, roadmap)
    }

    fn user() -> UserId {
        UserId::new("learner").unwrap()
    }

    #[tokio::test]
    async fn first_toggle_creates_record() {
        let (service, _, roadmap) = setup(4).await;
        let record = service
            .set_completion(&user(), roadmap.id(), "0-1", true)
            .await
            .unwrap();
        assert_eq!(record.total_steps(), 4);
        assert_eq!(record.completed_count(), 1);
        assert_eq!(record.percentage(), 25);
    }

    #[tokio::test]
    async fn toggling_back_restores_statistics() {
        let (service, _, roadmap) = setup(3).await;
        service
            .set_completion(&user(), roadmap.id(), "0-0", true)
            .await
            .unwrap();
        let before = service.get_progress(&user(), roadmap.id()).await.unwrap();

        service
            .set_completion(&user(), roadmap.id(), "0-2", true)
            .await
            .unwrap();
        let after = service
            .set_completion(&user(), roadmap.id(), "0-2", false)
            .await
            .unwrap();
        assert_eq!(after.completed_count(), before.completed_count());
        assert_eq!(after.percentage(), before.percentage());
    }

    #[tokio::test]
    async fn bad_keys_are_validation_errors() {
        let (service, repo, roadmap) = setup(2).await;
        for raw in ["x", "0-2", "1-0", "00-1"] {
            let err = service
                .set_completion(&user(), roadmap.id(), raw, true)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{raw}");
        }
        assert!(repo.get_progress(&user(), roadmap.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_with_one_bad_key_writes_nothing() {
        let (service, repo, roadmap) = setup(2).await;
        let err = service
            .set_completions(&user(), roadmap.id(), &[("0-0", true), ("9-9", true)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(repo.get_progress(&user(), roadmap.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_roadmap_and_record_are_not_found() {
        let (service, _, roadmap) = setup(2).await;
        let err = service
            .set_completion(&user(), RoadmapId::new(77), "0-0", true)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::RoadmapNotFound(_)));

        let err = service.get_progress(&user(), roadmap.id()).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::ProgressNotFound { .. }));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn start_twice_reports_existing_and_keeps_data() {
        let (service, _, roadmap) = setup(4).await;
        let first = service.start_progress(&user(), roadmap.id()).await.unwrap();
        assert!(first.was_created());

        service
            .set_completion(&user(), roadmap.id(), "0-3", true)
            .await
            .unwrap();

        let second = service.start_progress(&user(), roadmap.id()).await.unwrap();
        assert!(!second.was_created());
        assert!(second.record().is_completed(StepKey::at(0, 3)));
        assert_eq!(second.record().percentage(), 25);
    }

    /// Serves the structure as it was before a revision that the progress
    /// store has already seen.
    struct StaleRoadmaps(Roadmap);

    #[async_trait::async_trait]
    impl RoadmapRepository for StaleRoadmaps {
        async fn insert_roadmap(
            &self,
            _roadmap: roadmap_core::model::ValidatedRoadmap,
        ) -> Result<RoadmapId, StorageError> {
            unimplemented!("read-only")
        }

        async fn update_roadmap(&self, _roadmap: &Roadmap) -> Result<(), StorageError> {
            unimplemented!("read-only")
        }

        async fn get_roadmap(&self, _id: RoadmapId) -> Result<Option<Roadmap>, StorageError> {
            Ok(Some(self.0.clone()))
        }

        async fn list_roadmaps(&self, _limit: u32) -> Result<Vec<Roadmap>, StorageError> {
            Ok(vec![self.0.clone()])
        }
    }

    #[tokio::test]
    async fn revision_landing_after_the_service_load_wins() {
        let (_, repo, loaded) = setup(4).await;
        let grown = loaded
            .revise(RoadmapDraft {
                title: loaded.title().to_owned(),
                description: None,
                months: vec![loaded.months()[0].clone(), loaded.months()[0].clone()],
            })
            .unwrap();
        repo.update_roadmap(&grown).await.unwrap();

        let service = ProgressService::new(
            Arc::new(StaleRoadmaps(loaded.clone())),
            Arc::new(repo.clone()),
        );
        let record = service
            .set_completion(&user(), loaded.id(), "0-0", true)
            .await
            .unwrap();
        assert_eq!(record.total_steps(), 8);
        assert_eq!(record.percentage(), 13);

        let started = service.start_progress(&user(), loaded.id()).await.unwrap();
        assert_eq!(started.record().total_steps(), 8);
    }
}
