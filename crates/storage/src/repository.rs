use async_trait::async_trait;
use roadmap_core::model::{
    ProgressError, ProgressRecord, Roadmap, RoadmapId, StepKey, UserId, ValidatedRoadmap,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A unique constraint rejected the write (roadmap title, or a second
    /// progress record for the same user and roadmap).
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The domain refused a completion change; nothing was written.
    #[error(transparent)]
    Progress(#[from] ProgressError),
}

/// One requested completion change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepChange {
    pub key: StepKey,
    pub done: bool,
}

impl StepChange {
    #[must_use]
    pub fn new(key: StepKey, done: bool) -> Self {
        Self { key, done }
    }
}

/// Repository contract for roadmap reference data.
#[async_trait]
pub trait RoadmapRepository: Send + Sync {
    /// Insert a new roadmap and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the title is already taken.
    async fn insert_roadmap(&self, roadmap: ValidatedRoadmap) -> Result<RoadmapId, StorageError>;

    /// Replace title, description and structure of an existing roadmap.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the roadmap does not exist and
    /// `StorageError::Conflict` if the new title belongs to another roadmap.
    async fn update_roadmap(&self, roadmap: &Roadmap) -> Result<(), StorageError>;

    /// Fetch a roadmap by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn get_roadmap(&self, id: RoadmapId) -> Result<Option<Roadmap>, StorageError>;

    /// List roadmaps ordered by ID, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the query fails.
    async fn list_roadmaps(&self, limit: u32) -> Result<Vec<Roadmap>, StorageError>;
}

/// Repository contract for progress records.
///
/// Implementations must keep `(user_id, roadmap_id)` unique at the storage
/// layer and apply completion changes as a single atomic
/// load-merge-recompute-write. The roadmap structure a write is merged
/// against is read inside that same atomic section, so a concurrent revision
/// is either fully before or fully after the write.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for a user and roadmap, reconciled against the
    /// roadmap's current structure. The stored row is not rewritten.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup or decoding fails.
    async fn get_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Create an empty record seeded from the roadmap's current step count;
    /// never merges.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a record for the pair already
    /// exists and `StorageError::NotFound` if the roadmap does not.
    async fn insert_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, StorageError>;

    /// Create-or-merge the given changes into the record for `user_id` and
    /// `roadmap_id`, recomputing derived fields against the roadmap as it is
    /// stored at write time, and return the stored result. An empty
    /// `changes` slice still reconciles and persists the record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the roadmap does not exist,
    /// `StorageError::Progress` if the domain rejects a change (the whole
    /// batch is discarded), or other storage errors.
    async fn apply_changes(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
        changes: &[StepChange],
    ) -> Result<ProgressRecord, StorageError>;
}

/// Merge `changes` into `record` through the domain mutator.
pub(crate) fn merge_changes(
    record: &mut ProgressRecord,
    roadmap: &Roadmap,
    changes: &[StepChange],
) -> Result<(), StorageError> {
    if changes.is_empty() {
        record.reconcile(roadmap)?;
    }
    for change in changes {
        record.toggle(roadmap, change.key, change.done)?;
    }
    Ok(())
}

#[derive(Default)]
struct RoadmapTable {
    next_id: u64,
    rows: BTreeMap<RoadmapId, Roadmap>,
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// Each operation holds the relevant mutex for its whole duration, which is
/// what makes `apply_changes` atomic here.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    roadmaps: Arc<Mutex<RoadmapTable>>,
    progress: Arc<Mutex<HashMap<(UserId, RoadmapId), ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl RoadmapRepository for InMemoryRepository {
    async fn insert_roadmap(&self, roadmap: ValidatedRoadmap) -> Result<RoadmapId, StorageError> {
        let mut guard = self.roadmaps.lock().map_err(poisoned)?;
        if guard.rows.values().any(|r| r.title() == roadmap.title) {
            return Err(StorageError::Conflict);
        }
        guard.next_id += 1;
        let id = RoadmapId::new(guard.next_id);
        guard.rows.insert(id, roadmap.assign_id(id));
        Ok(id)
    }

    async fn update_roadmap(&self, roadmap: &Roadmap) -> Result<(), StorageError> {
        let mut guard = self.roadmaps.lock().map_err(poisoned)?;
        if !guard.rows.contains_key(&roadmap.id()) {
            return Err(StorageError::NotFound);
        }
        if guard
            .rows
            .values()
            .any(|r| r.id() != roadmap.id() && r.title() == roadmap.title())
        {
            return Err(StorageError::Conflict);
        }
        guard.rows.insert(roadmap.id(), roadmap.clone());
        Ok(())
    }

    async fn get_roadmap(&self, id: RoadmapId) -> Result<Option<Roadmap>, StorageError> {
        let guard = self.roadmaps.lock().map_err(poisoned)?;
        Ok(guard.rows.get(&id).cloned())
    }

    async fn list_roadmaps(&self, limit: u32) -> Result<Vec<Roadmap>, StorageError> {
        let guard = self.roadmaps.lock().map_err(poisoned)?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(guard.rows.values().take(limit).cloned().collect())
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let progress = self.progress.lock().map_err(poisoned)?;
        let roadmaps = self.roadmaps.lock().map_err(poisoned)?;
        let (Some(record), Some(roadmap)) = (
            progress.get(&(user_id.clone(), roadmap_id)),
            roadmaps.rows.get(&roadmap_id),
        ) else {
            return Ok(None);
        };
        let mut record = record.clone();
        record.reconcile(roadmap)?;
        Ok(Some(record))
    }

    async fn insert_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, StorageError> {
        // Lock order everywhere both are held: progress, then roadmaps.
        let mut progress = self.progress.lock().map_err(poisoned)?;
        let roadmaps = self.roadmaps.lock().map_err(poisoned)?;
        let roadmap = roadmaps.rows.get(&roadmap_id).ok_or(StorageError::NotFound)?;
        let key = (user_id.clone(), roadmap_id);
        if progress.contains_key(&key) {
            return Err(StorageError::Conflict);
        }
        let record = ProgressRecord::new(user_id.clone(), roadmap);
        progress.insert(key, record.clone());
        Ok(record)
    }

    async fn apply_changes(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
        changes: &[StepChange],
    ) -> Result<ProgressRecord, StorageError> {
        let mut progress = self.progress.lock().map_err(poisoned)?;
        let roadmaps = self.roadmaps.lock().map_err(poisoned)?;
        let roadmap = roadmaps.rows.get(&roadmap_id).ok_or(StorageError::NotFound)?;
        let key = (user_id.clone(), roadmap_id);
        let mut record = progress
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ProgressRecord::new(user_id.clone(), roadmap));
        merge_changes(&mut record, roadmap, changes)?;
        progress.insert(key, record.clone());
        Ok(record)
    }
}

/// Aggregates roadmap and progress repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub roadmaps: Arc<dyn RoadmapRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let roadmaps: Arc<dyn RoadmapRepository> = Arc::new(repo.clone());
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo);
        Self { roadmaps, progress }
    }
}
