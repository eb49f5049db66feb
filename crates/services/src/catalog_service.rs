use std::sync::Arc;

use roadmap_core::model::{Roadmap, RoadmapDraft, RoadmapId};
use storage::repository::{RoadmapRepository, StorageError};

use crate::Clock;
use crate::error::CatalogError;

/// Read-mostly access to roadmap structure, plus the authoring entry points.
#[derive(Clone)]
pub struct RoadmapCatalog {
    clock: Clock,
    roadmaps: Arc<dyn RoadmapRepository>,
}

impl RoadmapCatalog {
    #[must_use]
    pub fn new(clock: Clock, roadmaps: Arc<dyn RoadmapRepository>) -> Self {
        Self { clock, roadmaps }
    }

    /// Validate and store a new roadmap.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Roadmap` for validation failures,
    /// `CatalogError::DuplicateTitle` if the title is taken, and
    /// `CatalogError::Storage` if persistence fails.
    #[tracing::instrument(skip_all, fields(title = %draft.title.trim()))]
    pub async fn define(&self, draft: RoadmapDraft) -> Result<RoadmapId, CatalogError> {
        let validated = draft.validate(self.clock.now())?;
        let title = validated.title.clone();
        let id = self
            .roadmaps
            .insert_roadmap(validated)
            .await
            .map_err(|err| match err {
                StorageError::Conflict => CatalogError::DuplicateTitle {
                    title: title.clone(),
                },
                other => CatalogError::Storage(other),
            })?;
        tracing::info!(roadmap_id = %id, "roadmap defined");
        Ok(id)
    }

    /// Replace an existing roadmap's title, description and structure.
    ///
    /// Progress records pick up the new step count on their next read or write.
    ///
    /// # Errors
    ///
    /// Same as [`Self::define`], plus `CatalogError::NotFound`.
    #[tracing::instrument(skip(self, draft))]
    pub async fn revise(&self, id: RoadmapId, draft: RoadmapDraft) -> Result<(), CatalogError> {
        let current = self.get(id).await?;
        let revised = current.revise(draft)?;
        self.roadmaps
            .update_roadmap(&revised)
            .await
            .map_err(|err| match err {
                StorageError::Conflict => CatalogError::DuplicateTitle {
                    title: revised.title().to_owned(),
                },
                StorageError::NotFound => CatalogError::NotFound(id),
                other => CatalogError::Storage(other),
            })?;
        tracing::info!(
            before = current.step_count(),
            after = revised.step_count(),
            "roadmap revised"
        );
        Ok(())
    }

    /// Fetch a roadmap by ID.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if it does not exist.
    pub async fn get(&self, id: RoadmapId) -> Result<Roadmap, CatalogError> {
        self.roadmaps
            .get_roadmap(id)
            .await?
            .ok_or(CatalogError::NotFound(id))
    }

    /// List roadmaps ordered by ID, up to the given limit.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Storage` if repository access fails.
    pub async fn list(&self, limit: u32) -> Result<Vec<Roadmap>, CatalogError> {
        Ok(self.roadmaps.list_roadmaps(limit).await?)
    }

    /// Authoritative step count, read from the stored structure on every call.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the roadmap does not exist.
    pub async fn step_count(&self, id: RoadmapId) -> Result<u32, CatalogError> {
        Ok(self.get(id).await?.step_count())
    }
}
