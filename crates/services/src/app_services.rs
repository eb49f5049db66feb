use std::sync::Arc;

use storage::repository::Storage;
use storage::sqlite::SqliteOptions;

use crate::Clock;
use crate::catalog_service::RoadmapCatalog;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;

/// Assembles the catalog and progress services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<RoadmapCatalog>,
    progress: Arc<ProgressService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        options: SqliteOptions,
        clock: Clock,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite_with(db_url, options).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    /// Build services over in-process storage.
    #[must_use]
    pub fn in_memory(clock: Clock) -> Self {
        Self::from_storage(&Storage::in_memory(), clock)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let catalog = Arc::new(RoadmapCatalog::new(clock, Arc::clone(&storage.roadmaps)));
        let progress = Arc::new(ProgressService::new(
            Arc::clone(&storage.roadmaps),
            Arc::clone(&storage.progress),
        ));
        Self { catalog, progress }
    }

    #[must_use]
    pub fn catalog(&self) -> Arc<RoadmapCatalog> {
        Arc::clone(&self.catalog)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }
}
