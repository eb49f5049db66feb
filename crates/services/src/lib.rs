#![forbid(unsafe_code)]

pub mod app_services;
pub mod catalog_service;
pub mod error;
pub mod progress_service;
pub mod view;

pub use roadmap_core::Clock;

pub use app_services::AppServices;
pub use catalog_service::RoadmapCatalog;
pub use error::{AppServicesError, CatalogError, ErrorKind, ProgressServiceError};
pub use progress_service::{ProgressService, StartOutcome};
pub use view::{ProgressSnapshot, RoadmapDocument, RoadmapSummary};
