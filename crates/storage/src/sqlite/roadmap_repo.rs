use roadmap_core::model::{Roadmap, RoadmapId, ValidatedRoadmap};
use sqlx::{Executor, Sqlite};

use super::mapping::{encode_months, map_roadmap_row, roadmap_id_from_i64, roadmap_id_to_i64};
use super::{SqliteRepository, read_error, write_error};
use crate::repository::{RoadmapRepository, StorageError};

const SELECT_ROADMAP: &str = r"
    SELECT id, title, description, months, created_at
    FROM roadmaps WHERE id = ?1
";

/// Load one roadmap through any executor, so writers can read it inside
/// their own transaction.
pub(super) async fn fetch_roadmap<'e, E>(
    executor: E,
    id: RoadmapId,
) -> Result<Option<Roadmap>, StorageError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(SELECT_ROADMAP)
        .bind(roadmap_id_to_i64(id)?)
        .fetch_optional(executor)
        .await
        .map_err(read_error)?;

    row.as_ref().map(map_roadmap_row).transpose()
}

#[async_trait::async_trait]
impl RoadmapRepository for SqliteRepository {
    async fn insert_roadmap(&self, roadmap: ValidatedRoadmap) -> Result<RoadmapId, StorageError> {
        let months = encode_months(&roadmap.months)?;

        let res = sqlx::query(
            r"
            INSERT INTO roadmaps (title, description, months, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(roadmap.title)
        .bind(roadmap.description)
        .bind(months)
        .bind(roadmap.created_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        roadmap_id_from_i64(res.last_insert_rowid())
    }

    async fn update_roadmap(&self, roadmap: &Roadmap) -> Result<(), StorageError> {
        let res = sqlx::query(
            r"
            UPDATE roadmaps
            SET title = ?2, description = ?3, months = ?4
            WHERE id = ?1
            ",
        )
        .bind(roadmap_id_to_i64(roadmap.id())?)
        .bind(roadmap.title().to_owned())
        .bind(roadmap.description().map(ToOwned::to_owned))
        .bind(encode_months(roadmap.months())?)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_roadmap(&self, id: RoadmapId) -> Result<Option<Roadmap>, StorageError> {
        fetch_roadmap(&self.pool, id).await
    }

    async fn list_roadmaps(&self, limit: u32) -> Result<Vec<Roadmap>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, title, description, months, created_at
            FROM roadmaps
            ORDER BY id ASC
            LIMIT ?1
            ",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        let mut roadmaps = Vec::with_capacity(rows.len());
        for row in rows {
            roadmaps.push(map_roadmap_row(&row)?);
        }
        Ok(roadmaps)
    }
}
