use chrono::Utc;
use roadmap_core::model::{ProgressRecord, RoadmapId, UserId};
use sqlx::SqliteConnection;

use super::mapping::{encode_completed, map_progress_row, roadmap_id_to_i64};
use super::roadmap_repo::fetch_roadmap;
use super::{SqliteRepository, read_error, write_error};
use crate::repository::{ProgressRepository, StepChange, StorageError, merge_changes};

const SELECT_PROGRESS: &str = r"
    SELECT user_id, roadmap_id, completed, completed_count, percentage, total_steps
    FROM progress
    WHERE user_id = ?1 AND roadmap_id = ?2
";

/// Seeds an empty row, but only when the roadmap exists. Being a write, it
/// also takes the database write lock before anything is read.
const SEED_PROGRESS: &str = r"
    INSERT INTO progress (
        user_id, roadmap_id, completed, completed_count,
        percentage, total_steps, updated_at
    )
    SELECT ?1, id, '{}', 0, 0, 0, ?3
    FROM roadmaps
    WHERE id = ?2
";

const SEED_PROGRESS_IF_MISSING: &str = r"
    INSERT INTO progress (
        user_id, roadmap_id, completed, completed_count,
        percentage, total_steps, updated_at
    )
    SELECT ?1, id, '{}', 0, 0, 0, ?3
    FROM roadmaps
    WHERE id = ?2
    ON CONFLICT(user_id, roadmap_id) DO NOTHING
";

async fn store_record(
    conn: &mut SqliteConnection,
    record: &ProgressRecord,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        UPDATE progress
        SET completed = ?3,
            completed_count = ?4,
            percentage = ?5,
            total_steps = ?6,
            updated_at = ?7
        WHERE user_id = ?1 AND roadmap_id = ?2
        ",
    )
    .bind(record.user_id().as_str())
    .bind(roadmap_id_to_i64(record.roadmap_id())?)
    .bind(encode_completed(record.completed())?)
    .bind(i64::from(record.completed_count()))
    .bind(i64::from(record.percentage()))
    .bind(i64::from(record.total_steps()))
    .bind(Utc::now())
    .execute(conn)
    .await
    .map_err(write_error)?;

    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        // One read transaction so the row and the roadmap come from the same snapshot.
        let mut tx = self.pool.begin().await.map_err(read_error)?;

        let row = sqlx::query(SELECT_PROGRESS)
            .bind(user_id.as_str())
            .bind(roadmap_id_to_i64(roadmap_id)?)
            .fetch_optional(&mut *tx)
            .await
            .map_err(read_error)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut record = map_progress_row(&row)?;
        let Some(roadmap) = fetch_roadmap(&mut *tx, roadmap_id).await? else {
            return Ok(None);
        };
        tx.commit().await.map_err(read_error)?;

        let fixed = record.reconcile(&roadmap)?;
        if !fixed.is_clean() {
            tracing::warn!(
                user_id = %user_id,
                roadmap_id = %roadmap_id,
                stale_total = ?fixed.total_steps,
                dropped = fixed.dropped.len(),
                "stored progress is behind the roadmap structure; corrected on read"
            );
        }
        Ok(Some(record))
    }

    async fn insert_progress(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
    ) -> Result<ProgressRecord, StorageError> {
        let mut tx = self.pool.begin().await.map_err(read_error)?;

        let seeded = sqlx::query(SEED_PROGRESS)
            .bind(user_id.as_str())
            .bind(roadmap_id_to_i64(roadmap_id)?)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        if seeded.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        let roadmap = fetch_roadmap(&mut *tx, roadmap_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let record = ProgressRecord::new(user_id.clone(), &roadmap);
        store_record(&mut *tx, &record).await?;

        tx.commit().await.map_err(write_error)?;
        Ok(record)
    }

    async fn apply_changes(
        &self,
        user_id: &UserId,
        roadmap_id: RoadmapId,
        changes: &[StepChange],
    ) -> Result<ProgressRecord, StorageError> {
        let roadmap_key = roadmap_id_to_i64(roadmap_id)?;

        let mut tx = self.pool.begin().await.map_err(read_error)?;

        // Write first: from here on this transaction holds the write lock, so
        // neither a concurrent toggle nor a roadmap revision can land between
        // the reads below and the final update.
        sqlx::query(SEED_PROGRESS_IF_MISSING)
            .bind(user_id.as_str())
            .bind(roadmap_key)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        let roadmap = fetch_roadmap(&mut *tx, roadmap_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let row = sqlx::query(SELECT_PROGRESS)
            .bind(user_id.as_str())
            .bind(roadmap_key)
            .fetch_one(&mut *tx)
            .await
            .map_err(read_error)?;
        let mut record = map_progress_row(&row)?;

        // Dropping `tx` on error rolls back the seed row as well.
        merge_changes(&mut record, &roadmap, changes)?;
        store_record(&mut *tx, &record).await?;

        tx.commit().await.map_err(write_error)?;

        tracing::debug!(
            user_id = %user_id,
            roadmap_id = %roadmap_id,
            changes = changes.len(),
            completed = record.completed_count(),
            percentage = record.percentage(),
            "progress written"
        );
        Ok(record)
    }
}
