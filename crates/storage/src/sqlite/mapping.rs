use std::collections::BTreeMap;

use roadmap_core::model::{Month, ProgressRecord, Roadmap, RoadmapId, StepKey, UserId};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn roadmap_id_to_i64(id: RoadmapId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("roadmap_id overflow".into()))
}

pub(crate) fn roadmap_id_from_i64(v: i64) -> Result<RoadmapId, StorageError> {
    u64::try_from(v)
        .map(RoadmapId::new)
        .map_err(|_| StorageError::Serialization("roadmap_id sign overflow".into()))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn encode_months(months: &[Month]) -> Result<String, StorageError> {
    serde_json::to_string(months).map_err(ser)
}

pub(crate) fn encode_completed(completed: &BTreeMap<StepKey, bool>) -> Result<String, StorageError> {
    serde_json::to_string(completed).map_err(ser)
}

/// Decode a stored completion map.
///
/// Keys that are not valid step keys cannot refer to any step, so they are
/// dropped instead of failing the whole record.
pub(crate) fn decode_completed(raw: &str) -> Result<BTreeMap<StepKey, bool>, StorageError> {
    let loose: BTreeMap<String, bool> = serde_json::from_str(raw).map_err(ser)?;
    let mut out = BTreeMap::new();
    for (key, done) in loose {
        match StepKey::parse(&key) {
            Ok(parsed) => {
                out.insert(parsed, done);
            }
            Err(err) => tracing::warn!(%err, "dropping unreadable step key from stored progress"),
        }
    }
    Ok(out)
}

pub(crate) fn map_roadmap_row(row: &SqliteRow) -> Result<Roadmap, StorageError> {
    let months_raw: String = row.try_get("months").map_err(ser)?;
    let months: Vec<Month> = serde_json::from_str(&months_raw).map_err(ser)?;

    Roadmap::from_persisted(
        roadmap_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        row.try_get::<Option<String>, _>("description").map_err(ser)?,
        months,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let user_id = UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?).map_err(ser)?;
    let roadmap_id = roadmap_id_from_i64(row.try_get::<i64, _>("roadmap_id").map_err(ser)?)?;
    let completed = decode_completed(&row.try_get::<String, _>("completed").map_err(ser)?)?;
    let total_steps = u32_from_i64(
        "total_steps",
        row.try_get::<i64, _>("total_steps").map_err(ser)?,
    )?;
    let stored_count = row.try_get::<i64, _>("completed_count").map_err(ser)?;
    let stored_percentage = row.try_get::<i64, _>("percentage").map_err(ser)?;

    let record = ProgressRecord::from_persisted(user_id, roadmap_id, completed, total_steps);
    if i64::from(record.completed_count()) != stored_count
        || i64::from(record.percentage()) != stored_percentage
    {
        tracing::warn!(
            user_id = %record.user_id(),
            roadmap_id = %roadmap_id,
            stored_count,
            stored_percentage,
            count = record.completed_count(),
            percentage = record.percentage(),
            "stored progress statistics disagreed with the completion map; recomputed"
        );
    }
    Ok(record)
}
