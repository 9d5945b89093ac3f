use literacy_core::model::{Category, LessonId, LessonProgress, UserId};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn user_id_to_i64(id: UserId) -> Result<i64, StorageError> {
    i64::try_from(id.value()).map_err(|_| StorageError::Serialization("user_id overflow".into()))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    u64::try_from(v)
        .map(UserId::new)
        .map_err(|_| StorageError::Serialization("user_id sign overflow".into()))
}

pub(crate) fn version_to_i64(v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("version overflow".into()))
}

pub(crate) fn version_from_i64(v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid version: {v}")))
}

pub(crate) fn parse_category(s: &str) -> Result<Category, StorageError> {
    s.parse::<Category>().map_err(ser)
}

pub(crate) fn bool_from_i64(field: &'static str, v: i64) -> Result<bool, StorageError> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StorageError::Serialization(format!(
            "invalid {field}: {other}"
        ))),
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(ser)
}

fn from_json<T: serde::de::DeserializeOwned>(
    field: &'static str,
    raw: &str,
) -> Result<T, StorageError> {
    serde_json::from_str(raw)
        .map_err(|e| StorageError::Serialization(format!("invalid {field} json: {e}")))
}

/// Decode a `lesson_progress` row into its category and record.
pub(crate) fn map_lesson_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(Category, LessonProgress), StorageError> {
    let category = parse_category(&row.try_get::<String, _>("category").map_err(ser)?)?;

    let completed_steps = from_json(
        "completed_steps",
        &row.try_get::<String, _>("completed_steps").map_err(ser)?,
    )?;
    let step_progress = from_json(
        "step_progress",
        &row.try_get::<String, _>("step_progress").map_err(ser)?,
    )?;
    let quiz_scores = from_json(
        "quiz_scores",
        &row.try_get::<String, _>("quiz_scores").map_err(ser)?,
    )?;

    let record = LessonProgress::from_persisted(
        LessonId::new(row.try_get::<String, _>("lesson_id").map_err(ser)?),
        bool_from_i64("completed", row.try_get("completed").map_err(ser)?)?,
        row.try_get("last_accessed").map_err(ser)?,
        completed_steps,
        step_progress,
        quiz_scores,
        bool_from_i64("saved_for_later", row.try_get("saved_for_later").map_err(ser)?)?,
        bool_from_i64(
            "needs_mentor_help",
            row.try_get("needs_mentor_help").map_err(ser)?,
        )?,
        row.try_get("mentor_notes").map_err(ser)?,
    );

    Ok((category, record))
}
