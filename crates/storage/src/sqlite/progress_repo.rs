use std::collections::BTreeMap;

use chrono::Utc;
use literacy_core::model::{Category, LessonProgress, OverallProgress, UserId, UserProgress};
use sqlx::{Row, Sqlite, Transaction};

use super::SqliteRepository;
use super::mapping::{
    conn, map_lesson_row, ser, to_json, user_id_from_i64, user_id_to_i64, version_from_i64,
    version_to_i64,
};
use crate::repository::{ProgressRepository, StorageError};

async fn upsert_lessons(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    progress: &UserProgress,
) -> Result<(), StorageError> {
    for category in Category::ALL {
        for (position, lesson) in progress.lessons_in(category).iter().enumerate() {
            upsert_lesson(tx, user_id, category, position, lesson).await?;
        }
    }
    Ok(())
}

async fn upsert_lesson(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: i64,
    category: Category,
    position: usize,
    lesson: &LessonProgress,
) -> Result<(), StorageError> {
    let position = i64::try_from(position)
        .map_err(|_| StorageError::Serialization("position overflow".into()))?;

    sqlx::query(
        r"
            INSERT INTO lesson_progress (
                user_id, category, lesson_id, position, completed, last_accessed,
                completed_steps, step_progress, quiz_scores,
                saved_for_later, needs_mentor_help, mentor_notes
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(user_id, category, lesson_id) DO UPDATE SET
                position = excluded.position,
                completed = excluded.completed,
                last_accessed = excluded.last_accessed,
                completed_steps = excluded.completed_steps,
                step_progress = excluded.step_progress,
                quiz_scores = excluded.quiz_scores,
                saved_for_later = excluded.saved_for_later,
                needs_mentor_help = excluded.needs_mentor_help,
                mentor_notes = excluded.mentor_notes
        ",
    )
    .bind(user_id)
    .bind(category.as_str())
    .bind(lesson.lesson_id().as_str())
    .bind(position)
    .bind(i64::from(lesson.completed()))
    .bind(lesson.last_accessed())
    .bind(to_json(lesson.completed_steps())?)
    .bind(to_json(lesson.step_progress())?)
    .bind(to_json(&lesson.quiz_scores())?)
    .bind(i64::from(lesson.saved_for_later()))
    .bind(i64::from(lesson.needs_mentor_help()))
    .bind(lesson.mentor_notes())
    .execute(&mut **tx)
    .await
    .map_err(conn)?;

    Ok(())
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn insert_user(&self, progress: &UserProgress) -> Result<(), StorageError> {
        let user_id = user_id_to_i64(progress.user_id())?;
        let overall = progress.overall();

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query(
            r"
                INSERT INTO users (
                    id, version, total_lessons_completed, average_quiz_score,
                    last_activity_date, created_at
                )
                VALUES (?1, 0, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(user_id)
        .bind(i64::from(overall.total_lessons_completed()))
        .bind(overall.average_quiz_score())
        .bind(overall.last_activity_date())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::AlreadyExists);
        }

        upsert_lessons(&mut tx, user_id, progress).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError> {
        let id = user_id_to_i64(user_id)?;

        // Both reads share one snapshot so a concurrent save is seen whole or not at all.
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let Some(row) = sqlx::query(
            r"
                SELECT id, version, total_lessons_completed, average_quiz_score, last_activity_date
                FROM users
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?
        else {
            return Ok(None);
        };

        let total: i64 = row.try_get("total_lessons_completed").map_err(ser)?;
        let overall = OverallProgress::from_persisted(
            u32::try_from(total).map_err(|_| {
                StorageError::Serialization(format!("invalid total_lessons_completed: {total}"))
            })?,
            row.try_get("average_quiz_score").map_err(ser)?,
            row.try_get("last_activity_date").map_err(ser)?,
        );
        let version = version_from_i64(row.try_get("version").map_err(ser)?)?;
        let stored_id = user_id_from_i64(row.try_get("id").map_err(ser)?)?;

        let rows = sqlx::query(
            r"
                SELECT
                    category, lesson_id, completed, last_accessed,
                    completed_steps, step_progress, quiz_scores,
                    saved_for_later, needs_mentor_help, mentor_notes
                FROM lesson_progress
                WHERE user_id = ?1
                ORDER BY category ASC, position ASC
            ",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        let mut lessons: BTreeMap<Category, Vec<LessonProgress>> = BTreeMap::new();
        for row in rows {
            let (category, lesson) = map_lesson_row(&row)?;
            lessons.entry(category).or_default().push(lesson);
        }

        Ok(Some(UserProgress::from_persisted(
            stored_id,
            overall,
            lessons,
            version,
        )))
    }

    async fn save_user(&self, progress: &UserProgress) -> Result<u64, StorageError> {
        let user_id = user_id_to_i64(progress.user_id())?;
        let expected = progress.version();
        let next = expected + 1;
        let overall = progress.overall();

        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query(
            r"
                UPDATE users SET
                    version = ?1,
                    total_lessons_completed = ?2,
                    average_quiz_score = ?3,
                    last_activity_date = ?4
                WHERE id = ?5 AND version = ?6
            ",
        )
        .bind(version_to_i64(next)?)
        .bind(i64::from(overall.total_lessons_completed()))
        .bind(overall.average_quiz_score())
        .bind(overall.last_activity_date())
        .bind(user_id)
        .bind(version_to_i64(expected)?)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            let current = sqlx::query("SELECT version FROM users WHERE id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn)?;
            return match current {
                None => Err(StorageError::NotFound),
                Some(row) => Err(StorageError::Conflict {
                    expected,
                    found: version_from_i64(row.try_get("version").map_err(ser)?)?,
                }),
            };
        }

        upsert_lessons(&mut tx, user_id, progress).await?;
        tx.commit().await.map_err(conn)?;
        Ok(next)
    }
}
