use std::collections::HashMap;

use literacy_core::model::{ActionItem, Category, LessonDefinition, LessonId, Step};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{bool_from_i64, conn, parse_category, ser};
use crate::repository::{ContentCatalog, StorageError};

impl SqliteRepository {
    /// Insert or replace a catalog lesson with its steps and action items.
    ///
    /// The catalog is loaded out of band (seeding, imports); progress code
    /// only reads it. A replaced lesson keeps its original position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any write fails; the lesson is left unchanged.
    pub async fn upsert_lesson(&self, lesson: &LessonDefinition) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let lesson_id = lesson.id().as_str();

        sqlx::query(
            r"
                INSERT INTO lessons (id, category, title, position)
                VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(position), 0) + 1 FROM lessons))
                ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    title = excluded.title
            ",
        )
        .bind(lesson_id)
        .bind(lesson.category().as_str())
        .bind(lesson.title())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM lesson_steps WHERE lesson_id = ?1")
            .bind(lesson_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (step_pos, step) in lesson.steps().iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO lesson_steps (lesson_id, step_id, position, title)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(lesson_id)
            .bind(step.id().as_str())
            .bind(position_i64(step_pos)?)
            .bind(step.title())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (item_pos, item) in step.action_items().iter().enumerate() {
                sqlx::query(
                    r"
                        INSERT INTO lesson_action_items (
                            lesson_id, step_id, item_id, position, task, is_required
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(lesson_id)
                .bind(step.id().as_str())
                .bind(item.id().as_str())
                .bind(position_i64(item_pos)?)
                .bind(item.task())
                .bind(i64::from(item.is_required()))
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        tracing::debug!(lesson = %lesson.id(), steps = lesson.steps().len(), "catalog lesson stored");
        Ok(())
    }
}

fn position_i64(v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization("position overflow".into()))
}

#[async_trait::async_trait]
impl ContentCatalog for SqliteRepository {
    async fn get_lesson_definition(
        &self,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonDefinition>, StorageError> {
        let Some(row) = sqlx::query("SELECT id, category, title FROM lessons WHERE id = ?1")
            .bind(lesson_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
        else {
            return Ok(None);
        };
        let category = parse_category(&row.try_get::<String, _>("category").map_err(ser)?)?;
        let title: String = row.try_get("title").map_err(ser)?;

        let item_rows = sqlx::query(
            r"
                SELECT step_id, item_id, task, is_required
                FROM lesson_action_items
                WHERE lesson_id = ?1
                ORDER BY step_id ASC, position ASC
            ",
        )
        .bind(lesson_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut items_by_step: HashMap<String, Vec<ActionItem>> = HashMap::new();
        for row in item_rows {
            let step_id: String = row.try_get("step_id").map_err(ser)?;
            let item = ActionItem::new(
                row.try_get::<String, _>("item_id").map_err(ser)?,
                row.try_get::<String, _>("task").map_err(ser)?,
                bool_from_i64("is_required", row.try_get("is_required").map_err(ser)?)?,
            );
            items_by_step.entry(step_id).or_default().push(item);
        }

        let step_rows = sqlx::query(
            r"
                SELECT step_id, title
                FROM lesson_steps
                WHERE lesson_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(lesson_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for row in step_rows {
            let step_id: String = row.try_get("step_id").map_err(ser)?;
            let items = items_by_step.remove(&step_id).unwrap_or_default();
            steps.push(Step::new(
                step_id,
                row.try_get::<String, _>("title").map_err(ser)?,
                items,
            ));
        }

        LessonDefinition::new(lesson_id.clone(), category, title, steps)
            .map(Some)
            .map_err(ser)
    }

    async fn list_lessons(
        &self,
        category: Category,
    ) -> Result<Vec<LessonDefinition>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id
                FROM lessons
                WHERE category = ?1
                ORDER BY position ASC, id ASC
            ",
        )
        .bind(category.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut lessons = Vec::with_capacity(rows.len());
        for row in rows {
            let id = LessonId::new(row.try_get::<String, _>("id").map_err(ser)?);
            // Rows can only vanish here if the catalog is rewritten concurrently.
            if let Some(lesson) = self.get_lesson_definition(&id).await? {
                lessons.push(lesson);
            }
        }
        Ok(lessons)
    }
}
