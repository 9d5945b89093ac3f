use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the user aggregate tables (users, lesson progress) and the
/// read-only lesson catalog (lessons, steps, action items).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY,
                    version INTEGER NOT NULL CHECK (version >= 0),
                    total_lessons_completed INTEGER NOT NULL CHECK (total_lessons_completed >= 0),
                    average_quiz_score REAL NOT NULL,
                    last_activity_date TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_progress (
                    user_id INTEGER NOT NULL,
                    category TEXT NOT NULL,
                    lesson_id TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    last_accessed TEXT NOT NULL,
                    completed_steps TEXT NOT NULL,
                    step_progress TEXT NOT NULL,
                    quiz_scores TEXT NOT NULL,
                    saved_for_later INTEGER NOT NULL CHECK (saved_for_later IN (0, 1)),
                    needs_mentor_help INTEGER NOT NULL CHECK (needs_mentor_help IN (0, 1)),
                    mentor_notes TEXT,
                    PRIMARY KEY (user_id, category, lesson_id),
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lessons (
                    id TEXT PRIMARY KEY,
                    category TEXT NOT NULL,
                    title TEXT NOT NULL,
                    position INTEGER NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_steps (
                    lesson_id TEXT NOT NULL,
                    step_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    PRIMARY KEY (lesson_id, step_id),
                    FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_action_items (
                    lesson_id TEXT NOT NULL,
                    step_id TEXT NOT NULL,
                    item_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    task TEXT NOT NULL,
                    is_required INTEGER NOT NULL CHECK (is_required IN (0, 1)),
                    PRIMARY KEY (lesson_id, step_id, item_id),
                    FOREIGN KEY (lesson_id, step_id)
                        REFERENCES lesson_steps(lesson_id, step_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_lesson_progress_user_category
                    ON lesson_progress (user_id, category, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_lessons_category_position
                    ON lessons (category, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(version = 1, "applied sqlite schema migration");
    }

    Ok(())
}
