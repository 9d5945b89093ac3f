use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use literacy_core::{
    model::{Category, LessonId, LessonProgress, OverallProgress, UserId, UserProgress},
    reconcile::reconcile,
    sync::{
        BatchSyncRequest, BatchSyncResponse, CategoryProgress, CategorySummary,
        MentorHelpRequest, PayloadError, QuizScoreRequest, SaveForLaterRequest, parse_category,
    },
    time::Clock,
};
use storage::repository::{ContentCatalog, ProgressRepository, Storage, StorageError};

use crate::error::ProgressServiceError;

//
// ─── HELPERS ───────────────────────────────────────────────────────────────────
//

fn save_error(user: UserId, err: StorageError) -> ProgressServiceError {
    match err {
        StorageError::NotFound => ProgressServiceError::UserNotFound(user),
        StorageError::Conflict { expected, found } => {
            warn!(%user, expected, found, "progress write lost a version race");
            ProgressServiceError::Conflict {
                user,
                expected,
                found,
            }
        }
        other => ProgressServiceError::Persistence(other),
    }
}

fn require_lesson_id(lesson_id: &LessonId) -> Result<(), ProgressServiceError> {
    if lesson_id.is_blank() {
        return Err(PayloadError::EmptyLessonId.into());
    }
    Ok(())
}

fn snapshot(
    progress: &UserProgress,
    category: Category,
    lesson_id: &LessonId,
) -> Result<LessonProgress, ProgressServiceError> {
    progress
        .lesson(category, lesson_id)
        .cloned()
        .ok_or_else(|| ProgressServiceError::LessonNotFound(lesson_id.clone()))
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Per-user lesson progress: batch sync, single-field updates and
/// reconciliation of the overall counters.
///
/// Every mutation runs load → find-or-create → mutate → derive → reconcile →
/// save, and the save replaces the whole user aggregate in one versioned
/// write. A response therefore only ever reflects state that was persisted.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    catalog: Arc<dyn ContentCatalog>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        catalog: Arc<dyn ContentCatalog>,
    ) -> Self {
        Self {
            clock,
            progress,
            catalog,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.catalog),
        )
    }

    /// Create the progress aggregate for a new user.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::UserExists` if the user already has one.
    /// Returns `ProgressServiceError::Persistence` if the write fails.
    pub async fn create_user(&self, user_id: UserId) -> Result<OverallProgress, ProgressServiceError> {
        let progress = UserProgress::new(user_id, self.clock.now());
        match self.progress.insert_user(&progress).await {
            Ok(()) => {
                info!(user = %user_id, "created progress aggregate");
                Ok(*progress.overall())
            }
            Err(StorageError::AlreadyExists) => Err(ProgressServiceError::UserExists(user_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Replace a lesson's step state and return the authoritative snapshot.
    ///
    /// Completion is derived from the catalog definition; the client's
    /// `completed_steps` claim is never trusted. Resubmitting the same payload
    /// leaves the stored state and counters unchanged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCategory` or `InvalidPayload` for malformed requests,
    /// `UserNotFound`, `LessonNotFound` when the catalog has no such lesson in
    /// the category (nothing is applied), `Conflict` for a concurrent write,
    /// and `Persistence` for storage failures.
    pub async fn submit_batch(
        &self,
        user_id: UserId,
        request: &BatchSyncRequest,
    ) -> Result<BatchSyncResponse, ProgressServiceError> {
        let category = parse_category(&request.category)?;
        require_lesson_id(&request.lesson_id)?;
        let mut progress = self.load(user_id).await?;

        let definition = self
            .catalog
            .get_lesson_definition(&request.lesson_id)
            .await?
            .filter(|definition| definition.category() == category)
            .ok_or_else(|| ProgressServiceError::LessonNotFound(request.lesson_id.clone()))?;
        let step_progress = request.to_step_progress(&definition)?;

        let now = self.clock.now();
        let change = progress.apply_batch(category, &definition, step_progress, now);
        let lesson = snapshot(&progress, category, &request.lesson_id)?;

        let claimed = request.claimed_steps();
        if &claimed != lesson.completed_steps() {
            debug!(
                user = %user_id,
                lesson = %request.lesson_id,
                claimed = claimed.len(),
                derived = lesson.completed_steps().len(),
                "client completed steps differ from derived steps"
            );
        }

        let progress = self.commit(progress, now).await?;
        info!(
            user = %user_id,
            %category,
            lesson = %request.lesson_id,
            completed = change.completed,
            flipped = change.flipped(),
            total = progress.overall().total_lessons_completed(),
            "batch progress applied"
        );

        Ok(BatchSyncResponse {
            progress: lesson,
            overall: *progress.overall(),
        })
    }

    /// Set or clear the saved-for-later flag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCategory`, `InvalidPayload`, `UserNotFound`,
    /// `Conflict` or `Persistence`.
    pub async fn save_for_later(
        &self,
        user_id: UserId,
        request: &SaveForLaterRequest,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let saved = request.saved;
        self.update_lesson(user_id, &request.category, &request.lesson_id, |lesson, _| {
            lesson.set_saved_for_later(saved);
            Ok(())
        })
        .await
    }

    /// Flag a lesson as needing a mentor, replacing any previous notes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCategory`, `InvalidPayload`, `UserNotFound`,
    /// `Conflict` or `Persistence`.
    pub async fn request_mentor_help(
        &self,
        user_id: UserId,
        request: &MentorHelpRequest,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let notes = request.notes.clone();
        self.update_lesson(user_id, &request.category, &request.lesson_id, |lesson, _| {
            lesson.request_mentor_help(notes);
            Ok(())
        })
        .await
    }

    /// Record the latest quiz score. Only the newest attempt is kept.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for a score above 100, and otherwise the same
    /// errors as the other single-field updates.
    pub async fn update_quiz_score(
        &self,
        user_id: UserId,
        request: &QuizScoreRequest,
    ) -> Result<LessonProgress, ProgressServiceError> {
        let score = request.score;
        self.update_lesson(user_id, &request.category, &request.lesson_id, |lesson, now| {
            lesson.record_quiz_score(score, now)?;
            Ok(())
        })
        .await
    }

    /// All lesson records in a category plus the overall counters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCategory`, `UserNotFound` or `Persistence`.
    pub async fn category_progress(
        &self,
        user_id: UserId,
        category: &str,
    ) -> Result<CategoryProgress, ProgressServiceError> {
        let category = parse_category(category)?;
        let progress = self.load(user_id).await?;
        Ok(CategoryProgress {
            category,
            lessons: progress.lessons_in(category).to_vec(),
            overall: *progress.overall(),
        })
    }

    /// Completed lessons against the catalog for one category.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCategory`, `UserNotFound` or `Persistence`.
    pub async fn category_summary(
        &self,
        user_id: UserId,
        category: &str,
    ) -> Result<CategorySummary, ProgressServiceError> {
        let category = parse_category(category)?;
        let progress = self.load(user_id).await?;
        let catalog = self.catalog.list_lessons(category).await?;
        Ok(CategorySummary::from_records(
            category,
            &catalog,
            progress.lessons_in(category),
        ))
    }

    /// Recompute and persist the overall counters on demand.
    ///
    /// # Errors
    ///
    /// Returns `UserNotFound`, `Conflict` or `Persistence`.
    pub async fn reconcile(&self, user_id: UserId) -> Result<OverallProgress, ProgressServiceError> {
        let progress = self.load(user_id).await?;
        let progress = self.commit(progress, self.clock.now()).await?;
        Ok(*progress.overall())
    }

    async fn load(&self, user_id: UserId) -> Result<UserProgress, ProgressServiceError> {
        self.progress
            .load_user(user_id)
            .await?
            .ok_or(ProgressServiceError::UserNotFound(user_id))
    }

    /// Reconcile the counters and write the aggregate back.
    async fn commit(
        &self,
        mut progress: UserProgress,
        now: DateTime<Utc>,
    ) -> Result<UserProgress, ProgressServiceError> {
        let user = progress.user_id();
        let result = reconcile(&mut progress, now);
        if let Some(drift) = result.drift {
            warn!(
                %user,
                recorded = drift.recorded,
                actual = drift.actual,
                "completed lesson counter drifted; overwriting with recomputed total"
            );
        }

        let version = self
            .progress
            .save_user(&progress)
            .await
            .map_err(|err| save_error(user, err))?;
        Ok(progress.with_version(version))
    }

    async fn update_lesson<F>(
        &self,
        user_id: UserId,
        category: &str,
        lesson_id: &LessonId,
        apply: F,
    ) -> Result<LessonProgress, ProgressServiceError>
    where
        F: FnOnce(&mut LessonProgress, DateTime<Utc>) -> Result<(), ProgressServiceError>,
    {
        let category = parse_category(category)?;
        require_lesson_id(lesson_id)?;
        let mut progress = self.load(user_id).await?;

        let now = self.clock.now();
        apply(progress.find_or_create_lesson(category, lesson_id, now), now)?;
        let lesson = snapshot(&progress, category, lesson_id)?;

        self.commit(progress, now).await?;
        debug!(user = %user_id, %category, lesson = %lesson_id, "lesson flags updated");
        Ok(lesson)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use literacy_core::model::{ActionItem, ActionItemId, LessonDefinition, Step, StepId};
    use literacy_core::sync::StepActions;
    use literacy_core::time::fixed_now;
    use storage::repository::InMemoryRepository;

    fn lesson() -> LessonDefinition {
        LessonDefinition::new(
            "l1",
            Category::Smartphone,
            "Unlocking your phone",
            vec![Step::new(
                "s1",
                "",
                vec![
                    ActionItem::required("required1", "Press the side button"),
                    ActionItem::optional("optional1", "Turn up brightness"),
                ],
            )],
        )
        .unwrap()
    }

    async fn service() -> ProgressService {
        let repo = InMemoryRepository::with_lessons([lesson()]);
        let service = ProgressService::from_storage(
            Clock::fixed(fixed_now()),
            &Storage::from_in_memory(repo),
        );
        service.create_user(UserId::new(1)).await.unwrap();
        service
    }

    fn batch(items: &[&str]) -> BatchSyncRequest {
        BatchSyncRequest {
            category: "smartphone".into(),
            lesson_id: LessonId::new("l1"),
            completed_steps: vec![],
            step_actions: vec![StepActions {
                step_id: StepId::new("s1"),
                action_items: items.iter().map(|i| ActionItemId::new(*i)).collect(),
            }],
        }
    }

    #[tokio::test]
    async fn required_item_completes_lesson() {
        let service = service().await;
        let response = service
            .submit_batch(UserId::new(1), &batch(&["required1"]))
            .await
            .unwrap();
        assert!(response.progress.completed());
        assert_eq!(response.overall.total_lessons_completed(), 1);
    }

    #[tokio::test]
    async fn unknown_category_is_invalid_argument() {
        let service = service().await;
        let mut request = batch(&["required1"]);
        request.category = "gardening".into();
        let err = service.submit_batch(UserId::new(1), &request).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::InvalidCategory(_)));
    }

    #[tokio::test]
    async fn lesson_in_other_category_is_not_found() {
        let service = service().await;
        let mut request = batch(&["required1"]);
        request.category = "safety".into();
        let err = service.submit_batch(UserId::new(1), &request).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::LessonNotFound(_)));
    }

    #[tokio::test]
    async fn create_user_twice_fails() {
        let service = service().await;
        let err = service.create_user(UserId::new(1)).await.unwrap_err();
        assert!(matches!(err, ProgressServiceError::UserExists(_)));
    }

    #[tokio::test]
    async fn blank_lesson_id_is_invalid_payload() {
        let service = service().await;
        let err = service
            .save_for_later(
                UserId::new(1),
                &SaveForLaterRequest {
                    category: "smartphone".into(),
                    lesson_id: LessonId::new(" "),
                    saved: true,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProgressServiceError::InvalidPayload(PayloadError::EmptyLessonId)
        ));
    }

    #[test]
    fn storage_conflict_maps_to_retryable_conflict() {
        let err = save_error(
            UserId::new(1),
            StorageError::Conflict {
                expected: 2,
                found: 3,
            },
        );
        assert!(matches!(err, ProgressServiceError::Conflict { .. }));
        assert!(err.is_retryable());
        assert!(!ProgressServiceError::UserNotFound(UserId::new(1)).is_retryable());
    }

    #[test]
    fn only_connection_failures_are_retryable_persistence_errors() {
        let unreachable = save_error(UserId::new(1), StorageError::Connection("closed".into()));
        assert!(unreachable.is_retryable());

        let corrupt = save_error(UserId::new(1), StorageError::Serialization("bad json".into()));
        assert!(matches!(corrupt, ProgressServiceError::Persistence(_)));
        assert!(!corrupt.is_retryable());
    }
}
