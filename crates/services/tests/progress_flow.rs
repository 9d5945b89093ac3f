use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use literacy_core::model::{
    ActionItem, ActionItemId, Category, LessonDefinition, LessonId, Step, StepId, UserId,
    UserProgress,
};
use literacy_core::sync::{
    BatchSyncRequest, BatchSyncResponse, MentorHelpRequest, QuizScoreRequest, SaveForLaterRequest,
    StepActions,
};
use literacy_core::time::fixed_now;
use services::{AppServices, Clock, ProgressService, ProgressServiceError};
use storage::repository::{InMemoryRepository, ProgressRepository, Storage, StorageError};
use storage::sqlite::SqliteRepository;

const USER: UserId = UserId::new(42);

fn lesson(id: &str) -> LessonDefinition {
    LessonDefinition::new(
        id,
        Category::Smartphone,
        format!("Lesson {id}"),
        vec![Step::new(
            "s1",
            "Do the thing",
            vec![
                ActionItem::required("required1", "The part that counts"),
                ActionItem::optional("optional1", "The part that does not"),
            ],
        )],
    )
    .unwrap()
}

fn catalog() -> Vec<LessonDefinition> {
    ["l1", "l2", "l3", "l4", "l5"].into_iter().map(lesson).collect()
}

fn batch(lesson_id: &str, items: &[&str]) -> BatchSyncRequest {
    BatchSyncRequest {
        category: "smartphone".into(),
        lesson_id: LessonId::new(lesson_id),
        completed_steps: vec![],
        step_actions: vec![StepActions {
            step_id: StepId::new("s1"),
            action_items: items.iter().map(|item| ActionItemId::new(*item)).collect(),
        }],
    }
}

async fn in_memory_service(clock: Clock) -> (ProgressService, Storage) {
    let storage = Storage::from_in_memory(InMemoryRepository::with_lessons(catalog()));
    let service = ProgressService::from_storage(clock, &storage);
    service.create_user(USER).await.unwrap();
    (service, storage)
}

#[tokio::test]
async fn optional_items_alone_do_not_complete() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    let response = service
        .submit_batch(USER, &batch("l1", &["optional1"]))
        .await
        .unwrap();
    assert!(!response.progress.completed());
    assert!(response.progress.completed_steps().is_empty());
    assert_eq!(response.overall.total_lessons_completed(), 0);
}

#[tokio::test]
async fn completion_flips_move_counter_both_ways() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    for id in ["l1", "l2"] {
        service.submit_batch(USER, &batch(id, &["required1"])).await.unwrap();
    }

    let third = service
        .submit_batch(USER, &batch("l3", &["required1", "optional1"]))
        .await
        .unwrap();
    assert_eq!(third.overall.total_lessons_completed(), 3);

    let undone = service
        .submit_batch(USER, &batch("l3", &["optional1"]))
        .await
        .unwrap();
    assert!(!undone.progress.completed());
    assert_eq!(undone.overall.total_lessons_completed(), 2);
}

#[tokio::test]
async fn resubmitting_same_payload_counts_once() {
    let mut clock = Clock::fixed(fixed_now());
    let (first_service, storage) = in_memory_service(clock).await;
    let first = first_service
        .submit_batch(USER, &batch("l1", &["required1"]))
        .await
        .unwrap();

    clock.advance(Duration::seconds(30));
    let second_service = ProgressService::from_storage(clock, &storage);
    let second = second_service
        .submit_batch(USER, &batch("l1", &["required1"]))
        .await
        .unwrap();

    assert_eq!(second.overall.total_lessons_completed(), 1);
    assert_eq!(first.progress.step_progress(), second.progress.step_progress());
    assert_eq!(first.progress.completed_steps(), second.progress.completed_steps());
    assert!(second.progress.last_accessed() > first.progress.last_accessed());
}

#[tokio::test]
async fn quiz_keeps_only_latest_score() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    for score in [80, 95] {
        service
            .update_quiz_score(
                USER,
                &QuizScoreRequest {
                    category: "smartphone".into(),
                    lesson_id: LessonId::new("l2"),
                    score,
                },
            )
            .await
            .unwrap();
    }

    let progress = service.category_progress(USER, "smartphone").await.unwrap();
    let record = &progress.lessons[0];
    assert_eq!(record.quiz_scores().len(), 1);
    assert_eq!(record.quiz_scores()[0].score, 95);
    assert!((progress.overall.average_quiz_score() - 95.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn quiz_score_above_hundred_is_rejected() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    let err = service
        .update_quiz_score(
            USER,
            &QuizScoreRequest {
                category: "smartphone".into(),
                lesson_id: LessonId::new("l2"),
                score: 101,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::InvalidValue(_)));
}

#[tokio::test]
async fn rewound_clock_never_moves_timestamps_back() {
    let start = fixed_now();
    let (service, storage) = in_memory_service(Clock::fixed(start)).await;
    let first = service
        .submit_batch(USER, &batch("l1", &["required1"]))
        .await
        .unwrap();

    let rewound = ProgressService::from_storage(Clock::fixed(start - Duration::hours(2)), &storage);
    let second = rewound
        .submit_batch(USER, &batch("l1", &["optional1"]))
        .await
        .unwrap();

    assert_eq!(second.progress.last_accessed(), first.progress.last_accessed());
    assert!(second.overall.last_activity_date() >= first.overall.last_activity_date());
}

#[tokio::test]
async fn flag_updates_create_lesson_records_and_feed_summary() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    service
        .save_for_later(
            USER,
            &SaveForLaterRequest {
                category: "smartphone".into(),
                lesson_id: LessonId::new("l4"),
                saved: true,
            },
        )
        .await
        .unwrap();
    let helped = service
        .request_mentor_help(
            USER,
            &MentorHelpRequest {
                category: "smartphone".into(),
                lesson_id: LessonId::new("l5"),
                notes: Some("Where is the side button?".into()),
            },
        )
        .await
        .unwrap();
    assert!(helped.needs_mentor_help());
    assert_eq!(helped.mentor_notes(), Some("Where is the side button?"));
    service.submit_batch(USER, &batch("l1", &["required1"])).await.unwrap();

    let summary = service.category_summary(USER, "Smartphone").await.unwrap();
    assert_eq!(summary.lessons_total, 5);
    assert_eq!(summary.lessons_completed, 1);
    assert!((summary.percent_complete - 20.0).abs() < f64::EPSILON);
    assert_eq!(summary.saved_for_later, vec![LessonId::new("l4")]);
    assert_eq!(summary.needs_mentor_help, vec![LessonId::new("l5")]);
}

#[tokio::test]
async fn unknown_lesson_changes_nothing() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    let err = service
        .submit_batch(USER, &batch("missing", &["required1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::LessonNotFound(_)));

    let progress = service.category_progress(USER, "smartphone").await.unwrap();
    assert!(progress.lessons.is_empty());
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    let err = service
        .submit_batch(UserId::new(7), &batch("l1", &["required1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ProgressServiceError::UserNotFound(_)));
}

#[tokio::test]
async fn counter_matches_completed_lessons_after_every_operation() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    let steps: [(&str, &[&str]); 5] = [
        ("l1", &["required1"]),
        ("l2", &["required1"]),
        ("l1", &[]),
        ("l3", &["required1"]),
        ("l2", &["optional1"]),
    ];

    for (lesson_id, items) in steps {
        let response = service.submit_batch(USER, &batch(lesson_id, items)).await.unwrap();
        let progress = service.category_progress(USER, "smartphone").await.unwrap();
        let completed = progress.lessons.iter().filter(|l| l.completed()).count();
        assert_eq!(response.overall.total_lessons_completed() as usize, completed);
    }

    let overall = service.reconcile(USER).await.unwrap();
    assert_eq!(overall.total_lessons_completed(), 1);
}

#[tokio::test]
async fn sqlite_backend_persists_batches() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_services_flow?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    for lesson in catalog() {
        repo.upsert_lesson(&lesson).await.unwrap();
    }

    let app = AppServices::from_storage(Storage::from_sqlite(repo), Clock::fixed(fixed_now()));
    let service = app.progress();
    service.create_user(USER).await.unwrap();
    service.submit_batch(USER, &batch("l2", &["required1"])).await.unwrap();

    let reloaded = app.storage().progress.load_user(USER).await.unwrap().unwrap();
    assert_eq!(reloaded.version(), 1);
    assert_eq!(reloaded.overall().total_lessons_completed(), 1);
    assert!(
        reloaded
            .lesson(Category::Smartphone, &LessonId::new("l2"))
            .unwrap()
            .completed()
    );
}

#[tokio::test]
async fn camel_case_json_payload_round_trips_through_the_service() {
    let (service, _) = in_memory_service(Clock::fixed(fixed_now())).await;
    let request: BatchSyncRequest = serde_json::from_str(
        r#"{
            "category": "smartphone",
            "lessonId": "l3",
            "completedSteps": ["s1"],
            "stepActions": [{ "stepId": "s1", "actionItems": ["required1", "required1"] }]
        }"#,
    )
    .unwrap();

    let response = service.submit_batch(USER, &request).await.unwrap();
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["progress"]["lessonId"], "l3");
    assert_eq!(json["progress"]["completed"], true);
    assert_eq!(json["progress"]["completedSteps"], serde_json::json!(["s1"]));
    assert_eq!(json["overall"]["totalLessonsCompleted"], 1);

    let decoded: BatchSyncResponse = serde_json::from_value(json).unwrap();
    assert_eq!(decoded, response);
}

/// Delegates to the in-memory store but fails every save with `error`.
struct FailingSaves {
    inner: InMemoryRepository,
    error: fn() -> StorageError,
}

#[async_trait]
impl ProgressRepository for FailingSaves {
    async fn insert_user(&self, progress: &UserProgress) -> Result<(), StorageError> {
        self.inner.insert_user(progress).await
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError> {
        self.inner.load_user(user_id).await
    }

    async fn save_user(&self, _progress: &UserProgress) -> Result<u64, StorageError> {
        Err((self.error)())
    }
}

#[tokio::test]
async fn failed_save_reports_error_and_leaves_stored_aggregate_untouched() {
    let cases: [(fn() -> StorageError, fn(&ProgressServiceError) -> bool); 2] = [
        (
            || StorageError::Connection("database is locked".into()),
            |err| matches!(err, ProgressServiceError::Persistence(_)),
        ),
        (
            || StorageError::Conflict {
                expected: 0,
                found: 1,
            },
            |err| matches!(err, ProgressServiceError::Conflict { .. }),
        ),
    ];

    for (error, expected) in cases {
        let repo = InMemoryRepository::with_lessons(catalog());
        let service = ProgressService::new(
            Clock::fixed(fixed_now()),
            Arc::new(FailingSaves {
                inner: repo.clone(),
                error,
            }),
            Arc::new(repo.clone()),
        );
        service.create_user(USER).await.unwrap();
        let before = repo.load_user(USER).await.unwrap().unwrap();

        let err = service
            .submit_batch(USER, &batch("l1", &["required1"]))
            .await
            .unwrap_err();
        assert!(expected(&err), "unexpected error: {err}");
        assert!(err.is_retryable());

        let after = repo.load_user(USER).await.unwrap().unwrap();
        assert_eq!(after, before);
        assert_eq!(after.overall().total_lessons_completed(), 0);
        assert!(after.lessons_in(Category::Smartphone).is_empty());
    }
}
