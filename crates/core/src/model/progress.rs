use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::evaluator::{Evaluation, evaluate};
use crate::model::category::Category;
use crate::model::ids::{ActionItemId, LessonId, StepId, UserId};
use crate::model::lesson::LessonDefinition;
use crate::time::not_before;

/// Highest quiz score accepted, as a percentage.
pub const MAX_QUIZ_SCORE: u8 = 100;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("quiz score must be between 0 and {MAX_QUIZ_SCORE}, got {0}")]
    InvalidQuizScore(u8),
}

//
// ─── PER-STEP STATE ────────────────────────────────────────────────────────────
//

/// Completed action items recorded for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub step_id: StepId,
    pub completed_items: BTreeSet<ActionItemId>,
}

impl StepProgress {
    #[must_use]
    pub fn new(step_id: StepId, completed_items: BTreeSet<ActionItemId>) -> Self {
        Self {
            step_id,
            completed_items,
        }
    }
}

/// Recorded step state keyed by step id. Only steps with at least one
/// completed item have an entry.
pub type StepProgressMap = BTreeMap<StepId, StepProgress>;

/// A single quiz attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScore {
    pub score: u8,
    pub taken_at: DateTime<Utc>,
}

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// One learner's progress through one lesson.
///
/// `completed` and `completed_steps` are cached results of the completion
/// rule; they only change together with `step_progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    lesson_id: LessonId,
    completed: bool,
    last_accessed: DateTime<Utc>,
    completed_steps: BTreeSet<StepId>,
    step_progress: StepProgressMap,
    quiz_scores: Vec<QuizScore>,
    saved_for_later: bool,
    needs_mentor_help: bool,
    mentor_notes: Option<String>,
}

impl LessonProgress {
    /// Zero-valued record created on first interaction with a lesson.
    #[must_use]
    pub fn new(lesson_id: LessonId, now: DateTime<Utc>) -> Self {
        Self {
            lesson_id,
            completed: false,
            last_accessed: now,
            completed_steps: BTreeSet::new(),
            step_progress: StepProgressMap::new(),
            quiz_scores: Vec::new(),
            saved_for_later: false,
            needs_mentor_help: false,
            mentor_notes: None,
        }
    }

    /// Rehydrate a record from storage without re-deriving cached fields.
    #[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
    #[must_use]
    pub fn from_persisted(
        lesson_id: LessonId,
        completed: bool,
        last_accessed: DateTime<Utc>,
        completed_steps: BTreeSet<StepId>,
        step_progress: StepProgressMap,
        quiz_scores: Vec<QuizScore>,
        saved_for_later: bool,
        needs_mentor_help: bool,
        mentor_notes: Option<String>,
    ) -> Self {
        Self {
            lesson_id,
            completed,
            last_accessed,
            completed_steps,
            step_progress,
            quiz_scores,
            saved_for_later,
            needs_mentor_help,
            mentor_notes,
        }
    }

    #[must_use]
    pub fn lesson_id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.last_accessed
    }

    #[must_use]
    pub fn completed_steps(&self) -> &BTreeSet<StepId> {
        &self.completed_steps
    }

    #[must_use]
    pub fn step_progress(&self) -> &StepProgressMap {
        &self.step_progress
    }

    #[must_use]
    pub fn quiz_scores(&self) -> &[QuizScore] {
        &self.quiz_scores
    }

    #[must_use]
    pub fn latest_quiz_score(&self) -> Option<&QuizScore> {
        self.quiz_scores.last()
    }

    #[must_use]
    pub fn saved_for_later(&self) -> bool {
        self.saved_for_later
    }

    #[must_use]
    pub fn needs_mentor_help(&self) -> bool {
        self.needs_mentor_help
    }

    #[must_use]
    pub fn mentor_notes(&self) -> Option<&str> {
        self.mentor_notes.as_deref()
    }

    /// Replace all recorded step state and the cached completion view.
    pub fn replace_steps(&mut self, step_progress: StepProgressMap, evaluation: Evaluation) {
        self.step_progress = step_progress;
        self.completed_steps = evaluation.completed_steps;
        self.completed = evaluation.completed;
    }

    /// Bump `last_accessed`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = not_before(self.last_accessed, now);
    }

    pub fn set_saved_for_later(&mut self, value: bool) {
        self.saved_for_later = value;
    }

    pub fn request_mentor_help(&mut self, notes: Option<String>) {
        self.needs_mentor_help = true;
        self.mentor_notes = notes;
    }

    /// Keep only the newest attempt; earlier scores are discarded.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::InvalidQuizScore` above `MAX_QUIZ_SCORE`.
    pub fn record_quiz_score(
        &mut self,
        score: u8,
        taken_at: DateTime<Utc>,
    ) -> Result<(), ProgressError> {
        if score > MAX_QUIZ_SCORE {
            return Err(ProgressError::InvalidQuizScore(score));
        }
        self.quiz_scores = vec![QuizScore { score, taken_at }];
        Ok(())
    }
}

//
// ─── OVERALL PROGRESS ──────────────────────────────────────────────────────────
//

/// User-wide counters derived from the per-lesson records.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallProgress {
    total_lessons_completed: u32,
    average_quiz_score: f64,
    last_activity_date: DateTime<Utc>,
}

impl OverallProgress {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_lessons_completed: 0,
            average_quiz_score: 0.0,
            last_activity_date: now,
        }
    }

    #[must_use]
    pub fn from_persisted(
        total_lessons_completed: u32,
        average_quiz_score: f64,
        last_activity_date: DateTime<Utc>,
    ) -> Self {
        Self {
            total_lessons_completed,
            average_quiz_score,
            last_activity_date,
        }
    }

    #[must_use]
    pub fn total_lessons_completed(&self) -> u32 {
        self.total_lessons_completed
    }

    #[must_use]
    pub fn average_quiz_score(&self) -> f64 {
        self.average_quiz_score
    }

    #[must_use]
    pub fn last_activity_date(&self) -> DateTime<Utc> {
        self.last_activity_date
    }

    pub(crate) fn set_total_lessons_completed(&mut self, total: u32) {
        self.total_lessons_completed = total;
    }

    pub(crate) fn set_average_quiz_score(&mut self, average: f64) {
        self.average_quiz_score = average;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_date = not_before(self.last_activity_date, now);
    }
}

//
// ─── USER AGGREGATE ────────────────────────────────────────────────────────────
//

/// Completion transition produced by a batch update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionChange {
    pub was_completed: bool,
    pub completed: bool,
}

impl CompletionChange {
    #[must_use]
    pub fn flipped(&self) -> bool {
        self.was_completed != self.completed
    }
}

/// Everything persisted for one learner: the per-category lesson records,
/// the overall counters and the version used for compare-and-swap writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    user_id: UserId,
    overall: OverallProgress,
    lessons: BTreeMap<Category, Vec<LessonProgress>>,
    version: u64,
}

impl UserProgress {
    /// Fresh aggregate for a newly created user.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            overall: OverallProgress::new(now),
            lessons: BTreeMap::new(),
            version: 0,
        }
    }

    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        overall: OverallProgress,
        lessons: BTreeMap<Category, Vec<LessonProgress>>,
        version: u64,
    ) -> Self {
        Self {
            user_id,
            overall,
            lessons,
            version,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn overall(&self) -> &OverallProgress {
        &self.overall
    }

    pub(crate) fn overall_mut(&mut self) -> &mut OverallProgress {
        &mut self.overall
    }

    /// Version this aggregate was loaded at.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stamp the aggregate with the version the store assigned on write.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn lessons_in(&self, category: Category) -> &[LessonProgress] {
        self.lessons.get(&category).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn lesson(&self, category: Category, lesson_id: &LessonId) -> Option<&LessonProgress> {
        self.lessons_in(category)
            .iter()
            .find(|lesson| lesson.lesson_id() == lesson_id)
    }

    /// Every lesson record across all categories.
    pub fn iter_lessons(&self) -> impl Iterator<Item = (Category, &LessonProgress)> {
        self.lessons
            .iter()
            .flat_map(|(category, lessons)| lessons.iter().map(move |lesson| (*category, lesson)))
    }

    /// Return the record for `lesson_id`, appending a zero-valued one to the
    /// category collection if none exists yet.
    pub fn find_or_create_lesson(
        &mut self,
        category: Category,
        lesson_id: &LessonId,
        now: DateTime<Utc>,
    ) -> &mut LessonProgress {
        let lessons = self.lessons.entry(category).or_default();
        let index = match lessons.iter().position(|l| l.lesson_id() == lesson_id) {
            Some(index) => index,
            None => {
                lessons.push(LessonProgress::new(lesson_id.clone(), now));
                lessons.len() - 1
            }
        };
        &mut lessons[index]
    }

    /// Replace a lesson's step state wholesale and re-derive its completion.
    ///
    /// The overall counter is nudged by one on a completion flip; the caller
    /// still reconciles afterwards, which is what actually guarantees the
    /// counter matches the records.
    pub fn apply_batch(
        &mut self,
        category: Category,
        definition: &LessonDefinition,
        step_progress: StepProgressMap,
        now: DateTime<Utc>,
    ) -> CompletionChange {
        let evaluation = evaluate(definition, &step_progress);
        let lesson = self.find_or_create_lesson(category, definition.id(), now);
        let was_completed = lesson.completed();
        lesson.replace_steps(step_progress, evaluation);
        lesson.touch(now);
        let change = CompletionChange {
            was_completed,
            completed: lesson.completed(),
        };

        let total = self.overall.total_lessons_completed();
        match (change.was_completed, change.completed) {
            (false, true) => self.overall.set_total_lessons_completed(total.saturating_add(1)),
            (true, false) => self.overall.set_total_lessons_completed(total.saturating_sub(1)),
            _ => {}
        }
        change
    }
}
