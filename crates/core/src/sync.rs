//! Request and response shapes exchanged between the app and the progress
//! service.
//!
//! Categories travel as plain strings so an unrecognized value can be
//! rejected as an invalid argument instead of failing deserialization.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::model::{
    ActionItemId, Category, CategoryParseError, LessonDefinition, LessonId, LessonProgress,
    OverallProgress, StepId, StepProgress, StepProgressMap,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PayloadError {
    #[error("lesson id cannot be empty")]
    EmptyLessonId,

    #[error("step {0} appears more than once in stepActions")]
    DuplicateStep(StepId),

    #[error("step {step} is not part of lesson {lesson}")]
    UnknownStep { lesson: LessonId, step: StepId },

    #[error("action item {item} is not part of step {step}")]
    UnknownItem { step: StepId, item: ActionItemId },
}

/// Parse a category name coming from a request.
///
/// # Errors
///
/// Returns `CategoryParseError` for names outside the recognized set.
pub fn parse_category(raw: &str) -> Result<Category, CategoryParseError> {
    raw.parse()
}

//
// ─── BATCH SYNC ────────────────────────────────────────────────────────────────
//

/// Checked action items for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepActions {
    pub step_id: StepId,
    pub action_items: Vec<ActionItemId>,
}

/// Full replacement of a lesson's step state.
///
/// `completed_steps` is the client's own view and is only used for
/// diagnostics; the server derives completion itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncRequest {
    pub category: String,
    pub lesson_id: LessonId,
    pub completed_steps: Vec<StepId>,
    pub step_actions: Vec<StepActions>,
}

impl BatchSyncRequest {
    /// Validate the payload against the lesson and build the step state map.
    ///
    /// Duplicate item ids inside one step collapse; steps with no checked
    /// items get no entry.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError` for a blank lesson id, a repeated step, or a
    /// step or item the lesson does not define.
    pub fn to_step_progress(
        &self,
        definition: &LessonDefinition,
    ) -> Result<StepProgressMap, PayloadError> {
        if self.lesson_id.is_blank() {
            return Err(PayloadError::EmptyLessonId);
        }

        let mut map = StepProgressMap::new();
        let mut seen = BTreeSet::new();
        for entry in &self.step_actions {
            if !seen.insert(&entry.step_id) {
                return Err(PayloadError::DuplicateStep(entry.step_id.clone()));
            }
            let step = definition
                .step(&entry.step_id)
                .ok_or_else(|| PayloadError::UnknownStep {
                    lesson: definition.id().clone(),
                    step: entry.step_id.clone(),
                })?;

            let mut items = BTreeSet::new();
            for item in &entry.action_items {
                if !step.has_item(item) {
                    return Err(PayloadError::UnknownItem {
                        step: entry.step_id.clone(),
                        item: item.clone(),
                    });
                }
                items.insert(item.clone());
            }

            if !items.is_empty() {
                map.insert(
                    entry.step_id.clone(),
                    StepProgress::new(entry.step_id.clone(), items),
                );
            }
        }
        Ok(map)
    }

    /// Client-claimed completed steps, deduplicated.
    #[must_use]
    pub fn claimed_steps(&self) -> BTreeSet<StepId> {
        self.completed_steps.iter().cloned().collect()
    }
}

/// Authoritative snapshot returned after a batch sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    pub progress: LessonProgress,
    pub overall: OverallProgress,
}

//
// ─── SINGLE-FIELD UPDATES ──────────────────────────────────────────────────────
//

fn saved_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveForLaterRequest {
    pub category: String,
    pub lesson_id: LessonId,
    #[serde(default = "saved_default")]
    pub saved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorHelpRequest {
    pub category: String,
    pub lesson_id: LessonId,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScoreRequest {
    pub category: String,
    pub lesson_id: LessonId,
    pub score: u8,
}

//
// ─── READ VIEWS ────────────────────────────────────────────────────────────────
//

/// Every lesson record the user has in one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryProgress {
    pub category: Category,
    pub lessons: Vec<LessonProgress>,
    pub overall: OverallProgress,
}

/// Completed lessons against the lessons the catalog offers in a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category: Category,
    pub lessons_total: u32,
    pub lessons_completed: u32,
    pub percent_complete: f64,
    pub saved_for_later: Vec<LessonId>,
    pub needs_mentor_help: Vec<LessonId>,
}

impl CategorySummary {
    /// Build a summary from the catalog lessons and the user's records.
    ///
    /// Records for lessons no longer in the catalog are not counted.
    #[must_use]
    pub fn from_records(
        category: Category,
        catalog: &[LessonDefinition],
        records: &[LessonProgress],
    ) -> Self {
        let by_id: BTreeMap<&LessonId, &LessonProgress> = records
            .iter()
            .map(|record| (record.lesson_id(), record))
            .collect();

        let mut completed = 0_u32;
        let mut saved_for_later = Vec::new();
        let mut needs_mentor_help = Vec::new();
        for lesson in catalog {
            let Some(record) = by_id.get(lesson.id()) else {
                continue;
            };
            if record.completed() {
                completed += 1;
            }
            if record.saved_for_later() {
                saved_for_later.push(lesson.id().clone());
            }
            if record.needs_mentor_help() {
                needs_mentor_help.push(lesson.id().clone());
            }
        }

        let total = u32::try_from(catalog.len()).unwrap_or(u32::MAX);
        let percent_complete = if total == 0 {
            0.0
        } else {
            f64::from(completed) * 100.0 / f64::from(total)
        };

        Self {
            category,
            lessons_total: total,
            lessons_completed: completed,
            percent_complete,
            saved_for_later,
            needs_mentor_help,
        }
    }
}
