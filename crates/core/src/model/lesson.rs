use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::category::Category;
use crate::model::ids::{ActionItemId, LessonId, StepId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonDefinitionError {
    #[error("lesson id cannot be empty")]
    EmptyLessonId,

    #[error("step id cannot be empty in lesson {lesson}")]
    EmptyStepId { lesson: LessonId },

    #[error("action item id cannot be empty in step {step}")]
    EmptyItemId { step: StepId },

    #[error("duplicate step {step} in lesson {lesson}")]
    DuplicateStep { lesson: LessonId, step: StepId },

    #[error("duplicate action item {item} in step {step}")]
    DuplicateItem { step: StepId, item: ActionItemId },
}

//
// ─── CONTENT ───────────────────────────────────────────────────────────────────
//

/// Smallest trackable unit of work inside a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    item_id: ActionItemId,
    task: String,
    is_required: bool,
}

impl ActionItem {
    #[must_use]
    pub fn new(item_id: impl Into<ActionItemId>, task: impl Into<String>, is_required: bool) -> Self {
        Self {
            item_id: item_id.into(),
            task: task.into(),
            is_required,
        }
    }

    #[must_use]
    pub fn required(item_id: impl Into<ActionItemId>, task: impl Into<String>) -> Self {
        Self::new(item_id, task, true)
    }

    #[must_use]
    pub fn optional(item_id: impl Into<ActionItemId>, task: impl Into<String>) -> Self {
        Self::new(item_id, task, false)
    }

    #[must_use]
    pub fn id(&self) -> &ActionItemId {
        &self.item_id
    }

    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.is_required
    }
}

/// A named segment of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    step_id: StepId,
    #[serde(default)]
    title: String,
    action_items: Vec<ActionItem>,
}

impl Step {
    #[must_use]
    pub fn new(step_id: impl Into<StepId>, title: impl Into<String>, action_items: Vec<ActionItem>) -> Self {
        Self {
            step_id: step_id.into(),
            title: title.into(),
            action_items,
        }
    }

    #[must_use]
    pub fn id(&self) -> &StepId {
        &self.step_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn action_items(&self) -> &[ActionItem] {
        &self.action_items
    }

    /// Items that must be checked for the step to count as done.
    pub fn required_items(&self) -> impl Iterator<Item = &ActionItemId> {
        self.action_items
            .iter()
            .filter(|item| item.is_required())
            .map(ActionItem::id)
    }

    #[must_use]
    pub fn has_item(&self, item_id: &ActionItemId) -> bool {
        self.action_items.iter().any(|item| item.id() == item_id)
    }
}

/// Immutable lesson definition supplied by the content catalog.
///
/// Construction validates that step ids are unique within the lesson and
/// item ids unique within their step; the completion rule relies on both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawLessonDefinition")]
pub struct LessonDefinition {
    lesson_id: LessonId,
    category: Category,
    title: String,
    steps: Vec<Step>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLessonDefinition {
    lesson_id: LessonId,
    category: Category,
    #[serde(default)]
    title: String,
    steps: Vec<Step>,
}

impl TryFrom<RawLessonDefinition> for LessonDefinition {
    type Error = LessonDefinitionError;

    fn try_from(raw: RawLessonDefinition) -> Result<Self, Self::Error> {
        Self::new(raw.lesson_id, raw.category, raw.title, raw.steps)
    }
}

impl LessonDefinition {
    /// Build a validated lesson definition.
    ///
    /// # Errors
    ///
    /// Returns `LessonDefinitionError` for blank ids or duplicate step/item ids.
    pub fn new(
        lesson_id: impl Into<LessonId>,
        category: Category,
        title: impl Into<String>,
        steps: Vec<Step>,
    ) -> Result<Self, LessonDefinitionError> {
        let lesson_id = lesson_id.into();
        if lesson_id.is_blank() {
            return Err(LessonDefinitionError::EmptyLessonId);
        }

        let mut seen_steps = HashSet::new();
        for step in &steps {
            if step.id().is_blank() {
                return Err(LessonDefinitionError::EmptyStepId {
                    lesson: lesson_id.clone(),
                });
            }
            if !seen_steps.insert(step.id()) {
                return Err(LessonDefinitionError::DuplicateStep {
                    lesson: lesson_id.clone(),
                    step: step.id().clone(),
                });
            }

            let mut seen_items = HashSet::new();
            for item in step.action_items() {
                if item.id().is_blank() {
                    return Err(LessonDefinitionError::EmptyItemId {
                        step: step.id().clone(),
                    });
                }
                if !seen_items.insert(item.id()) {
                    return Err(LessonDefinitionError::DuplicateItem {
                        step: step.id().clone(),
                        item: item.id().clone(),
                    });
                }
            }
        }

        Ok(Self {
            lesson_id,
            category,
            title: title.into(),
            steps,
        })
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.lesson_id
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn step(&self, step_id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|step| step.id() == step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, items: Vec<ActionItem>) -> Step {
        Step::new(id, "", items)
    }

    #[test]
    fn rejects_duplicate_steps() {
        let err = LessonDefinition::new(
            "l1",
            Category::Internet,
            "Browsing",
            vec![step("s1", vec![]), step("s1", vec![])],
        )
        .unwrap_err();
        assert!(matches!(err, LessonDefinitionError::DuplicateStep { .. }));
    }

    #[test]
    fn rejects_duplicate_items_within_step() {
        let err = LessonDefinition::new(
            "l1",
            Category::Internet,
            "Browsing",
            vec![step(
                "s1",
                vec![ActionItem::required("a", "x"), ActionItem::optional("a", "y")],
            )],
        )
        .unwrap_err();
        assert!(matches!(err, LessonDefinitionError::DuplicateItem { .. }));
    }

    #[test]
    fn same_item_id_allowed_in_different_steps() {
        let lesson = LessonDefinition::new(
            "l1",
            Category::Safety,
            "",
            vec![
                step("s1", vec![ActionItem::required("a", "x")]),
                step("s2", vec![ActionItem::required("a", "y")]),
            ],
        )
        .unwrap();
        assert_eq!(lesson.steps().len(), 2);
    }

    #[test]
    fn deserialization_runs_validation() {
        let json = r#"{
            "lessonId": "",
            "category": "safety",
            "steps": []
        }"#;
        assert!(serde_json::from_str::<LessonDefinition>(json).is_err());

        let json = r#"{
            "lessonId": "scam-calls",
            "category": "safety",
            "title": "Spotting scam calls",
            "steps": [{
                "stepId": "s1",
                "actionItems": [
                    {"itemId": "hang-up", "task": "Hang up", "isRequired": true},
                    {"itemId": "note", "task": "Write it down", "isRequired": false}
                ]
            }]
        }"#;
        let lesson: LessonDefinition = serde_json::from_str(json).unwrap();
        let required: Vec<_> = lesson.steps()[0].required_items().collect();
        assert_eq!(required, vec![&ActionItemId::new("hang-up")]);
    }
}
