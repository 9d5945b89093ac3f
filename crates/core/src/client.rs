//! Client-side mirror of one lesson's progress.
//!
//! The reducer holds optimistic local edits between syncs. It predicts step
//! and lesson completion with the shared evaluator, but the server snapshot
//! always replaces local state once a save succeeds.

use std::collections::BTreeSet;
use thiserror::Error;

use crate::evaluator::{Evaluation, evaluate, step_satisfied};
use crate::model::{
    ActionItemId, Category, LessonDefinition, LessonProgress, StepId, StepProgress,
    StepProgressMap,
};
use crate::sync::{BatchSyncRequest, StepActions};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ToggleError {
    #[error("step {0} is not part of this lesson")]
    UnknownStep(StepId),
    #[error("action item {item} is not part of step {step}")]
    UnknownItem { step: StepId, item: ActionItemId },
}

#[derive(Debug, Clone)]
pub struct ProgressReducer {
    category: Category,
    definition: LessonDefinition,
    completed_steps: BTreeSet<StepId>,
    completed_step_actions: BTreeSet<(StepId, ActionItemId)>,
    dirty: bool,
}

impl ProgressReducer {
    /// Start from an empty state, as for a lesson never opened before.
    #[must_use]
    pub fn new(category: Category, definition: LessonDefinition) -> Self {
        let completed_steps = evaluate(&definition, &StepProgressMap::new()).completed_steps;
        Self {
            category,
            definition,
            completed_steps,
            completed_step_actions: BTreeSet::new(),
            dirty: false,
        }
    }

    /// Seed local state from the last server snapshot.
    #[must_use]
    pub fn from_snapshot(
        category: Category,
        definition: LessonDefinition,
        snapshot: &LessonProgress,
    ) -> Self {
        let mut reducer = Self::new(category, definition);
        reducer.apply_snapshot(snapshot);
        reducer
    }

    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    #[must_use]
    pub fn definition(&self) -> &LessonDefinition {
        &self.definition
    }

    #[must_use]
    pub fn completed_steps(&self) -> &BTreeSet<StepId> {
        &self.completed_steps
    }

    #[must_use]
    pub fn is_checked(&self, step_id: &StepId, item_id: &ActionItemId) -> bool {
        self.completed_step_actions
            .contains(&(step_id.clone(), item_id.clone()))
    }

    #[must_use]
    pub fn is_step_complete(&self, step_id: &StepId) -> bool {
        self.completed_steps.contains(step_id)
    }

    /// True when local edits have not yet been confirmed by the server.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flip one action item and update the owning step's predicted state.
    ///
    /// Returns whether the item is now checked.
    ///
    /// # Errors
    ///
    /// Returns `ToggleError` if the step or item is not in the lesson.
    pub fn toggle(&mut self, step_id: &StepId, item_id: &ActionItemId) -> Result<bool, ToggleError> {
        let step = self
            .definition
            .step(step_id)
            .ok_or_else(|| ToggleError::UnknownStep(step_id.clone()))?;
        if !step.has_item(item_id) {
            return Err(ToggleError::UnknownItem {
                step: step_id.clone(),
                item: item_id.clone(),
            });
        }

        let key = (step_id.clone(), item_id.clone());
        let checked = if self.completed_step_actions.remove(&key) {
            false
        } else {
            self.completed_step_actions.insert(key);
            true
        };

        let done = self.items_for(step_id);
        let satisfied = step_satisfied(step, (!done.is_empty()).then_some(&done));
        if satisfied {
            self.completed_steps.insert(step_id.clone());
        } else {
            self.completed_steps.remove(step_id);
        }

        self.dirty = true;
        Ok(checked)
    }

    /// Predicted completion using the same rule the server applies.
    #[must_use]
    pub fn predicted(&self) -> Evaluation {
        evaluate(&self.definition, &self.step_progress())
    }

    /// Local edits as a step state map.
    #[must_use]
    pub fn step_progress(&self) -> StepProgressMap {
        let mut map = StepProgressMap::new();
        for (step_id, item_id) in &self.completed_step_actions {
            map.entry(step_id.clone())
                .or_insert_with(|| StepProgress::new(step_id.clone(), BTreeSet::new()))
                .completed_items
                .insert(item_id.clone());
        }
        map
    }

    /// Full replacement payload for the current local state.
    #[must_use]
    pub fn sync_request(&self) -> BatchSyncRequest {
        let step_actions = self
            .step_progress()
            .into_values()
            .map(|entry| StepActions {
                step_id: entry.step_id,
                action_items: entry.completed_items.into_iter().collect(),
            })
            .collect();

        BatchSyncRequest {
            category: self.category.to_string(),
            lesson_id: self.definition.id().clone(),
            completed_steps: self.completed_steps.iter().cloned().collect(),
            step_actions,
        }
    }

    /// Replace local state with a server snapshot and clear the dirty flag.
    ///
    /// A record that never went through a batch sync (created by a flag or
    /// quiz update) carries no derived steps, so those are re-derived from
    /// the empty state, as `new` does.
    pub fn apply_snapshot(&mut self, snapshot: &LessonProgress) {
        self.completed_steps = if snapshot.step_progress().is_empty() {
            evaluate(&self.definition, snapshot.step_progress()).completed_steps
        } else {
            snapshot.completed_steps().clone()
        };
        self.completed_step_actions = snapshot
            .step_progress()
            .values()
            .flat_map(|entry| {
                entry
                    .completed_items
                    .iter()
                    .map(|item| (entry.step_id.clone(), item.clone()))
            })
            .collect();
        self.dirty = false;
    }

    fn items_for(&self, step_id: &StepId) -> BTreeSet<ActionItemId> {
        self.completed_step_actions
            .iter()
            .filter(|(step, _)| step == step_id)
            .map(|(_, item)| item.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionItem, LessonId, Step};
    use crate::time::fixed_now;

    fn lesson() -> LessonDefinition {
        LessonDefinition::new(
            "wifi",
            Category::Internet,
            "Joining Wi-Fi",
            vec![
                Step::new(
                    "s1",
                    "Open settings",
                    vec![
                        ActionItem::required("required1", "Tap Settings"),
                        ActionItem::optional("optional1", "Pin Settings"),
                    ],
                ),
                Step::new("s2", "Pick network", vec![ActionItem::optional("o", "x")]),
            ],
        )
        .unwrap()
    }

    fn s(id: &str) -> StepId {
        StepId::new(id)
    }

    fn a(id: &str) -> ActionItemId {
        ActionItemId::new(id)
    }

    #[test]
    fn toggling_required_item_completes_step() {
        let mut reducer = ProgressReducer::new(Category::Internet, lesson());
        assert!(!reducer.is_dirty());

        assert!(reducer.toggle(&s("s1"), &a("required1")).unwrap());
        assert!(reducer.is_step_complete(&s("s1")));
        assert!(reducer.is_dirty());
        assert!(reducer.predicted().completed);

        assert!(!reducer.toggle(&s("s1"), &a("required1")).unwrap());
        assert!(!reducer.is_step_complete(&s("s1")));
        assert!(!reducer.predicted().completed);
    }

    #[test]
    fn steps_without_required_items_start_complete() {
        let mut reducer = ProgressReducer::new(Category::Internet, lesson());
        assert!(reducer.is_step_complete(&s("s2")));
        assert!(!reducer.is_step_complete(&s("s1")));
        reducer.toggle(&s("s2"), &a("o")).unwrap();
        assert!(reducer.is_step_complete(&s("s2")));
        reducer.toggle(&s("s2"), &a("o")).unwrap();
        assert!(reducer.is_step_complete(&s("s2")));
    }

    #[test]
    fn toggle_rejects_unknown_ids() {
        let mut reducer = ProgressReducer::new(Category::Internet, lesson());
        assert_eq!(
            reducer.toggle(&s("nope"), &a("required1")),
            Err(ToggleError::UnknownStep(s("nope")))
        );
        assert!(matches!(
            reducer.toggle(&s("s1"), &a("nope")),
            Err(ToggleError::UnknownItem { .. })
        ));
        assert!(!reducer.is_dirty());
    }

    #[test]
    fn sync_request_carries_full_state() {
        let mut reducer = ProgressReducer::new(Category::Internet, lesson());
        reducer.toggle(&s("s1"), &a("optional1")).unwrap();
        reducer.toggle(&s("s1"), &a("required1")).unwrap();

        let request = reducer.sync_request();
        assert_eq!(request.category, "internet");
        assert_eq!(request.lesson_id, LessonId::new("wifi"));
        assert_eq!(request.step_actions.len(), 1);
        assert_eq!(
            request.step_actions[0].action_items,
            vec![a("optional1"), a("required1")]
        );
        assert_eq!(request.completed_steps, vec![s("s1"), s("s2")]);
        assert_eq!(request.to_step_progress(&lesson()).unwrap(), reducer.step_progress());
    }

    #[test]
    fn snapshot_replaces_local_state() {
        let mut reducer = ProgressReducer::new(Category::Internet, lesson());
        reducer.toggle(&s("s1"), &a("optional1")).unwrap();

        let mut snapshot = LessonProgress::new(LessonId::new("wifi"), fixed_now());
        let mut map = StepProgressMap::new();
        map.insert(
            s("s1"),
            StepProgress::new(s("s1"), BTreeSet::from([a("required1")])),
        );
        let evaluation = evaluate(&lesson(), &map);
        snapshot.replace_steps(map, evaluation);

        reducer.apply_snapshot(&snapshot);
        assert!(!reducer.is_dirty());
        assert!(reducer.is_checked(&s("s1"), &a("required1")));
        assert!(!reducer.is_checked(&s("s1"), &a("optional1")));
        assert_eq!(reducer.completed_steps(), snapshot.completed_steps());
    }

    #[test]
    fn flag_only_snapshot_keeps_steps_without_required_items_complete() {
        let mut flagged = LessonProgress::new(LessonId::new("wifi"), fixed_now());
        flagged.set_saved_for_later(true);
        assert!(flagged.completed_steps().is_empty());

        let reducer = ProgressReducer::from_snapshot(Category::Internet, lesson(), &flagged);
        assert!(reducer.is_step_complete(&s("s2")));
        assert!(!reducer.is_step_complete(&s("s1")));
        assert_eq!(reducer.completed_steps(), &reducer.predicted().completed_steps);
        assert!(!reducer.is_dirty());
    }
}
