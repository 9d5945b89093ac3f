//! Lesson completion rule.
//!
//! A lesson is complete when every required action item of every step has
//! been checked. Steps without required items are satisfied vacuously, so a
//! lesson with no required items anywhere is always complete.
//!
//! This is the only implementation of the rule. The server derives the
//! authoritative flag with it and the client reducer uses it to predict.

use std::collections::BTreeSet;

use crate::model::{ActionItemId, LessonDefinition, Step, StepId, StepProgressMap};

/// Outcome of evaluating a lesson against recorded step state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Evaluation {
    pub completed: bool,
    pub completed_steps: BTreeSet<StepId>,
}

/// True when every required item of `step` is in `completed_items`.
///
/// `None` means no completions were recorded for the step.
#[must_use]
pub fn step_satisfied(step: &Step, completed_items: Option<&BTreeSet<ActionItemId>>) -> bool {
    match completed_items {
        Some(done) => step.required_items().all(|item| done.contains(item)),
        None => step.required_items().next().is_none(),
    }
}

/// Derive lesson completion and the set of satisfied steps.
///
/// Entries in `progress` for steps the lesson does not define are ignored.
#[must_use]
pub fn evaluate(definition: &LessonDefinition, progress: &StepProgressMap) -> Evaluation {
    let completed_steps: BTreeSet<StepId> = definition
        .steps()
        .iter()
        .filter(|step| {
            step_satisfied(
                step,
                progress.get(step.id()).map(|entry| &entry.completed_items),
            )
        })
        .map(|step| step.id().clone())
        .collect();

    Evaluation {
        completed: completed_steps.len() == definition.steps().len(),
        completed_steps,
    }
}
