//! Recompute the overall counters from the per-lesson records.
//!
//! The incremental adjustment done during batch updates can drift after a
//! partial failure or an out-of-band edit. Reconciliation is a full scan of
//! one user's lessons and always overwrites the counters with ground truth.

use chrono::{DateTime, Utc};

use crate::model::{OverallProgress, UserProgress};

/// Mismatch between the stored counter and the recomputed count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drift {
    pub recorded: u32,
    pub actual: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    pub overall: OverallProgress,
    pub drift: Option<Drift>,
}

/// Number of completed lessons across every category.
#[must_use]
pub fn count_completed(progress: &UserProgress) -> u32 {
    let count = progress
        .iter_lessons()
        .filter(|(_, lesson)| lesson.completed())
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Mean of the retained score per lesson, over lessons that have one.
///
/// Returns `0.0` when no lesson has been scored.
#[must_use]
pub fn average_quiz_score(progress: &UserProgress) -> f64 {
    let (sum, count) = progress
        .iter_lessons()
        .filter_map(|(_, lesson)| lesson.latest_quiz_score())
        .fold((0_u64, 0_u32), |(sum, count), quiz| {
            (sum + u64::from(quiz.score), count + 1)
        });

    if count == 0 {
        return 0.0;
    }

    // Sums of at most `u32::MAX * 100` are exactly representable in an f64.
    #[allow(clippy::cast_precision_loss)]
    let sum = sum as f64;
    sum / f64::from(count)
}

/// Overwrite the user's counters with values derived from the lesson records.
pub fn reconcile(progress: &mut UserProgress, now: DateTime<Utc>) -> Reconciliation {
    let actual = count_completed(progress);
    let average = average_quiz_score(progress);

    let overall = progress.overall_mut();
    let recorded = overall.total_lessons_completed();
    let drift = (recorded != actual).then_some(Drift { recorded, actual });

    overall.set_total_lessons_completed(actual);
    overall.set_average_quiz_score(average);
    overall.touch(now);

    Reconciliation {
        overall: *overall,
        drift,
    }
}
