mod category;
mod ids;
mod lesson;
mod progress;

pub use category::{Category, CategoryParseError};
pub use ids::{ActionItemId, LessonId, ParseIdError, StepId, UserId};
pub use lesson::{ActionItem, LessonDefinition, LessonDefinitionError, Step};
pub use progress::{
    CompletionChange, LessonProgress, MAX_QUIZ_SCORE, OverallProgress, ProgressError, QuizScore,
    StepProgress, StepProgressMap, UserProgress,
};
