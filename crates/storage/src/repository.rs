use async_trait::async_trait;
use literacy_core::model::{Category, LessonDefinition, LessonId, UserId, UserProgress};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    /// The stored aggregate moved on since it was loaded.
    #[error("version conflict: expected {expected}, found {found}")]
    Conflict { expected: u64, found: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable per-user progress aggregate.
///
/// Each write replaces the whole aggregate atomically and only succeeds if
/// the stored version still equals the version the caller loaded.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist a brand-new user aggregate.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` if the user is already stored.
    async fn insert_user(&self, progress: &UserProgress) -> Result<(), StorageError>;

    /// Load a user's aggregate.
    ///
    /// Returns `Ok(None)` when the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the aggregate cannot be read or decoded.
    async fn load_user(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError>;

    /// Replace the stored aggregate, returning the new version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown user and
    /// `StorageError::Conflict` when `progress.version()` is stale.
    async fn save_user(&self, progress: &UserProgress) -> Result<u64, StorageError>;
}

/// Read-only lesson catalog.
#[async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Fetch a lesson definition by id.
    ///
    /// Returns `Ok(None)` when the catalog has no such lesson.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn get_lesson_definition(
        &self,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonDefinition>, StorageError>;

    /// Lessons offered in a category, in authored order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the catalog cannot be read.
    async fn list_lessons(&self, category: Category)
    -> Result<Vec<LessonDefinition>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    users: Arc<Mutex<HashMap<UserId, UserProgress>>>,
    lessons: Arc<Mutex<Vec<LessonDefinition>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository whose catalog holds the given lessons.
    #[must_use]
    pub fn with_lessons(lessons: impl IntoIterator<Item = LessonDefinition>) -> Self {
        let repo = Self::new();
        for lesson in lessons {
            repo.put_lesson(lesson);
        }
        repo
    }

    /// Add or replace a catalog lesson. The catalog is loaded out of band;
    /// progress code only reads it.
    pub fn put_lesson(&self, lesson: LessonDefinition) {
        let mut guard = match self.lessons.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.iter_mut().find(|existing| existing.id() == lesson.id()) {
            Some(existing) => *existing = lesson,
            None => guard.push(lesson),
        }
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn insert_user(&self, progress: &UserProgress) -> Result<(), StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        if guard.contains_key(&progress.user_id()) {
            return Err(StorageError::AlreadyExists);
        }
        guard.insert(progress.user_id(), progress.clone().with_version(0));
        Ok(())
    }

    async fn load_user(&self, user_id: UserId) -> Result<Option<UserProgress>, StorageError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&user_id).cloned())
    }

    async fn save_user(&self, progress: &UserProgress) -> Result<u64, StorageError> {
        let mut guard = self
            .users
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let stored = guard
            .get(&progress.user_id())
            .ok_or(StorageError::NotFound)?;
        if stored.version() != progress.version() {
            return Err(StorageError::Conflict {
                expected: progress.version(),
                found: stored.version(),
            });
        }
        let next = progress.version() + 1;
        guard.insert(progress.user_id(), progress.clone().with_version(next));
        Ok(next)
    }
}

#[async_trait]
impl ContentCatalog for InMemoryRepository {
    async fn get_lesson_definition(
        &self,
        lesson_id: &LessonId,
    ) -> Result<Option<LessonDefinition>, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.iter().find(|lesson| lesson.id() == lesson_id).cloned())
    }

    async fn list_lessons(
        &self,
        category: Category,
    ) -> Result<Vec<LessonDefinition>, StorageError> {
        let guard = self
            .lessons
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .iter()
            .filter(|lesson| lesson.category() == category)
            .cloned()
            .collect())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub catalog: Arc<dyn ContentCatalog>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_in_memory(InMemoryRepository::new())
    }

    #[must_use]
    pub fn from_in_memory(repo: InMemoryRepository) -> Self {
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let catalog: Arc<dyn ContentCatalog> = Arc::new(repo);
        Self { progress, catalog }
    }
}
