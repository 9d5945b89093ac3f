use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use literacy_core::{
    client::ProgressReducer,
    model::{ActionItemId, OverallProgress, StepId, UserId},
    sync::{BatchSyncRequest, BatchSyncResponse},
};

use crate::error::{ProgressServiceError, SyncClientError};
use crate::progress_service::ProgressService;

/// Carries a batch payload to the progress service for an authenticated user.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn submit(
        &self,
        request: &BatchSyncRequest,
    ) -> Result<BatchSyncResponse, ProgressServiceError>;
}

/// In-process transport bound to one user.
#[derive(Clone)]
pub struct LocalTransport {
    service: Arc<ProgressService>,
    user_id: UserId,
}

impl LocalTransport {
    #[must_use]
    pub fn new(service: Arc<ProgressService>, user_id: UserId) -> Self {
        Self { service, user_id }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

#[async_trait]
impl SyncTransport for LocalTransport {
    async fn submit(
        &self,
        request: &BatchSyncRequest,
    ) -> Result<BatchSyncResponse, ProgressServiceError> {
        self.service.submit_batch(self.user_id, request).await
    }
}

/// Client-side lesson state that predicts locally and defers to the server.
///
/// Toggles only touch local state. `save` sends the full replacement payload
/// and, on success, overwrites local state with the server snapshot. On
/// failure local state is kept as-is so the same save can be retried.
pub struct ProgressSyncClient<T> {
    transport: T,
    reducer: ProgressReducer,
    overall: Option<OverallProgress>,
}

impl<T: SyncTransport> ProgressSyncClient<T> {
    #[must_use]
    pub fn new(transport: T, reducer: ProgressReducer) -> Self {
        Self {
            transport,
            reducer,
            overall: None,
        }
    }

    #[must_use]
    pub fn reducer(&self) -> &ProgressReducer {
        &self.reducer
    }

    /// Overall counters from the last successful save.
    #[must_use]
    pub fn overall(&self) -> Option<&OverallProgress> {
        self.overall.as_ref()
    }

    #[must_use]
    pub fn needs_sync(&self) -> bool {
        self.reducer.is_dirty()
    }

    /// Flip one action item locally. Returns whether it is now checked.
    ///
    /// # Errors
    ///
    /// Returns `SyncClientError::Toggle` for ids not in the lesson.
    pub fn toggle(&mut self, step_id: &StepId, item_id: &ActionItemId) -> Result<bool, SyncClientError> {
        Ok(self.reducer.toggle(step_id, item_id)?)
    }

    /// Push local state if it changed since the last sync.
    ///
    /// Returns `None` when there was nothing to send.
    ///
    /// # Errors
    ///
    /// Returns `SyncClientError::Service` if the server rejects the batch or
    /// is unreachable. Local state is left untouched in that case.
    pub async fn save(&mut self) -> Result<Option<BatchSyncResponse>, SyncClientError> {
        if !self.reducer.is_dirty() {
            return Ok(None);
        }

        let request = self.reducer.sync_request();
        let predicted = self.reducer.predicted();
        let response = self.transport.submit(&request).await?;

        if predicted.completed != response.progress.completed()
            || &predicted.completed_steps != response.progress.completed_steps()
        {
            debug!(
                lesson = %request.lesson_id,
                predicted = predicted.completed,
                confirmed = response.progress.completed(),
                "local prediction replaced by server snapshot"
            );
        }

        self.reducer.apply_snapshot(&response.progress);
        self.overall = Some(response.overall);
        Ok(Some(response))
    }
}
