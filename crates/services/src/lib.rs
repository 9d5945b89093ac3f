#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod sync_client;

pub use literacy_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ProgressServiceError, SyncClientError};
pub use progress_service::ProgressService;
pub use sync_client::{LocalTransport, ProgressSyncClient, SyncTransport};
