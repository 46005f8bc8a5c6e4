//! HTTP service and persistent stores for Proxify alert moderation.

pub mod api;
pub mod config;
pub mod identity;
pub mod indexer;
pub mod lifecycle;
pub mod notifications;
pub mod repository;

use std::sync::Arc;

use proxify_core::QuorumPolicy;

pub use identity::Caller;
pub use indexer::{LocationIndexer, LoggingIndexer};
pub use lifecycle::{ReportLifecycle, VoteReceipt};
pub use notifications::NotificationEmitter;
pub use repository::{InMemoryRepository, ReportRepository, SqliteRepository};

pub struct AppState {
    pub lifecycle: ReportLifecycle,
    pub notifications: NotificationEmitter,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        indexer: Arc<dyn LocationIndexer>,
        policy: QuorumPolicy,
    ) -> Self {
        Self {
            lifecycle: ReportLifecycle::new(repository.clone(), indexer, policy),
            notifications: NotificationEmitter::new(repository),
        }
    }
}
