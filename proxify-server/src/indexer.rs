//! Hand-off of approved reports to location search.
//!
//! Indexing happens after the approving transaction has committed. A failure
//! here is logged and does not undo the approval.

use async_trait::async_trait;
use tracing::info;

use proxify_core::{Location, ReportId};

/// Sink for newly published report locations.
#[async_trait]
pub trait LocationIndexer: Send + Sync {
    async fn index_approved(&self, report_id: ReportId, location: Location) -> anyhow::Result<()>;
}

/// Default indexer: records the hand-off in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingIndexer;

#[async_trait]
impl LocationIndexer for LoggingIndexer {
    async fn index_approved(&self, report_id: ReportId, location: Location) -> anyhow::Result<()> {
        info!(
            report_id = %report_id,
            latitude = location.latitude,
            longitude = location.longitude,
            "Indexed approved report location"
        );
        Ok(())
    }
}
