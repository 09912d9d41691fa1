use std::sync::Arc;

use crate::error::ProcessingError;
use crate::repository::LogStore;
use crate::types::EventSubscription;

use super::HandlerContext;

/// Persists the event log to a subscriber's log store.
pub struct StorageHandler {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub log_store: Arc<dyn LogStore>,
}

impl StorageHandler {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        self.log_store.store(ctx.event).await?;
        tracing::debug!(handler_id = self.id, event_key = %ctx.event.key(), "event log stored");
        Ok(true)
    }
}
