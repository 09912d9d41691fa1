use std::sync::Arc;

use crate::error::ProcessingError;
use crate::repository::SearchIndex;
use crate::types::EventSubscription;

use super::HandlerContext;

/// Writes the event to a subscriber's search index.
pub struct SearchIndexHandler {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub search_index: Arc<dyn SearchIndex>,
}

impl SearchIndexHandler {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        self.search_index.index(ctx.event).await?;
        tracing::debug!(handler_id = self.id, event_key = %ctx.event.key(), "event indexed");
        Ok(true)
    }
}
