use serde::Serialize;
use std::sync::Arc;

use crate::error::ProcessingError;
use crate::repository::Queue;
use crate::types::{DecodedEvent, EventSubscription};

use super::HandlerContext;

/// The payload pushed onto a subscriber queue.
#[derive(Debug, Serialize)]
pub struct QueueMessage<'a> {
    pub event_subscription_id: i64,
    pub subscriber_id: i64,
    pub event_handler_id: i64,
    pub event_key: String,
    pub event: &'a DecodedEvent,
}

/// Forwards the event, including anything attached earlier in the chain,
/// to a subscriber's queue.
pub struct QueueHandler {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub queue: Arc<dyn Queue>,
}

impl QueueHandler {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        let message = QueueMessage {
            event_subscription_id: self.subscription.id,
            subscriber_id: self.subscription.subscriber_id,
            event_handler_id: self.id,
            event_key: ctx.event.key().to_string(),
            event: ctx.event,
        };
        let payload = serde_json::to_value(&message)?;
        self.queue.add_message(payload).await?;
        tracing::debug!(handler_id = self.id, event_key = %message.event_key, "event queued");
        Ok(true)
    }
}
