//! Subscription state persistence.

use async_trait::async_trait;

use crate::error::ProcessingError;
use crate::types::EventSubscriptionState;

/// Trait for loading and saving [`EventSubscriptionState`] records.
///
/// Implementations keep exactly one record per subscription id.
#[async_trait]
pub trait SubscriptionStateStore: Send + Sync {
    /// Return the record for `event_subscription_id`, creating an empty one on first access.
    async fn get_or_create(
        &self,
        event_subscription_id: i64,
    ) -> Result<EventSubscriptionState, ProcessingError>;

    /// Replace each record in place, matched by `event_subscription_id`.
    async fn upsert(&self, states: Vec<EventSubscriptionState>) -> Result<(), ProcessingError>;
}
