//! Collaborator contracts consumed by the handler factory and handlers.
//!
//! Lookups return `Ok(None)` when the id does not exist; the factory turns
//! that into [`ProcessingError::ConfigurationNotFound`].

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{
    ContractQueryConfiguration, EventAggregatorConfiguration, EventHandlerDto, EventRuleDto,
};
use crate::error::ProcessingError;
use crate::types::{DecodedEvent, Transaction};

// ─── Configuration repositories ───────────────────────────────────────────────

/// The ordered handler rows of a subscription.
#[async_trait]
pub trait EventHandlerRepository: Send + Sync {
    async fn get_event_handlers(
        &self,
        event_subscription_id: i64,
    ) -> Result<Vec<EventHandlerDto>, ProcessingError>;
}

#[async_trait]
pub trait EventRuleConfigurationRepository: Send + Sync {
    async fn get_rule_configuration(
        &self,
        event_handler_id: i64,
    ) -> Result<Option<Arc<EventRuleDto>>, ProcessingError>;
}

#[async_trait]
pub trait EventAggregatorConfigurationRepository: Send + Sync {
    async fn get_aggregator_configuration(
        &self,
        event_handler_id: i64,
    ) -> Result<Option<Arc<EventAggregatorConfiguration>>, ProcessingError>;
}

#[async_trait]
pub trait ContractQueryConfigurationRepository: Send + Sync {
    async fn get_contract_query_configuration(
        &self,
        subscriber_id: i64,
        event_handler_id: i64,
    ) -> Result<Option<Arc<ContractQueryConfiguration>>, ProcessingError>;
}

// ─── Backends ─────────────────────────────────────────────────────────────────

/// A subscriber-owned message queue. Delivery durability belongs to the backend.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn add_message(&self, message: Value) -> Result<(), ProcessingError>;
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn index(&self, event: &DecodedEvent) -> Result<(), ProcessingError>;
}

/// Persists decoded event logs.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn store(&self, event: &DecodedEvent) -> Result<(), ProcessingError>;
}

// ─── Resource factories ───────────────────────────────────────────────────────

#[async_trait]
pub trait SubscriberQueueFactory: Send + Sync {
    async fn get_subscriber_queue(
        &self,
        subscriber_id: i64,
        subscriber_queue_id: i64,
    ) -> Result<Option<Arc<dyn Queue>>, ProcessingError>;
}

#[async_trait]
pub trait SubscriberSearchIndexFactory: Send + Sync {
    async fn get_search_index(
        &self,
        subscriber_id: i64,
        subscriber_search_index_id: i64,
    ) -> Result<Option<Arc<dyn SearchIndex>>, ProcessingError>;
}

#[async_trait]
pub trait SubscriberStorageFactory: Send + Sync {
    async fn get_log_store(
        &self,
        subscriber_id: i64,
        subscriber_repository_id: i64,
    ) -> Result<Option<Arc<dyn LogStore>>, ProcessingError>;
}

// ─── Chain capabilities ───────────────────────────────────────────────────────

#[async_trait]
pub trait TransactionLookup: Send + Sync {
    async fn get_transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, ProcessingError>;
}

/// Read-only contract calls (`eth_call`).
#[async_trait]
pub trait ContractQuery: Send + Sync {
    /// Returns the decoded outputs: the bare value for a single output,
    /// an object keyed by output name otherwise.
    async fn query(
        &self,
        contract_abi: &str,
        function_signature: &str,
        contract_address: &str,
        parameters: &[Value],
    ) -> Result<Value, ProcessingError>;
}
