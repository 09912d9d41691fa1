//! The handler variants a subscription chain is built from.
//!
//! Every variant carries its configuration row id and the shared
//! subscription. `handle` returns `Ok(true)` to let the chain continue and
//! `Ok(false)` to stop it for this event (a rule that did not match).

mod aggregator;
mod contract_query;
mod queue;
mod rule;
mod search_index;
mod storage;
mod transaction;

pub use aggregator::EventAggregator;
pub use contract_query::ContractQueryEventHandler;
pub use queue::{QueueHandler, QueueMessage};
pub use rule::EventRule;
pub use search_index::SearchIndexHandler;
pub use storage::StorageHandler;
pub use transaction::GetTransactionEventHandler;

use std::sync::Arc;

use crate::config::EventHandlerType;
use crate::error::ProcessingError;
use crate::types::{DecodedEvent, EventSubscription, EventSubscriptionState};

/// What a handler sees while it runs: the event (which it may enrich) and the
/// subscription state, locked for the duration of the chain.
pub struct HandlerContext<'a> {
    pub event: &'a mut DecodedEvent,
    pub state: &'a mut EventSubscriptionState,
    /// Set when this handler already completed this event once.
    pub replay: bool,
}

impl<'a> HandlerContext<'a> {
    pub fn new(event: &'a mut DecodedEvent, state: &'a mut EventSubscriptionState) -> Self {
        Self {
            event,
            state,
            replay: false,
        }
    }

    pub fn replaying(mut self, replay: bool) -> Self {
        self.replay = replay;
        self
    }
}

/// A constructed handler, ready to run.
pub enum EventHandler {
    Rule(EventRule),
    Aggregator(EventAggregator),
    ContractQuery(ContractQueryEventHandler),
    Queue(QueueHandler),
    Store(StorageHandler),
    GetTransaction(GetTransactionEventHandler),
    Index(SearchIndexHandler),
}

impl EventHandler {
    pub fn id(&self) -> i64 {
        match self {
            Self::Rule(h) => h.id,
            Self::Aggregator(h) => h.id,
            Self::ContractQuery(h) => h.id,
            Self::Queue(h) => h.id,
            Self::Store(h) => h.id,
            Self::GetTransaction(h) => h.id,
            Self::Index(h) => h.id,
        }
    }

    pub fn subscription(&self) -> &Arc<EventSubscription> {
        match self {
            Self::Rule(h) => &h.subscription,
            Self::Aggregator(h) => &h.subscription,
            Self::ContractQuery(h) => &h.subscription,
            Self::Queue(h) => &h.subscription,
            Self::Store(h) => &h.subscription,
            Self::GetTransaction(h) => &h.subscription,
            Self::Index(h) => &h.subscription,
        }
    }

    pub fn handler_type(&self) -> EventHandlerType {
        match self {
            Self::Rule(_) => EventHandlerType::Rule,
            Self::Aggregator(_) => EventHandlerType::Aggregate,
            Self::ContractQuery(_) => EventHandlerType::ContractQuery,
            Self::Queue(_) => EventHandlerType::Queue,
            Self::Store(_) => EventHandlerType::Store,
            Self::GetTransaction(_) => EventHandlerType::GetTransaction,
            Self::Index(_) => EventHandlerType::Index,
        }
    }

    /// Run the handler against one event.
    ///
    /// Any failure comes back as [`ProcessingError::HandlerExecutionFailed`]
    /// tagged with this handler's id and type and the event key.
    pub async fn handle(&self, ctx: &mut HandlerContext<'_>) -> Result<bool, ProcessingError> {
        let result = match self {
            Self::Rule(h) => h.handle(ctx).await,
            Self::Aggregator(h) => h.handle(ctx).await,
            Self::ContractQuery(h) => h.handle(ctx).await,
            Self::Queue(h) => h.handle(ctx).await,
            Self::Store(h) => h.handle(ctx).await,
            Self::GetTransaction(h) => h.handle(ctx).await,
            Self::Index(h) => h.handle(ctx).await,
        };
        result.map_err(|e| match e {
            already @ ProcessingError::HandlerExecutionFailed { .. } => already,
            other => ProcessingError::HandlerExecutionFailed {
                handler_id: self.id(),
                handler_type: self.handler_type().to_string(),
                event_key: ctx.event.key().to_string(),
                reason: other.to_string(),
                retryable: other.is_retryable(),
            },
        })
    }
}

impl std::fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandler")
            .field("id", &self.id())
            .field("handler_type", &self.handler_type())
            .field("subscription_id", &self.subscription().id)
            .finish()
    }
}
