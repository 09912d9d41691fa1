//! Handler history: the idempotency ledger of `(handler, event)` pairs.
//!
//! A pair is recorded only after the handler finished successfully. Before a
//! history-tracked handler runs, the dispatch loop asks the store whether the
//! pair exists and skips the handler if so, which keeps execution at most once
//! per pair even when the event stream is replayed after a crash or reorg rescan.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;
use crate::types::EventKey;

/// One completed `(handler, event)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerHistory {
    pub event_handler_id: i64,
    pub event_key: String,
    /// Unix timestamp of when the record was written.
    pub recorded_at: i64,
}

impl HandlerHistory {
    pub fn new(event_handler_id: i64, event_key: &EventKey) -> Self {
        Self {
            event_handler_id,
            event_key: event_key.as_str().to_string(),
            recorded_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Trait for reading and writing handler history.
#[async_trait]
pub trait HandlerHistoryStore: Send + Sync {
    async fn contains(
        &self,
        event_handler_id: i64,
        event_key: &EventKey,
    ) -> Result<bool, ProcessingError>;

    /// Insert the pair if absent, atomically.
    ///
    /// Returns `true` if the pair was new, `false` if it already existed.
    async fn record(
        &self,
        event_handler_id: i64,
        event_key: &EventKey,
    ) -> Result<bool, ProcessingError>;
}
