//! In-memory history and subscription state.
//!
//! Useful for testing and for short-lived processes that don't need
//! persistence. All data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chainflow_core::error::ProcessingError;
use chainflow_core::history::{HandlerHistory, HandlerHistoryStore};
use chainflow_core::state::SubscriptionStateStore;
use chainflow_core::types::{EventKey, EventSubscriptionState};

#[derive(Default)]
pub struct InMemoryStorage {
    history: Mutex<HashMap<(i64, String), HandlerHistory>>,
    states: Mutex<HashMap<i64, EventSubscriptionState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscription state records.
    pub fn state_count(&self) -> usize {
        relock(&self.states).len()
    }

    /// Number of `(handler, event)` pairs recorded.
    pub fn history_count(&self) -> usize {
        relock(&self.history).len()
    }

    /// History of one handler, oldest first.
    pub fn history_for(&self, event_handler_id: i64) -> Vec<HandlerHistory> {
        let mut records: Vec<_> = relock(&self.history)
            .values()
            .filter(|h| h.event_handler_id == event_handler_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.event_key.cmp(&b.event_key))
        });
        records
    }
}

/// For read-only accessors: takes the guard even if the lock is poisoned.
fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, ProcessingError> {
    m.lock()
        .map_err(|_| ProcessingError::Storage(format!("{what} lock poisoned")))
}

#[async_trait]
impl HandlerHistoryStore for InMemoryStorage {
    async fn contains(
        &self,
        event_handler_id: i64,
        event_key: &EventKey,
    ) -> Result<bool, ProcessingError> {
        let history = lock(&self.history, "history")?;
        Ok(history.contains_key(&(event_handler_id, event_key.as_str().to_string())))
    }

    async fn record(
        &self,
        event_handler_id: i64,
        event_key: &EventKey,
    ) -> Result<bool, ProcessingError> {
        let mut history = lock(&self.history, "history")?;
        let pair = (event_handler_id, event_key.as_str().to_string());
        if history.contains_key(&pair) {
            return Ok(false);
        }
        history.insert(pair, HandlerHistory::new(event_handler_id, event_key));
        Ok(true)
    }
}

#[async_trait]
impl SubscriptionStateStore for InMemoryStorage {
    async fn get_or_create(
        &self,
        event_subscription_id: i64,
    ) -> Result<EventSubscriptionState, ProcessingError> {
        let mut states = lock(&self.states, "subscription state")?;
        let state = states.entry(event_subscription_id).or_insert_with(|| {
            tracing::debug!(event_subscription_id, "created subscription state");
            EventSubscriptionState::new(event_subscription_id)
        });
        Ok(state.clone())
    }

    async fn upsert(&self, updates: Vec<EventSubscriptionState>) -> Result<(), ProcessingError> {
        let mut states = lock(&self.states, "subscription state")?;
        for state in updates {
            states.insert(state.event_subscription_id, state);
        }
        Ok(())
    }
}
