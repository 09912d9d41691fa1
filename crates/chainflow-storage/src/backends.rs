//! Collecting queue, search index and log store backends.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chainflow_core::error::ProcessingError;
use chainflow_core::repository::{LogStore, Queue, SearchIndex};
use chainflow_core::types::DecodedEvent;

/// A queue that keeps every message in arrival order.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<Value>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn add_message(&self, message: Value) -> Result<(), ProcessingError> {
        self.messages
            .lock()
            .map_err(|_| ProcessingError::Backend("queue lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

/// A search index keyed by event key. Re-indexing an event replaces it.
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: Mutex<HashMap<String, DecodedEvent>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event_key: &str) -> Option<DecodedEvent> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index(&self, event: &DecodedEvent) -> Result<(), ProcessingError> {
        self.documents
            .lock()
            .map_err(|_| ProcessingError::Backend("search index lock poisoned".into()))?
            .insert(event.key().to_string(), event.clone());
        Ok(())
    }
}

/// Appends event logs in arrival order.
#[derive(Default)]
pub struct MemoryLogStore {
    logs: Mutex<Vec<DecodedEvent>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn logs(&self) -> Vec<DecodedEvent> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stored logs for a schema (e.g. `"Transfer"`).
    pub fn logs_by_schema(&self, schema: &str) -> Vec<DecodedEvent> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.schema == schema)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn store(&self, event: &DecodedEvent) -> Result<(), ProcessingError> {
        self.logs
            .lock()
            .map_err(|_| ProcessingError::Backend("log store lock poisoned".into()))?
            .push(event.clone());
        Ok(())
    }
}
