//! Hand-written test doubles shared by the unit tests of this crate.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::{
    ContractQueryConfiguration, EventAggregatorConfiguration, EventHandlerDto, EventRuleDto,
};
use crate::error::ProcessingError;
use crate::history::HandlerHistoryStore;
use crate::repository::*;
use crate::state::SubscriptionStateStore;
use crate::types::{
    DecodedEvent, EventKey, EventParameter, EventSubscription, EventSubscriptionState, Transaction,
};

pub const SUBSCRIPTION_ID: i64 = 99;
pub const SUBSCRIBER_ID: i64 = 7;

/// A `Transfer` log from `0xtoken` in tx `0xabc`, parameters numbered from 1.
pub fn sample_event(values: &[Value]) -> DecodedEvent {
    DecodedEvent {
        schema: "Transfer".into(),
        address: "0xtoken".into(),
        tx_hash: "0xabc".into(),
        block_number: 100,
        block_hash: "0xblock".into(),
        log_index: 0,
        parameters: values
            .iter()
            .enumerate()
            .map(|(i, v)| EventParameter {
                number: i as u32 + 1,
                name: format!("p{}", i + 1),
                abi_type: "uint256".into(),
                value: v.clone(),
            })
            .collect(),
        state: HashMap::new(),
        transaction: None,
    }
}

pub fn event_at(tx_hash: &str, log_index: u32, values: &[Value]) -> DecodedEvent {
    DecodedEvent {
        tx_hash: tx_hash.into(),
        log_index,
        ..sample_event(values)
    }
}

pub fn subscription() -> Arc<EventSubscription> {
    EventSubscription::new(
        SUBSCRIPTION_ID,
        SUBSCRIBER_ID,
        EventSubscriptionState::new(SUBSCRIPTION_ID),
    )
}

pub fn sample_transaction(hash: &str) -> Transaction {
    Transaction {
        hash: hash.into(),
        block_hash: "0xblock".into(),
        block_number: 100,
        transaction_index: 0,
        from: "0xsender".into(),
        to: Some("0xtoken".into()),
        value: "0".into(),
        gas: 21_000,
        gas_price: Some("1000000000".into()),
        nonce: 1,
        input: "0x".into(),
    }
}

// ─── Backends ─────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingQueue {
    messages: Mutex<Vec<Value>>,
    fail: bool,
}

impl RecordingQueue {
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Queue for RecordingQueue {
    async fn add_message(&self, message: Value) -> Result<(), ProcessingError> {
        if self.fail {
            return Err(ProcessingError::Backend("queue unavailable".into()));
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingLogStore {
    events: Mutex<Vec<DecodedEvent>>,
}

impl RecordingLogStore {
    pub fn events(&self) -> Vec<DecodedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogStore for RecordingLogStore {
    async fn store(&self, event: &DecodedEvent) -> Result<(), ProcessingError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSearchIndex {
    keys: Mutex<Vec<String>>,
}

impl RecordingSearchIndex {
    pub fn keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndex for RecordingSearchIndex {
    async fn index(&self, event: &DecodedEvent) -> Result<(), ProcessingError> {
        self.keys.lock().unwrap().push(event.key().to_string());
        Ok(())
    }
}

// ─── Chain capabilities ───────────────────────────────────────────────────────

/// Returns a fixed value and records `(signature, address, args)` per call.
pub struct StubContractQuery {
    result: Option<Value>,
    calls: Mutex<Vec<(String, String, Vec<Value>)>>,
}

impl StubContractQuery {
    pub fn returning(result: Value) -> Self {
        Self { result: Some(result), calls: Mutex::new(Vec::new()) }
    }

    /// Answers every call with its first argument.
    pub fn echoing() -> Self {
        Self { result: None, calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<(String, String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContractQuery for StubContractQuery {
    async fn query(
        &self,
        _contract_abi: &str,
        function_signature: &str,
        contract_address: &str,
        parameters: &[Value],
    ) -> Result<Value, ProcessingError> {
        self.calls.lock().unwrap().push((
            function_signature.to_string(),
            contract_address.to_string(),
            parameters.to_vec(),
        ));
        Ok(match &self.result {
            Some(result) => result.clone(),
            None => parameters.first().cloned().unwrap_or(Value::Null),
        })
    }
}

pub struct StubTransactionLookup {
    transactions: Vec<Transaction>,
}

impl StubTransactionLookup {
    pub fn with(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl TransactionLookup for StubTransactionLookup {
    async fn get_transaction_by_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<Transaction>, ProcessingError> {
        Ok(self.transactions.iter().find(|t| t.hash == tx_hash).cloned())
    }
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// Every configuration and resource lookup, keyed the way the caller asked.
///
/// Each lookup is logged as e.g. `"queue 7/33"` so tests can assert on the
/// exact key used.
#[derive(Default)]
pub struct StubRepository {
    pub handlers: Mutex<Vec<EventHandlerDto>>,
    pub rules: Mutex<HashMap<i64, Arc<EventRuleDto>>>,
    pub aggregators: Mutex<HashMap<i64, Arc<EventAggregatorConfiguration>>>,
    pub contract_queries: Mutex<HashMap<(i64, i64), Arc<ContractQueryConfiguration>>>,
    pub queues: Mutex<HashMap<(i64, i64), Arc<dyn Queue>>>,
    pub search_indexes: Mutex<HashMap<(i64, i64), Arc<dyn SearchIndex>>>,
    pub log_stores: Mutex<HashMap<(i64, i64), Arc<dyn LogStore>>>,
    lookups: Mutex<Vec<String>>,
}

impl StubRepository {
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }

    fn log(&self, entry: String) {
        self.lookups.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl EventHandlerRepository for StubRepository {
    async fn get_event_handlers(
        &self,
        event_subscription_id: i64,
    ) -> Result<Vec<EventHandlerDto>, ProcessingError> {
        Ok(self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.event_subscription_id == event_subscription_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EventRuleConfigurationRepository for StubRepository {
    async fn get_rule_configuration(
        &self,
        event_handler_id: i64,
    ) -> Result<Option<Arc<EventRuleDto>>, ProcessingError> {
        self.log(format!("rule {event_handler_id}"));
        Ok(self.rules.lock().unwrap().get(&event_handler_id).cloned())
    }
}

#[async_trait]
impl EventAggregatorConfigurationRepository for StubRepository {
    async fn get_aggregator_configuration(
        &self,
        event_handler_id: i64,
    ) -> Result<Option<Arc<EventAggregatorConfiguration>>, ProcessingError> {
        self.log(format!("aggregator {event_handler_id}"));
        Ok(self.aggregators.lock().unwrap().get(&event_handler_id).cloned())
    }
}

#[async_trait]
impl ContractQueryConfigurationRepository for StubRepository {
    async fn get_contract_query_configuration(
        &self,
        subscriber_id: i64,
        event_handler_id: i64,
    ) -> Result<Option<Arc<ContractQueryConfiguration>>, ProcessingError> {
        self.log(format!("contract query {subscriber_id}/{event_handler_id}"));
        Ok(self
            .contract_queries
            .lock()
            .unwrap()
            .get(&(subscriber_id, event_handler_id))
            .cloned())
    }
}

#[async_trait]
impl SubscriberQueueFactory for StubRepository {
    async fn get_subscriber_queue(
        &self,
        subscriber_id: i64,
        subscriber_queue_id: i64,
    ) -> Result<Option<Arc<dyn Queue>>, ProcessingError> {
        self.log(format!("queue {subscriber_id}/{subscriber_queue_id}"));
        Ok(self.queues.lock().unwrap().get(&(subscriber_id, subscriber_queue_id)).cloned())
    }
}

#[async_trait]
impl SubscriberSearchIndexFactory for StubRepository {
    async fn get_search_index(
        &self,
        subscriber_id: i64,
        subscriber_search_index_id: i64,
    ) -> Result<Option<Arc<dyn SearchIndex>>, ProcessingError> {
        self.log(format!("search index {subscriber_id}/{subscriber_search_index_id}"));
        Ok(self
            .search_indexes
            .lock()
            .unwrap()
            .get(&(subscriber_id, subscriber_search_index_id))
            .cloned())
    }
}

#[async_trait]
impl SubscriberStorageFactory for StubRepository {
    async fn get_log_store(
        &self,
        subscriber_id: i64,
        subscriber_repository_id: i64,
    ) -> Result<Option<Arc<dyn LogStore>>, ProcessingError> {
        self.log(format!("log store {subscriber_id}/{subscriber_repository_id}"));
        Ok(self
            .log_stores
            .lock()
            .unwrap()
            .get(&(subscriber_id, subscriber_repository_id))
            .cloned())
    }
}

// ─── History and state ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryHistory {
    pairs: Mutex<HashSet<(i64, String)>>,
}

impl MemoryHistory {
    pub fn len(&self) -> usize {
        self.pairs.lock().unwrap().len()
    }
}

#[async_trait]
impl HandlerHistoryStore for MemoryHistory {
    async fn contains(
        &self,
        event_handler_id: i64,
        event_key: &EventKey,
    ) -> Result<bool, ProcessingError> {
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .contains(&(event_handler_id, event_key.as_str().to_string())))
    }

    async fn record(
        &self,
        event_handler_id: i64,
        event_key: &EventKey,
    ) -> Result<bool, ProcessingError> {
        Ok(self
            .pairs
            .lock()
            .unwrap()
            .insert((event_handler_id, event_key.as_str().to_string())))
    }
}

/// Keeps the last upserted state per subscription and counts upsert calls.
#[derive(Default)]
pub struct MemoryStates {
    states: Mutex<HashMap<i64, EventSubscriptionState>>,
    upserts: Mutex<usize>,
}

impl MemoryStates {
    pub fn get(&self, id: i64) -> Option<EventSubscriptionState> {
        self.states.lock().unwrap().get(&id).cloned()
    }

    pub fn upserts(&self) -> usize {
        *self.upserts.lock().unwrap()
    }
}

#[async_trait]
impl SubscriptionStateStore for MemoryStates {
    async fn get_or_create(
        &self,
        event_subscription_id: i64,
    ) -> Result<EventSubscriptionState, ProcessingError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .entry(event_subscription_id)
            .or_insert_with(|| EventSubscriptionState::new(event_subscription_id))
            .clone())
    }

    async fn upsert(&self, states: Vec<EventSubscriptionState>) -> Result<(), ProcessingError> {
        *self.upserts.lock().unwrap() += 1;
        let mut map = self.states.lock().unwrap();
        for s in states {
            map.insert(s.event_subscription_id, s);
        }
        Ok(())
    }
}
