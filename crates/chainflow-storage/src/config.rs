//! In-memory configuration repository.
//!
//! Holds configuration as flat rows, the shape a relational store would keep
//! them in, and maps them to `chainflow_core` configuration values on lookup.
//! Contract-query rows are joined with the subscriber's contract (for the ABI)
//! and their ordered parameter rows.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chainflow_core::config::{
    AggregatorDestination, AggregatorOperation, ContractQueryConfiguration,
    ContractQueryParameter, EventAggregatorConfiguration, EventHandlerDto, EventHandlerType,
    EventRuleDto, EventRuleType, ValueSource,
};
use chainflow_core::error::ProcessingError;
use chainflow_core::repository::*;

// ─── Ids ──────────────────────────────────────────────────────────────────────

/// Hands out ids per row type, starting at 1. Scoped to one repository.
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: Mutex<HashMap<TypeId, i64>>,
}

impl IdGenerator {
    pub fn next<T: ?Sized + 'static>(&self) -> i64 {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let id = next.entry(TypeId::of::<T>()).or_insert(0);
        *id += 1;
        *id
    }
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Static,
    EventAddress,
    EventParameter,
    EventState,
    SubscriptionState,
}

/// The columns a row uses to say where a value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceColumns {
    pub source: SourceKind,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub event_parameter_number: u32,
    /// State variable name for the two state sources.
    #[serde(default)]
    pub key: Option<String>,
}

impl SourceColumns {
    fn of(source: SourceKind) -> Self {
        Self {
            source,
            value: None,
            event_parameter_number: 0,
            key: None,
        }
    }

    pub fn literal(value: Value) -> Self {
        Self { value: Some(value), ..Self::of(SourceKind::Static) }
    }

    pub fn event_address() -> Self {
        Self::of(SourceKind::EventAddress)
    }

    pub fn event_parameter(number: u32) -> Self {
        Self { event_parameter_number: number, ..Self::of(SourceKind::EventParameter) }
    }

    pub fn event_state(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()), ..Self::of(SourceKind::EventState) }
    }

    pub fn subscription_state(key: impl Into<String>) -> Self {
        Self { key: Some(key.into()), ..Self::of(SourceKind::SubscriptionState) }
    }

    pub fn to_value_source(&self) -> Result<ValueSource, ProcessingError> {
        let key = || {
            self.key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    ProcessingError::InvalidValue(format!("{:?} source without a key", self.source))
                })
        };
        Ok(match self.source {
            SourceKind::Static => ValueSource::Static(self.value.clone().ok_or_else(|| {
                ProcessingError::InvalidValue("static source without a value".into())
            })?),
            SourceKind::EventAddress => ValueSource::EventAddress,
            SourceKind::EventParameter if self.event_parameter_number == 0 => {
                return Err(ProcessingError::InvalidValue(
                    "event parameter numbers start at 1".into(),
                ))
            }
            SourceKind::EventParameter => ValueSource::EventParameter(self.event_parameter_number),
            SourceKind::EventState => ValueSource::EventState(key()?),
            SourceKind::SubscriptionState => ValueSource::SubscriptionState(key()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRuleRow {
    pub id: i64,
    pub event_handler_id: i64,
    pub source: SourceColumns,
    pub rule_type: EventRuleType,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAggregatorRow {
    pub id: i64,
    pub event_handler_id: i64,
    pub source: SourceColumns,
    pub operation: AggregatorOperation,
    pub destination: AggregatorDestination,
    pub output_key: String,
}

/// A contract ABI registered by a subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberContractRow {
    pub id: i64,
    pub subscriber_id: i64,
    pub name: String,
    pub abi: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractQueryRow {
    pub id: i64,
    pub event_handler_id: i64,
    pub contract_id: i64,
    pub contract_address: SourceColumns,
    pub function_signature: String,
    #[serde(default)]
    pub event_state_output_name: Option<String>,
    #[serde(default)]
    pub subscription_state_output_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractQueryParameterRow {
    pub id: i64,
    pub contract_query_id: i64,
    pub order: u32,
    pub source: SourceColumns,
}

// ─── Repository ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tables {
    handlers: Vec<EventHandlerDto>,
    rules: Vec<EventRuleRow>,
    aggregators: Vec<EventAggregatorRow>,
    contracts: Vec<SubscriberContractRow>,
    contract_queries: Vec<ContractQueryRow>,
    contract_query_parameters: Vec<ContractQueryParameterRow>,
    queues: HashMap<(i64, i64), Arc<dyn Queue>>,
    search_indexes: HashMap<(i64, i64), Arc<dyn SearchIndex>>,
    log_stores: HashMap<(i64, i64), Arc<dyn LogStore>>,
}

/// Configuration tables and backend registrations, all in memory.
///
/// Implements every repository and resource-factory trait the handler
/// factory needs. The `add_*` methods assign the row id and return it.
#[derive(Default)]
pub struct MemoryConfigurationRepository {
    ids: IdGenerator,
    tables: Mutex<Tables>,
}

impl MemoryConfigurationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<MutexGuard<'_, Tables>, ProcessingError> {
        self.tables
            .lock()
            .map_err(|_| ProcessingError::Storage("configuration lock poisoned".into()))
    }

    /// Append a handler to the end of a subscription's chain.
    pub fn add_handler(
        &self,
        event_subscription_id: i64,
        handler_type: EventHandlerType,
    ) -> EventHandlerDto {
        let id = self.ids.next::<EventHandlerDto>();
        let mut tables = self.write();
        let order = tables
            .handlers
            .iter()
            .filter(|h| h.event_subscription_id == event_subscription_id)
            .count() as u32;
        let dto = EventHandlerDto::new(id, event_subscription_id, handler_type).with_order(order);
        tables.handlers.push(dto.clone());
        dto
    }

    /// Insert a handler row, replacing any row with the same id.
    pub fn insert_handler(&self, dto: EventHandlerDto) {
        let mut tables = self.write();
        tables.handlers.retain(|h| h.id != dto.id);
        tables.handlers.push(dto);
    }

    pub fn add_rule(&self, mut row: EventRuleRow) -> i64 {
        row.id = self.ids.next::<EventRuleRow>();
        let id = row.id;
        self.write().rules.push(row);
        id
    }

    pub fn add_aggregator(&self, mut row: EventAggregatorRow) -> i64 {
        row.id = self.ids.next::<EventAggregatorRow>();
        let id = row.id;
        self.write().aggregators.push(row);
        id
    }

    pub fn add_contract(&self, subscriber_id: i64, name: &str, abi: &str) -> i64 {
        let id = self.ids.next::<SubscriberContractRow>();
        self.write().contracts.push(SubscriberContractRow {
            id,
            subscriber_id,
            name: name.to_string(),
            abi: abi.to_string(),
        });
        id
    }

    pub fn add_contract_query(&self, mut row: ContractQueryRow) -> i64 {
        row.id = self.ids.next::<ContractQueryRow>();
        let id = row.id;
        self.write().contract_queries.push(row);
        id
    }

    pub fn add_contract_query_parameter(&self, mut row: ContractQueryParameterRow) -> i64 {
        row.id = self.ids.next::<ContractQueryParameterRow>();
        let id = row.id;
        self.write().contract_query_parameters.push(row);
        id
    }

    /// Register a subscriber's queue; returns its `subscriber_queue_id`.
    pub fn register_queue(&self, subscriber_id: i64, queue: Arc<dyn Queue>) -> i64 {
        let id = self.ids.next::<dyn Queue>();
        self.write().queues.insert((subscriber_id, id), queue);
        id
    }

    /// Returns the `subscriber_search_index_id`.
    pub fn register_search_index(&self, subscriber_id: i64, index: Arc<dyn SearchIndex>) -> i64 {
        let id = self.ids.next::<dyn SearchIndex>();
        self.write().search_indexes.insert((subscriber_id, id), index);
        id
    }

    /// Returns the `subscriber_repository_id`.
    pub fn register_log_store(&self, subscriber_id: i64, store: Arc<dyn LogStore>) -> i64 {
        let id = self.ids.next::<dyn LogStore>();
        self.write().log_stores.insert((subscriber_id, id), store);
        id
    }
}

fn map_rule(row: &EventRuleRow) -> Result<EventRuleDto, ProcessingError> {
    Ok(EventRuleDto {
        source: row.source.to_value_source()?,
        rule_type: row.rule_type,
        value: row.value.clone(),
    })
}

fn map_aggregator(
    row: &EventAggregatorRow,
) -> Result<EventAggregatorConfiguration, ProcessingError> {
    Ok(EventAggregatorConfiguration {
        source: row.source.to_value_source()?,
        operation: row.operation,
        destination: row.destination,
        output_key: row.output_key.clone(),
    })
}

fn map_contract_query(
    query: &ContractQueryRow,
    contract: &SubscriberContractRow,
    parameters: &[&ContractQueryParameterRow],
) -> Result<ContractQueryConfiguration, ProcessingError> {
    let parameters = parameters
        .iter()
        .map(|p| {
            Ok(ContractQueryParameter {
                order: p.order,
                source: p.source.to_value_source()?,
            })
        })
        .collect::<Result<Vec<_>, ProcessingError>>()?;

    Ok(ContractQueryConfiguration {
        contract_abi: contract.abi.clone(),
        function_signature: query.function_signature.clone(),
        contract_address: query.contract_address.to_value_source()?,
        parameters,
        event_state_output_name: query.event_state_output_name.clone(),
        subscription_state_output_name: query.subscription_state_output_name.clone(),
    })
}

#[async_trait]
impl EventHandlerRepository for MemoryConfigurationRepository {
    async fn get_event_handlers(
        &self,
        event_subscription_id: i64,
    ) -> Result<Vec<EventHandlerDto>, ProcessingError> {
        let mut handlers: Vec<_> = self
            .read()?
            .handlers
            .iter()
            .filter(|h| h.event_subscription_id == event_subscription_id)
            .cloned()
            .collect();
        handlers.sort_by_key(|h| (h.order, h.id));
        Ok(handlers)
    }
}

#[async_trait]
impl EventRuleConfigurationRepository for MemoryConfigurationRepository {
    async fn get_rule_configuration(
        &self,
        event_handler_id: i64,
    ) -> Result<Option<Arc<EventRuleDto>>, ProcessingError> {
        let tables = self.read()?;
        tables
            .rules
            .iter()
            .find(|r| r.event_handler_id == event_handler_id)
            .map(|r| map_rule(r).map(Arc::new))
            .transpose()
    }
}

#[async_trait]
impl EventAggregatorConfigurationRepository for MemoryConfigurationRepository {
    async fn get_aggregator_configuration(
        &self,
        event_handler_id: i64,
    ) -> Result<Option<Arc<EventAggregatorConfiguration>>, ProcessingError> {
        let tables = self.read()?;
        tables
            .aggregators
            .iter()
            .find(|r| r.event_handler_id == event_handler_id)
            .map(|r| map_aggregator(r).map(Arc::new))
            .transpose()
    }
}

#[async_trait]
impl ContractQueryConfigurationRepository for MemoryConfigurationRepository {
    async fn get_contract_query_configuration(
        &self,
        subscriber_id: i64,
        event_handler_id: i64,
    ) -> Result<Option<Arc<ContractQueryConfiguration>>, ProcessingError> {
        let tables = self.read()?;
        let Some(query) = tables
            .contract_queries
            .iter()
            .find(|q| q.event_handler_id == event_handler_id)
        else {
            return Ok(None);
        };
        let Some(contract) = tables
            .contracts
            .iter()
            .find(|c| c.id == query.contract_id && c.subscriber_id == subscriber_id)
        else {
            return Ok(None);
        };

        let mut parameters: Vec<_> = tables
            .contract_query_parameters
            .iter()
            .filter(|p| p.contract_query_id == query.id)
            .collect();
        parameters.sort_by_key(|p| p.order);

        map_contract_query(query, contract, &parameters).map(|c| Some(Arc::new(c)))
    }
}

#[async_trait]
impl SubscriberQueueFactory for MemoryConfigurationRepository {
    async fn get_subscriber_queue(
        &self,
        subscriber_id: i64,
        subscriber_queue_id: i64,
    ) -> Result<Option<Arc<dyn Queue>>, ProcessingError> {
        Ok(self.read()?.queues.get(&(subscriber_id, subscriber_queue_id)).cloned())
    }
}

#[async_trait]
impl SubscriberSearchIndexFactory for MemoryConfigurationRepository {
    async fn get_search_index(
        &self,
        subscriber_id: i64,
        subscriber_search_index_id: i64,
    ) -> Result<Option<Arc<dyn SearchIndex>>, ProcessingError> {
        Ok(self
            .read()?
            .search_indexes
            .get(&(subscriber_id, subscriber_search_index_id))
            .cloned())
    }
}

#[async_trait]
impl SubscriberStorageFactory for MemoryConfigurationRepository {
    async fn get_log_store(
        &self,
        subscriber_id: i64,
        subscriber_repository_id: i64,
    ) -> Result<Option<Arc<dyn LogStore>>, ProcessingError> {
        Ok(self
            .read()?
            .log_stores
            .get(&(subscriber_id, subscriber_repository_id))
            .cloned())
    }
}
