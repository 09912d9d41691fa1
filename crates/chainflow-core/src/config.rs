//! Handler configuration rows and the value objects the factory injects into handlers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::error::ProcessingError;

// ─── EventHandlerType ─────────────────────────────────────────────────────────

/// The closed set of handler kinds a subscription chain can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventHandlerType {
    Rule,
    Aggregate,
    ContractQuery,
    Queue,
    Store,
    GetTransaction,
    Index,
}

impl EventHandlerType {
    pub const ALL: [EventHandlerType; 7] = [
        Self::Rule,
        Self::Aggregate,
        Self::ContractQuery,
        Self::Queue,
        Self::Store,
        Self::GetTransaction,
        Self::Index,
    ];

    /// The tag as persisted in handler configuration rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "Rule",
            Self::Aggregate => "Aggregate",
            Self::ContractQuery => "ContractQuery",
            Self::Queue => "Queue",
            Self::Store => "Store",
            Self::GetTransaction => "GetTransaction",
            Self::Index => "Index",
        }
    }

    /// Whether completed runs are recorded in the history store.
    pub fn tracks_history(&self) -> bool {
        self.skips_on_replay() || matches!(self, Self::ContractQuery)
    }

    /// Whether a recorded `(handler, event)` pair is skipped when the event
    /// comes round again.
    ///
    /// ContractQuery is recorded but still runs on replay so later handlers
    /// get its event output; it leaves subscription state alone on a replay.
    pub fn skips_on_replay(&self) -> bool {
        matches!(
            self,
            Self::Aggregate | Self::Queue | Self::Store | Self::Index
        )
    }
}

impl std::fmt::Display for EventHandlerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventHandlerType {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProcessingError::UnsupportedHandlerType(s.to_string()))
    }
}

// ─── EventHandlerDto ──────────────────────────────────────────────────────────

/// A persisted handler configuration row.
///
/// `handler_type` is kept as the raw tag so that rows written by newer
/// producers surface as `UnsupportedHandlerType` instead of failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventHandlerDto {
    pub id: i64,
    pub event_subscription_id: i64,
    pub handler_type: String,
    /// Position in the chain, ascending.
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub subscriber_queue_id: Option<i64>,
    #[serde(default)]
    pub subscriber_repository_id: Option<i64>,
    #[serde(default)]
    pub subscriber_search_index_id: Option<i64>,
}

impl EventHandlerDto {
    pub fn new(id: i64, event_subscription_id: i64, handler_type: EventHandlerType) -> Self {
        Self {
            id,
            event_subscription_id,
            handler_type: handler_type.as_str().to_string(),
            order: 0,
            disabled: false,
            subscriber_queue_id: None,
            subscriber_repository_id: None,
            subscriber_search_index_id: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_queue(mut self, subscriber_queue_id: i64) -> Self {
        self.subscriber_queue_id = Some(subscriber_queue_id);
        self
    }

    pub fn with_repository(mut self, subscriber_repository_id: i64) -> Self {
        self.subscriber_repository_id = Some(subscriber_repository_id);
        self
    }

    pub fn with_search_index(mut self, subscriber_search_index_id: i64) -> Self {
        self.subscriber_search_index_id = Some(subscriber_search_index_id);
        self
    }

    /// Parse the tag.
    pub fn kind(&self) -> Result<EventHandlerType, ProcessingError> {
        self.handler_type.parse()
    }
}

// ─── ValueSource ──────────────────────────────────────────────────────────────

/// Where a handler reads one of its inputs from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "key", rename_all = "snake_case")]
pub enum ValueSource {
    /// A literal from configuration.
    Static(Value),
    /// The address of the contract that emitted the event.
    #[default]
    EventAddress,
    /// An event parameter by 1-based number.
    EventParameter(u32),
    /// A value written to the event by an earlier handler.
    EventState(String),
    /// A value in the subscription's persisted state.
    SubscriptionState(String),
}

// ─── Rule ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventRuleType {
    /// Matches when the source value is absent, null or an empty string.
    Empty,
    Equals,
    NotEquals,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    /// Matches when the source value is divisible by the literal.
    Modulus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRuleDto {
    pub source: ValueSource,
    pub rule_type: EventRuleType,
    /// Comparison literal; unused by `Empty`.
    #[serde(default)]
    pub value: Option<String>,
}

impl Default for EventRuleDto {
    fn default() -> Self {
        Self {
            source: ValueSource::EventParameter(1),
            rule_type: EventRuleType::Empty,
            value: None,
        }
    }
}

// ─── Aggregator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatorOperation {
    Count,
    Sum,
    Min,
    Max,
    Average,
    AddToList,
    AddToUniqueList,
}

impl AggregatorOperation {
    pub fn needs_source_value(&self) -> bool {
        !matches!(self, Self::Count)
    }
}

/// Where the running aggregate lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregatorDestination {
    SubscriptionState,
    EventState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventAggregatorConfiguration {
    pub source: ValueSource,
    pub operation: AggregatorOperation,
    pub destination: AggregatorDestination,
    pub output_key: String,
}

impl Default for EventAggregatorConfiguration {
    fn default() -> Self {
        Self {
            source: ValueSource::EventParameter(1),
            operation: AggregatorOperation::Count,
            destination: AggregatorDestination::SubscriptionState,
            output_key: "count".into(),
        }
    }
}

// ─── Contract query ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractQueryParameter {
    /// Position in the call's argument list, ascending.
    pub order: u32,
    pub source: ValueSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractQueryConfiguration {
    /// JSON ABI of the target contract.
    pub contract_abi: String,
    /// e.g. `"balanceOf(address)"`.
    pub function_signature: String,
    pub contract_address: ValueSource,
    #[serde(default)]
    pub parameters: Vec<ContractQueryParameter>,
    #[serde(default)]
    pub event_state_output_name: Option<String>,
    #[serde(default)]
    pub subscription_state_output_name: Option<String>,
}
