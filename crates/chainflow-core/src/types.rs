//! Shared types: subscriptions, their state, and the decoded event context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::ProcessingError;
use crate::state::SubscriptionStateStore;

// ─── EventSubscriptionState ───────────────────────────────────────────────────

/// Named values kept across invocations for one subscription
/// (aggregate totals, cached contract addresses, query results).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSubscriptionState {
    pub event_subscription_id: i64,
    #[serde(default)]
    pub values: HashMap<String, Value>,
}

impl EventSubscriptionState {
    pub fn new(event_subscription_id: i64) -> Self {
        Self {
            event_subscription_id,
            values: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Insert or overwrite a value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }
}

// ─── EventSubscription ────────────────────────────────────────────────────────

/// A subscriber's standing registration for one class of events.
///
/// Always handled as `Arc<EventSubscription>`: every handler built for a
/// dispatch holds the same instance, so they all see the same state. The
/// in-object state is a mirror of the store. The dispatcher refreshes it from
/// [`SubscriptionStateStore`] under its per-id chain lock, so several handles
/// loaded for one id do not overwrite each other.
#[derive(Debug)]
pub struct EventSubscription {
    pub id: i64,
    pub subscriber_id: i64,
    state: Mutex<EventSubscriptionState>,
}

impl EventSubscription {
    pub fn new(id: i64, subscriber_id: i64, state: EventSubscriptionState) -> Arc<Self> {
        Arc::new(Self {
            id,
            subscriber_id,
            state: Mutex::new(state),
        })
    }

    /// Build a subscription whose state is fetched (or created) from `store`.
    pub async fn load(
        id: i64,
        subscriber_id: i64,
        store: &dyn SubscriptionStateStore,
    ) -> Result<Arc<Self>, ProcessingError> {
        let state = store.get_or_create(id).await?;
        Ok(Self::new(id, subscriber_id, state))
    }

    /// Exclusive access to the state until the guard is dropped.
    pub async fn lock_state(&self) -> MutexGuard<'_, EventSubscriptionState> {
        self.state.lock().await
    }

    /// A copy of the current state.
    pub async fn snapshot(&self) -> EventSubscriptionState {
        self.state.lock().await.clone()
    }
}

// ─── EventKey ─────────────────────────────────────────────────────────────────

/// Identifies one occurrence of one event, stable across replays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(tx_hash: &str, log_index: u32) -> Self {
        Self(format!("{}:{log_index}", tx_hash.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Transaction ──────────────────────────────────────────────────────────────

/// A full transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub transaction_index: u32,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Wei, decimal string.
    pub value: String,
    pub gas: u64,
    pub gas_price: Option<String>,
    pub nonce: u64,
    /// Calldata, `0x…`.
    pub input: String,
}

// ─── DecodedEvent ─────────────────────────────────────────────────────────────

/// One decoded event parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventParameter {
    /// 1-based position in the event signature.
    pub number: u32,
    pub name: String,
    /// Solidity type, e.g. `"uint256"`.
    pub abi_type: String,
    pub value: Value,
}

/// A decoded event log delivered to a subscription, plus whatever the
/// handlers of the current chain attach to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedEvent {
    /// Event name (e.g. `"Transfer"`).
    pub schema: String,
    /// Contract address that emitted the event.
    pub address: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub block_hash: String,
    /// Log index within the block.
    pub log_index: u32,
    pub parameters: Vec<EventParameter>,
    /// Event-scoped outputs written by handlers earlier in the chain.
    #[serde(default)]
    pub state: HashMap<String, Value>,
    /// Set by the GetTransaction handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

impl DecodedEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.tx_hash, self.log_index)
    }

    /// Look up a parameter by its 1-based number.
    pub fn parameter(&self, number: u32) -> Option<&EventParameter> {
        self.parameters.iter().find(|p| p.number == number)
    }

    pub fn parameter_value(&self, number: u32) -> Option<&Value> {
        self.parameter(number).map(|p| &p.value)
    }

    pub fn state_value(&self, name: &str) -> Option<&Value> {
        self.state.get(name)
    }

    pub fn set_state(&mut self, name: impl Into<String>, value: Value) {
        self.state.insert(name.into(), value);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
