//! chainflow-core: handler dispatch for decoded on-chain events.
//!
//! # Architecture
//!
//! ```text
//! DecodedEvent → Dispatcher
//!                    ├── EventHandlerRepository  (ordered chain per subscription)
//!                    ├── HandlerHistoryStore     (skip already-handled pairs)
//!                    ├── EventHandlerFactory     (config row → EventHandler)
//!                    │       ├── configuration repositories
//!                    │       └── queue / search index / log store factories
//!                    └── SubscriptionStateStore  (one flush per chain)
//! ```
//!
//! Storage, queues, RPC and contract calls are injected behind the traits in
//! [`repository`], [`history`] and [`state`]; in-memory implementations live in
//! `chainflow-storage`.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod handler;
pub mod history;
pub mod logging;
pub mod repository;
pub mod state;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::{
    AggregatorDestination, AggregatorOperation, ContractQueryConfiguration,
    ContractQueryParameter, EventAggregatorConfiguration, EventHandlerDto, EventHandlerType,
    EventRuleDto, EventRuleType, ValueSource,
};
pub use dispatcher::{
    DispatchConfig, DispatchConfigBuilder, DispatchReport, Dispatcher, FailurePolicy,
};
pub use error::ProcessingError;
pub use factory::{EventHandlerFactory, FactoryDependencies};
pub use handler::{EventHandler, HandlerContext};
pub use history::{HandlerHistory, HandlerHistoryStore};
pub use logging::{init_tracing, LogConfig};
pub use state::SubscriptionStateStore;
pub use types::{
    DecodedEvent, EventKey, EventParameter, EventSubscription, EventSubscriptionState, Transaction,
};
