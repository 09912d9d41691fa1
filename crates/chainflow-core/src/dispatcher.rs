//! The dispatch loop: runs one event through its subscription's handler chain.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

use crate::config::EventHandlerDto;
use crate::error::ProcessingError;
use crate::factory::EventHandlerFactory;
use crate::handler::HandlerContext;
use crate::history::HandlerHistoryStore;
use crate::repository::EventHandlerRepository;
use crate::state::SubscriptionStateStore;
use crate::types::{DecodedEvent, EventKey, EventSubscription, EventSubscriptionState};

// ─── Config ───────────────────────────────────────────────────────────────────

/// What the loop does when a constructed handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the chain and return the error.
    #[default]
    Abort,
    /// Log the failure, note it in the report and run the next handler.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Events dispatched concurrently by [`Dispatcher::dispatch_all`].
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    16
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl DispatchConfig {
    pub fn builder() -> DispatchConfigBuilder {
        DispatchConfigBuilder::default()
    }
}

/// Fluent builder for [`DispatchConfig`].
#[derive(Debug, Default)]
pub struct DispatchConfigBuilder {
    config: DispatchConfig,
}

impl DispatchConfigBuilder {
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Clamped to at least 1.
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n.max(1);
        self
    }

    pub fn build(self) -> DispatchConfig {
        self.config
    }
}

// ─── Report ───────────────────────────────────────────────────────────────────

/// Outcome of dispatching one event.
#[derive(Debug)]
pub struct DispatchReport {
    pub event_key: EventKey,
    /// The event as the last handler left it.
    pub event: DecodedEvent,
    /// Handler ids that ran successfully, in chain order.
    pub executed: Vec<i64>,
    /// History-tracked handlers that had already handled this event.
    pub skipped: Vec<i64>,
    /// Failures tolerated under [`FailurePolicy::Continue`].
    pub failed: Vec<ProcessingError>,
    /// The handler that stopped the chain, if any.
    pub stopped_by: Option<i64>,
}

impl DispatchReport {
    fn new(event: DecodedEvent) -> Self {
        Self {
            event_key: event.key(),
            event,
            executed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            stopped_by: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

pub struct Dispatcher {
    handlers: Arc<dyn EventHandlerRepository>,
    factory: EventHandlerFactory,
    history: Arc<dyn HandlerHistoryStore>,
    states: Arc<dyn SubscriptionStateStore>,
    config: DispatchConfig,
    /// One lock per subscription id, shared by every handle to that subscription.
    chain_locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

impl Dispatcher {
    pub fn new(
        handlers: Arc<dyn EventHandlerRepository>,
        factory: EventHandlerFactory,
        history: Arc<dyn HandlerHistoryStore>,
        states: Arc<dyn SubscriptionStateStore>,
    ) -> Self {
        Self {
            handlers,
            factory,
            history,
            states,
            config: DispatchConfig::default(),
            chain_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn chain_lock(&self, subscription_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = self.chain_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(subscription_id).or_default().clone()
    }

    /// Run `event` through the enabled handlers of `subscription`, in order.
    ///
    /// Chains for one subscription id run one at a time, whichever
    /// `EventSubscription` handle they come through. Inside that lock the
    /// state is re-read from the store, so the handle's own copy is only a
    /// mirror. The state is flushed with one upsert at the end, also when the
    /// chain fails.
    pub async fn dispatch(
        &self,
        subscription: &Arc<EventSubscription>,
        event: DecodedEvent,
    ) -> Result<DispatchReport, ProcessingError> {
        let mut configs = self.handlers.get_event_handlers(subscription.id).await?;
        configs.retain(|c| !c.disabled);
        configs.sort_by_key(|c| c.order);

        let mut report = DispatchReport::new(event);
        let chain_lock = self.chain_lock(subscription.id);
        let _serial = chain_lock.lock().await;
        let stored = self.states.get_or_create(subscription.id).await?;
        let mut state = subscription.lock_state().await;
        *state = stored;
        let outcome = self.run_chain(subscription, &configs, &mut state, &mut report).await;
        let flushed = self.states.upsert(vec![state.clone()]).await;
        drop(state);

        match (outcome, flushed) {
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    tracing::warn!(
                        event_subscription_id = subscription.id,
                        error = %flush_err,
                        "state flush failed after aborted chain"
                    );
                }
                tracing::warn!(
                    event_subscription_id = subscription.id,
                    event_key = %report.event_key,
                    error = %e,
                    "dispatch aborted"
                );
                Err(e)
            }
            (Ok(()), Err(e)) => Err(e),
            (Ok(()), Ok(())) => {
                tracing::info!(
                    event_subscription_id = subscription.id,
                    event_key = %report.event_key,
                    executed = report.executed.len(),
                    skipped = report.skipped.len(),
                    failed = report.failed.len(),
                    "event dispatched"
                );
                Ok(report)
            }
        }
    }

    async fn run_chain(
        &self,
        subscription: &Arc<EventSubscription>,
        configs: &[EventHandlerDto],
        state: &mut EventSubscriptionState,
        report: &mut DispatchReport,
    ) -> Result<(), ProcessingError> {
        for config in configs {
            let kind = config.kind()?;
            let seen = kind.tracks_history()
                && self.history.contains(config.id, &report.event_key).await?;
            if seen && kind.skips_on_replay() {
                tracing::debug!(
                    handler_id = config.id,
                    event_key = %report.event_key,
                    "already handled"
                );
                report.skipped.push(config.id);
                continue;
            }

            let handler = self.factory.load(subscription, config).await?;
            let mut ctx = HandlerContext::new(&mut report.event, &mut *state).replaying(seen);
            match handler.handle(&mut ctx).await {
                Ok(proceed) => {
                    if kind.tracks_history()
                        && !seen
                        && !self.history.record(config.id, &report.event_key).await?
                    {
                        tracing::debug!(handler_id = config.id, "history already recorded");
                    }
                    report.executed.push(config.id);
                    if !proceed {
                        report.stopped_by = Some(config.id);
                        break;
                    }
                }
                Err(e) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Continue => {
                        tracing::warn!(
                            handler_id = config.id,
                            error = %e,
                            "handler failed, continuing"
                        );
                        report.failed.push(e);
                    }
                },
            }
        }
        Ok(())
    }

    /// Dispatch a batch, up to `max_concurrency` events at a time.
    ///
    /// One result per item, in input order. Events of the same subscription
    /// id still run one chain at a time.
    pub async fn dispatch_all(
        &self,
        items: Vec<(Arc<EventSubscription>, DecodedEvent)>,
    ) -> Vec<Result<DispatchReport, ProcessingError>> {
        stream::iter(items)
            .map(|(subscription, event)| async move { self.dispatch(&subscription, event).await })
            .buffered(self.config.max_concurrency.max(1))
            .collect()
            .await
    }
}
