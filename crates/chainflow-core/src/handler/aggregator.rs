use serde_json::Value;
use std::sync::Arc;

use crate::config::{AggregatorDestination, AggregatorOperation, EventAggregatorConfiguration};
use crate::error::ProcessingError;
use crate::types::EventSubscription;
use crate::value::{self, Numeric};

use super::HandlerContext;

/// Folds one event value into a running aggregate kept in subscription state
/// (or in the event state, for per-event outputs).
///
/// The read-modify-write is safe because the dispatch loop holds the
/// subscription's state lock for the whole chain.
pub struct EventAggregator {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub configuration: Arc<EventAggregatorConfiguration>,
}

impl EventAggregator {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        let cfg = &self.configuration;

        let input = if cfg.operation.needs_source_value() {
            let v = value::resolve(&cfg.source, ctx.event, ctx.state).ok_or_else(|| {
                ProcessingError::InvalidValue(format!(
                    "aggregator {}: {} not found",
                    self.id,
                    value::describe(&cfg.source)
                ))
            })?;
            Some(v)
        } else {
            None
        };

        let writes = self.apply(ctx, input)?;
        tracing::debug!(
            handler_id = self.id,
            operation = ?cfg.operation,
            output_key = %cfg.output_key,
            "aggregate updated"
        );
        for (key, v) in writes {
            write(ctx, cfg.destination, key, v);
        }
        Ok(true)
    }

    /// Compute the new values to write without touching the destination.
    fn apply(
        &self,
        ctx: &HandlerContext<'_>,
        input: Option<Value>,
    ) -> Result<Vec<(String, Value)>, ProcessingError> {
        let cfg = &self.configuration;
        let key = cfg.output_key.clone();
        let current = read(ctx, cfg.destination, &key);

        let out = match cfg.operation {
            AggregatorOperation::Count => {
                let prior = self.numeric_or(current, Numeric::Int(0))?;
                vec![(key, prior.add(Numeric::Int(1)).to_value())]
            }
            AggregatorOperation::Sum => {
                let prior = self.numeric_or(current, Numeric::Int(0))?;
                let x = self.numeric_input(input)?;
                vec![(key, prior.add(x).to_value())]
            }
            AggregatorOperation::Min | AggregatorOperation::Max => {
                let x = self.numeric_input(input)?;
                let next = match current {
                    None | Some(Value::Null) => x,
                    Some(v) => {
                        let prior = self.numeric(&v)?;
                        let keep_prior = match cfg.operation {
                            AggregatorOperation::Min => prior <= x,
                            _ => prior >= x,
                        };
                        if keep_prior {
                            prior
                        } else {
                            x
                        }
                    }
                };
                vec![(key, next.to_value())]
            }
            AggregatorOperation::Average => {
                let x = self.numeric_input(input)?;
                let sum_key = format!("{key}.sum");
                let count_key = format!("{key}.count");
                let sum = self
                    .numeric_or(read(ctx, cfg.destination, &sum_key), Numeric::Int(0))?
                    .add(x);
                let seen = read(ctx, cfg.destination, &count_key);
                let count = match self.numeric_or(seen, Numeric::Int(0))? {
                    Numeric::Int(n) => n + 1,
                    Numeric::Float(f) => f as i128 + 1,
                };
                let average = sum.div(count).unwrap_or(sum);
                vec![
                    (sum_key, sum.to_value()),
                    (count_key, Value::from(count as i64)),
                    (key, average.to_value()),
                ]
            }
            AggregatorOperation::AddToList | AggregatorOperation::AddToUniqueList => {
                let item = input.unwrap_or(Value::Null);
                let mut list = match current {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items,
                    Some(other) => {
                        return Err(ProcessingError::InvalidValue(format!(
                            "aggregator {}: '{key}' holds {other}, expected a list",
                            self.id
                        )))
                    }
                };
                let unique = cfg.operation == AggregatorOperation::AddToUniqueList;
                if !unique || !list.contains(&item) {
                    list.push(item);
                }
                vec![(key, Value::Array(list))]
            }
        };
        Ok(out)
    }

    fn numeric(&self, v: &Value) -> Result<Numeric, ProcessingError> {
        Numeric::from_value(v).ok_or_else(|| {
            ProcessingError::InvalidValue(format!("aggregator {}: {v} is not numeric", self.id))
        })
    }

    fn numeric_or(&self, v: Option<Value>, identity: Numeric) -> Result<Numeric, ProcessingError> {
        match v {
            None | Some(Value::Null) => Ok(identity),
            Some(v) => self.numeric(&v),
        }
    }

    fn numeric_input(&self, input: Option<Value>) -> Result<Numeric, ProcessingError> {
        self.numeric(&input.unwrap_or(Value::Null))
    }
}

fn read(ctx: &HandlerContext<'_>, destination: AggregatorDestination, key: &str) -> Option<Value> {
    match destination {
        AggregatorDestination::SubscriptionState => ctx.state.get(key).cloned(),
        AggregatorDestination::EventState => ctx.event.state_value(key).cloned(),
    }
}

fn write(ctx: &mut HandlerContext<'_>, destination: AggregatorDestination, key: String, v: Value) {
    match destination {
        AggregatorDestination::SubscriptionState => ctx.state.set(key, v),
        AggregatorDestination::EventState => ctx.event.set_state(key, v),
    }
}
