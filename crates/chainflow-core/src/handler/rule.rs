use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::{EventRuleDto, EventRuleType};
use crate::error::ProcessingError;
use crate::types::{DecodedEvent, EventSubscription, EventSubscriptionState};
use crate::value::{self, Numeric};

use super::HandlerContext;

/// Compares one event value against a configured literal.
///
/// A non-match stops the chain. A missing source value never matches,
/// except for [`EventRuleType::Empty`].
pub struct EventRule {
    pub id: i64,
    pub subscription: Arc<EventSubscription>,
    pub configuration: Arc<EventRuleDto>,
}

impl EventRule {
    pub(crate) async fn handle(
        &self,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<bool, ProcessingError> {
        let matched = self.evaluate(ctx.event, ctx.state)?;
        tracing::debug!(handler_id = self.id, matched, "rule evaluated");
        Ok(matched)
    }

    pub fn evaluate(
        &self,
        event: &DecodedEvent,
        state: &EventSubscriptionState,
    ) -> Result<bool, ProcessingError> {
        let cfg = &self.configuration;
        match (cfg.rule_type, value::resolve(&cfg.source, event, state)) {
            (EventRuleType::Empty, actual) => Ok(is_empty(actual.as_ref())),
            (_, None) => Ok(false),
            (rule_type, Some(actual)) => self.check(rule_type, &actual),
        }
    }

    fn check(&self, rule_type: EventRuleType, actual: &Value) -> Result<bool, ProcessingError> {
        let expected = self.configuration.value.as_deref().ok_or_else(|| {
            ProcessingError::InvalidValue(format!("rule {} has no comparison value", self.id))
        })?;

        match rule_type {
            EventRuleType::Empty => Ok(is_empty(Some(actual))),
            EventRuleType::Equals => Ok(equals(actual, expected)),
            EventRuleType::NotEquals => Ok(!equals(actual, expected)),
            EventRuleType::GreaterThan => self.compare(actual, expected, Ordering::is_gt),
            EventRuleType::GreaterOrEqual => self.compare(actual, expected, Ordering::is_ge),
            EventRuleType::LessThan => self.compare(actual, expected, Ordering::is_lt),
            EventRuleType::LessOrEqual => self.compare(actual, expected, Ordering::is_le),
            EventRuleType::Modulus => {
                let (a, e) = self.numeric_pair(actual, expected)?;
                a.is_multiple_of(e).ok_or_else(|| {
                    ProcessingError::InvalidValue(format!("rule {}: modulus by zero", self.id))
                })
            }
        }
    }

    fn compare(
        &self,
        actual: &Value,
        expected: &str,
        accept: fn(Ordering) -> bool,
    ) -> Result<bool, ProcessingError> {
        let (a, e) = self.numeric_pair(actual, expected)?;
        Ok(a.partial_cmp(&e).is_some_and(accept))
    }

    fn numeric_pair(
        &self,
        actual: &Value,
        expected: &str,
    ) -> Result<(Numeric, Numeric), ProcessingError> {
        let a = Numeric::from_value(actual).ok_or_else(|| {
            ProcessingError::InvalidValue(format!("rule {}: {actual} is not numeric", self.id))
        })?;
        let e = Numeric::parse(expected).ok_or_else(|| {
            ProcessingError::InvalidValue(format!("rule {}: '{expected}' is not numeric", self.id))
        })?;
        Ok((a, e))
    }
}

fn is_empty(actual: Option<&Value>) -> bool {
    match actual {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Numeric when both sides are numbers, case-insensitive text otherwise
/// (addresses and hashes differ in checksum casing).
fn equals(actual: &Value, expected: &str) -> bool {
    match (Numeric::from_value(actual), Numeric::parse(expected)) {
        (Some(a), Some(e)) => a.partial_cmp(&e) == Some(Ordering::Equal),
        _ => value::as_text(actual).eq_ignore_ascii_case(expected),
    }
}
