//! Value resolution and numeric coercion shared by the rule, aggregator and
//! contract-query handlers.

use serde_json::Value;
use std::cmp::Ordering;

use crate::config::ValueSource;
use crate::types::{DecodedEvent, EventSubscriptionState};

/// Resolve `source` against the event being handled and the subscription state.
///
/// Returns `None` when the referenced parameter or key does not exist.
pub fn resolve(
    source: &ValueSource,
    event: &DecodedEvent,
    state: &EventSubscriptionState,
) -> Option<Value> {
    match source {
        ValueSource::Static(v) => Some(v.clone()),
        ValueSource::EventAddress => Some(Value::String(event.address.clone())),
        ValueSource::EventParameter(number) => event.parameter_value(*number).cloned(),
        ValueSource::EventState(name) => event.state_value(name).cloned(),
        ValueSource::SubscriptionState(name) => state.get(name).cloned(),
    }
}

/// Human-readable description of a source, for error messages.
pub fn describe(source: &ValueSource) -> String {
    match source {
        ValueSource::Static(_) => "static value".into(),
        ValueSource::EventAddress => "event address".into(),
        ValueSource::EventParameter(n) => format!("event parameter {n}"),
        ValueSource::EventState(name) => format!("event state '{name}'"),
        ValueSource::SubscriptionState(name) => format!("subscription state '{name}'"),
    }
}

/// Strings are taken verbatim; everything else uses its JSON rendering.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─── Numeric ──────────────────────────────────────────────────────────────────

/// A number extracted from event or state values.
///
/// Integers stay exact up to `i128`; anything else (or an overflowing
/// integer operation) falls back to `f64`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    /// Accepts JSON numbers and decimal or `0x` hex strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self::Int(i as i128))
                } else if let Some(u) = n.as_u64() {
                    Some(Self::Int(u as i128))
                } else {
                    n.as_f64().map(Self::Float)
                }
            }
            Value::String(s) => Self::parse(s),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            return i128::from_str_radix(hex, 16).ok().map(Self::Int);
        }
        s.parse::<i128>()
            .ok()
            .map(Self::Int)
            .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(Self::Float))
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }

    pub fn add(self, other: Self) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a
                .checked_add(b)
                .map(Self::Int)
                .unwrap_or(Self::Float(a as f64 + b as f64)),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }

    /// Exact when `self` divides evenly, `f64` otherwise. `None` when `divisor` is zero.
    pub fn div(self, divisor: i128) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        match self {
            Self::Int(a) if a.checked_rem(divisor) == Some(0) => {
                a.checked_div(divisor).map(Self::Int)
            }
            other => Some(Self::Float(other.as_f64() / divisor as f64)),
        }
    }

    /// `None` when `divisor` is zero.
    pub fn is_multiple_of(self, divisor: Self) -> Option<bool> {
        match (self, divisor) {
            (Self::Int(a), Self::Int(b)) => {
                (b != 0).then(|| a.checked_rem(b).map_or(true, |r| r == 0))
            }
            (a, b) => {
                let b = b.as_f64();
                (b != 0.0).then(|| a.as_f64() % b == 0.0)
            }
        }
    }

    /// Integers outside the `i64`/`u64` range are written as decimal strings.
    pub fn to_value(self) -> Value {
        match self {
            Self::Int(i) => {
                if let Ok(v) = i64::try_from(i) {
                    Value::from(v)
                } else if let Ok(v) = u64::try_from(i) {
                    Value::from(v)
                } else {
                    Value::String(i.to_string())
                }
            }
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        }
    }
}

impl PartialOrd for Numeric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}
