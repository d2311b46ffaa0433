//! Validation of upstream provider payloads.
//!
//! Parsing is best-effort: every check that fails is recorded as an issue and
//! the offending piece is dropped or defaulted. Whether issues are fatal is
//! decided afterwards by the [`SchemaMode`], except for payloads with nothing
//! usable in them, which fail in every mode.

use ratecast_common::{unix_seconds_now, CurrencyDirectory, RawRates};
use serde_json::Value;
use tracing::warn;

use crate::error::{FxError, FxResult};

/// Maximum number of payload characters included in validation logs.
const PAYLOAD_PREVIEW_CHARS: usize = 2000;

/// How validation issues are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchemaMode {
    /// Log issues and keep the best-effort value.
    #[default]
    Lenient,
    /// Fail with `UpstreamSchemaInvalid` on any issue.
    ///
    /// Kept for compatibility testing against provider changes; leaving it on
    /// in production turns every upstream quirk into a failed cycle.
    Strict,
}

/// A best-effort parse result with the issues found along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    /// Value extracted from the payload.
    pub value: T,
    /// Human-readable validation failures.
    pub issues: Vec<String>,
    /// The payload carried nothing usable; `value` is only a placeholder.
    pub unusable: bool,
}

impl<T> Parsed<T> {
    fn new(value: T, issues: Vec<String>) -> Self {
        Self {
            value,
            issues,
            unusable: false,
        }
    }

    fn unusable(value: T, issues: Vec<String>) -> Self {
        Self {
            value,
            issues,
            unusable: true,
        }
    }

    /// Check if the payload matched the expected shape.
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Apply the schema mode to this parse.
    pub fn into_result(self, mode: SchemaMode, endpoint: &str, payload: &Value) -> FxResult<T> {
        if self.issues.is_empty() {
            return Ok(self.value);
        }

        warn!(
            endpoint,
            issues = ?self.issues,
            payload = %preview(payload),
            strict = mode == SchemaMode::Strict,
            unusable = self.unusable,
            "Upstream schema validation failed"
        );

        match mode {
            SchemaMode::Lenient if !self.unusable => Ok(self.value),
            _ => Err(FxError::UpstreamSchemaInvalid {
                endpoint: endpoint.to_string(),
                issues: self.issues,
            }),
        }
    }
}

fn preview(payload: &Value) -> String {
    payload.to_string().chars().take(PAYLOAD_PREVIEW_CHARS).collect()
}

/// Parse a `latest.json` payload: `{ base, timestamp, rates: { code: number } }`.
pub fn parse_latest(payload: &Value) -> Parsed<RawRates> {
    let mut issues = Vec::new();
    let mut value = RawRates {
        timestamp: unix_seconds_now(),
        ..Default::default()
    };

    let Some(object) = payload.as_object() else {
        issues.push("payload is not an object".to_string());
        return Parsed::unusable(value, issues);
    };

    match object.get("base") {
        Some(Value::String(base)) => value.base = base.clone(),
        Some(_) => issues.push("field `base` is not a string".to_string()),
        None => issues.push("missing field `base`".to_string()),
    }

    match object.get("timestamp") {
        Some(Value::Number(n)) => match n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)) {
            Some(ts) => value.timestamp = ts,
            None => issues.push("field `timestamp` is out of range".to_string()),
        },
        Some(_) => issues.push("field `timestamp` is not a number".to_string()),
        None => issues.push("missing field `timestamp`".to_string()),
    }

    match object.get("rates") {
        Some(Value::Object(rates)) => {
            for (code, rate) in rates {
                match rate.as_f64() {
                    Some(rate) if rate.is_finite() && rate > 0.0 => {
                        value.rates.insert(code.clone(), rate);
                    }
                    Some(_) => issues.push(format!("rate `{code}` is not positive")),
                    None => issues.push(format!("rate `{code}` is not a number")),
                }
            }
        }
        Some(_) => {
            issues.push("field `rates` is not an object".to_string());
            return Parsed::unusable(value, issues);
        }
        None => {
            issues.push("missing field `rates`".to_string());
            return Parsed::unusable(value, issues);
        }
    }

    Parsed::new(value, issues)
}

/// Parse a `currencies.json` payload: `{ code: name }`.
pub fn parse_currencies(payload: &Value) -> Parsed<CurrencyDirectory> {
    let mut issues = Vec::new();
    let mut value = CurrencyDirectory::new();

    let Some(object) = payload.as_object() else {
        issues.push("payload is not an object".to_string());
        return Parsed::unusable(value, issues);
    };

    for (code, name) in object {
        match name {
            Value::String(name) => value.insert(code.clone(), name.clone()),
            _ => issues.push(format!("name of `{code}` is not a string")),
        }
    }

    Parsed::new(value, issues)
}
