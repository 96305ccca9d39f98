//! Attribute definitions and type coercion for inbound identify payloads.

use jiff::Timestamp;
use jiff::civil::Date;
use jiff::tz::TimeZone;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use strum::{AsRefStr, Display, EnumString};

/// Declared type of a user attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Boolean,
    Date,
    Currency,
}

/// Maps an external attribute onto a typed internal one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAttributeDefinition {
    /// Key as sent by the provider.
    pub external_key: String,
    /// Key stored on the user.
    pub key: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl UserAttributeDefinition {
    /// Creates a definition.
    pub fn new(
        external_key: impl Into<String>,
        key: impl Into<String>,
        attribute_type: AttributeType,
    ) -> Self {
        Self {
            external_key: external_key.into(),
            key: key.into(),
            attribute_type,
        }
    }
}

/// Coerces `value` to `attribute_type`; `None` when it cannot be represented.
pub fn coerce(value: &Value, attribute_type: AttributeType) -> Option<Value> {
    match attribute_type {
        AttributeType::String => match value {
            Value::String(text) => Some(Value::String(text.clone())),
            Value::Number(number) => Some(Value::String(number.to_string())),
            Value::Bool(flag) => Some(Value::String(flag.to_string())),
            _ => None,
        },
        AttributeType::Number => coerce_number(value),
        AttributeType::Boolean => match value {
            Value::Bool(flag) => Some(Value::Bool(*flag)),
            Value::Number(number) => match number.as_f64() {
                Some(n) if n == 0.0 => Some(Value::Bool(false)),
                Some(n) if n == 1.0 => Some(Value::Bool(true)),
                _ => None,
            },
            Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        AttributeType::Date => coerce_date(value).map(|ts| Value::String(ts.to_string())),
        AttributeType::Currency => {
            let amount = coerce_number(value)?.as_f64()?;
            Number::from_f64((amount * 100.0).round() / 100.0).map(Value::Number)
        }
    }
}

fn coerce_number(value: &Value) -> Option<Value> {
    match value {
        Value::Number(number) => Some(Value::Number(number.clone())),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(integer) = text.parse::<i64>() {
                return Some(Value::Number(integer.into()));
            }
            text.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
        }
        _ => None,
    }
}

fn coerce_date(value: &Value) -> Option<Timestamp> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if let Ok(timestamp) = text.parse::<Timestamp>() {
                return Some(timestamp);
            }
            let date = text.parse::<Date>().ok()?;
            date.to_zoned(TimeZone::UTC).ok().map(|zoned| zoned.timestamp())
        }
        Value::Number(number) => Timestamp::from_second(number.as_i64()?).ok(),
        _ => None,
    }
}

/// Keeps only defined attributes, renamed to their internal key and coerced.
///
/// Unmapped keys, nulls and values that fail coercion are dropped.
pub fn map_attributes(
    attributes: &Map<String, Value>,
    definitions: &[UserAttributeDefinition],
) -> Map<String, Value> {
    definitions
        .iter()
        .filter_map(|definition| {
            let raw = attributes.get(&definition.external_key)?;
            let value = coerce(raw, definition.attribute_type)?;
            Some((definition.key.clone(), value))
        })
        .collect()
}
