//! Argument resolution: layered precedence and type coercion.
//!
//! Values are resolved per invocation in three layers, each overwriting the
//! previous one for any key it defines:
//!
//! 1. declared defaults,
//! 2. the optional bulk-input document (`--file`),
//! 3. values supplied explicitly by the caller (flags, positionals, tool arguments).
//!
//! Every value is coerced against its field's declared kind as it enters the
//! map, so downstream code only ever sees [`ArgValue`]s that match the schema.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CommandError;
use crate::manifest::{Field, FieldKind, Operation, Switch};

/// One `key:value` element of a `key_value` array field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyValue {
    /// Text before the first colon.
    pub key: String,
    /// Text after the first colon; absent when the token had none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Splits a `key:value` token at its first colon.
#[must_use]
pub fn parse_key_value(token: &str) -> KeyValue {
    match token.split_once(':') {
        Some((key, value)) => KeyValue {
            key: key.to_string(),
            value: Some(value.to_string()),
        },
        None => KeyValue {
            key: token.to_string(),
            value: None,
        },
    }
}

/// A schema-checked value for one field or switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Value of a `string` field.
    String(String),
    /// Value of an `integer` field.
    Integer(i64),
    /// Value of a switch.
    Bool(bool),
    /// Value of a plain `array` field.
    List(Vec<String>),
    /// Value of a `key_value` array field.
    Pairs(Vec<KeyValue>),
}

impl ArgValue {
    /// JSON representation used in request bodies.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(n) => Value::from(*n),
            Self::Bool(b) => Value::Bool(*b),
            Self::List(items) => Value::from(items.clone()),
            Self::Pairs(pairs) => Value::Array(
                pairs
                    .iter()
                    .map(|kv| {
                        let mut obj = Map::new();
                        obj.insert("key".to_string(), Value::String(kv.key.clone()));
                        if let Some(value) = &kv.value {
                            obj.insert("value".to_string(), Value::String(value.clone()));
                        }
                        Value::Object(obj)
                    })
                    .collect(),
            ),
        }
    }

    /// Text substituted into an endpoint placeholder.
    #[must_use]
    pub fn to_path_segment(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::List(items) => items.join(","),
            Self::Pairs(pairs) => pairs
                .iter()
                .map(|kv| match &kv.value {
                    Some(v) => format!("{}:{v}", kv.key),
                    None => kv.key.clone(),
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// Resolved values keyed by field or switch name; built fresh per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedArguments(BTreeMap<String, ArgValue>);

impl ResolvedArguments {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.0.insert(name.into(), value);
    }

    /// Value bound to `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.0.get(name)
    }

    /// Whether `name` has a value.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of bound values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A value as the caller supplied it, before coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum SuppliedValue {
    /// Raw command-line text.
    Text(String),
    /// Already-parsed integer (clap validated it).
    Integer(i64),
    /// Repeated or comma-delimited command-line values.
    List(Vec<String>),
    /// Boolean switch value.
    Flag(bool),
    /// A JSON value from tool arguments.
    Json(Value),
}

/// Explicit caller-supplied values, keyed by input name.
pub type SuppliedArguments = BTreeMap<String, SuppliedValue>;

/// Converts MCP tool arguments to supplied values.
#[must_use]
pub fn supplied_from_json(arguments: &Map<String, Value>) -> SuppliedArguments {
    arguments
        .iter()
        .map(|(k, v)| (k.clone(), SuppliedValue::Json(v.clone())))
        .collect()
}

/// Resolves the arguments of `op` from all three precedence layers.
///
/// Keys that name no declared input are ignored. JSON `null` counts as
/// "not supplied" in the bulk and explicit layers.
///
/// # Errors
///
/// Returns [`CommandError::Coercion`] naming the first input whose value
/// does not match its declared kind.
pub fn resolve(
    op: &Operation,
    bulk: Option<&Map<String, Value>>,
    explicit: &SuppliedArguments,
) -> Result<ResolvedArguments, CommandError> {
    let mut resolved = ResolvedArguments::new();

    for field in op.fields() {
        if let Some(default) = &field.default {
            resolved.insert(&field.name, coerce_json(field, default)?);
        }
    }
    for switch in op.switches() {
        resolved.insert(&switch.name, ArgValue::Bool(switch.default));
    }

    if let Some(bulk) = bulk {
        for (name, value) in bulk {
            if value.is_null() {
                continue;
            }
            apply(op, &mut resolved, name, &SuppliedValue::Json(value.clone()))?;
        }
    }

    for (name, value) in explicit {
        if matches!(value, SuppliedValue::Json(Value::Null)) {
            continue;
        }
        apply(op, &mut resolved, name, value)?;
    }

    Ok(resolved)
}

fn apply(
    op: &Operation,
    resolved: &mut ResolvedArguments,
    name: &str,
    value: &SuppliedValue,
) -> Result<(), CommandError> {
    if let Some(field) = op.field(name) {
        resolved.insert(name, coerce(field, value)?);
    } else if let Some(switch) = op.switch(name) {
        resolved.insert(name, coerce_switch(switch, value)?);
    } else {
        tracing::warn!(operation = %op.path, input = name, "Ignoring undeclared input");
    }
    Ok(())
}

fn mismatch(name: &str, message: impl Into<String>) -> CommandError {
    CommandError::Coercion {
        field: name.to_string(),
        message: message.into(),
    }
}

/// Coerces a supplied value against a field's declared kind.
///
/// # Errors
///
/// Returns [`CommandError::Coercion`] on a kind mismatch or a value outside
/// the field's enumeration.
pub fn coerce(field: &Field, value: &SuppliedValue) -> Result<ArgValue, CommandError> {
    match value {
        SuppliedValue::Json(json) => coerce_json(field, json),
        SuppliedValue::Text(text) => coerce_text(field, text),
        SuppliedValue::Integer(n) => match field.kind {
            FieldKind::Integer => Ok(ArgValue::Integer(*n)),
            _ => coerce_text(field, &n.to_string()),
        },
        SuppliedValue::Flag(b) => coerce_text(field, &b.to_string()),
        SuppliedValue::List(items) => match field.kind {
            FieldKind::Array => Ok(array_value(field, items.iter().map(String::as_str))),
            _ => match items.as_slice() {
                [single] => coerce_text(field, single),
                _ => Err(mismatch(&field.name, "expected a single value")),
            },
        },
    }
}

fn coerce_text(field: &Field, text: &str) -> Result<ArgValue, CommandError> {
    match field.kind {
        FieldKind::String => checked_string(field, text.to_string()),
        FieldKind::Integer => text
            .trim()
            .parse::<i64>()
            .map(ArgValue::Integer)
            .map_err(|_| mismatch(&field.name, format!("expected an integer, got '{text}'"))),
        FieldKind::Array => Ok(array_value(field, split_list(text))),
    }
}

/// Coerces a JSON value (default, bulk input, or tool argument) against a field.
///
/// # Errors
///
/// Returns [`CommandError::Coercion`] on a kind mismatch.
pub fn coerce_json(field: &Field, value: &Value) -> Result<ArgValue, CommandError> {
    match field.kind {
        FieldKind::String => match value {
            Value::String(s) => checked_string(field, s.clone()),
            Value::Number(n) => checked_string(field, n.to_string()),
            Value::Bool(b) => checked_string(field, b.to_string()),
            _ => Err(mismatch(&field.name, "expected a string")),
        },
        FieldKind::Integer => match value {
            Value::Number(n) => integer_from_number(n)
                .map(ArgValue::Integer)
                .ok_or_else(|| mismatch(&field.name, format!("expected an integer, got {n}"))),
            Value::String(s) => coerce_text(field, s),
            _ => Err(mismatch(&field.name, "expected an integer")),
        },
        FieldKind::Array => match value {
            Value::String(s) => Ok(array_value(field, split_list(s))),
            Value::Array(items) => array_from_json(field, items),
            _ => Err(mismatch(&field.name, "expected an array")),
        },
    }
}

#[allow(clippy::cast_possible_truncation)] // guarded by the fract/range checks
fn integer_from_number(n: &serde_json::Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    let f = n.as_f64()?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64).then(|| f as i64)
}

fn checked_string(field: &Field, value: String) -> Result<ArgValue, CommandError> {
    if !field.enum_values.is_empty() && !field.enum_values.contains(&value) {
        return Err(mismatch(
            &field.name,
            format!(
                "'{value}' is not one of: {}",
                field.enum_values.join(", ")
            ),
        ));
    }
    Ok(ArgValue::String(value))
}

fn split_list(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn array_value<'a>(field: &Field, items: impl Iterator<Item = &'a str>) -> ArgValue {
    if field.is_key_value() {
        ArgValue::Pairs(items.map(parse_key_value).collect())
    } else {
        ArgValue::List(items.map(str::to_string).collect())
    }
}

fn array_from_json(field: &Field, items: &[Value]) -> Result<ArgValue, CommandError> {
    let scalar = |item: &Value| match item {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };

    if field.is_key_value() {
        let pairs = items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => {
                    let key = obj.get("key").and_then(Value::as_str).ok_or_else(|| {
                        mismatch(&field.name, "key/value objects need a string 'key'")
                    })?;
                    Ok(KeyValue {
                        key: key.to_string(),
                        value: obj.get("value").and_then(scalar),
                    })
                }
                other => scalar(other)
                    .map(|s| parse_key_value(&s))
                    .ok_or_else(|| mismatch(&field.name, "expected 'key:value' strings")),
            })
            .collect::<Result<_, _>>()?;
        return Ok(ArgValue::Pairs(pairs));
    }

    let list = items
        .iter()
        .map(|item| scalar(item).ok_or_else(|| mismatch(&field.name, "expected an array of strings")))
        .collect::<Result<_, _>>()?;
    Ok(ArgValue::List(list))
}

fn coerce_switch(switch: &Switch, value: &SuppliedValue) -> Result<ArgValue, CommandError> {
    let parse = |text: &str| match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    };
    let flag = match value {
        SuppliedValue::Flag(b) | SuppliedValue::Json(Value::Bool(b)) => Some(*b),
        SuppliedValue::Text(text) | SuppliedValue::Json(Value::String(text)) => parse(text),
        _ => None,
    };
    flag.map(ArgValue::Bool)
        .ok_or_else(|| mismatch(&switch.name, "expected a boolean"))
}
