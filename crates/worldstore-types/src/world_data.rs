//! World data documents.
//!
//! A world data document is the unit of persistence: an opaque,
//! self-describing JSON mapping produced by the simulation. The connector
//! layer only relies on two fields, `world_name` and `saved_at`, which
//! together form the natural identity of a snapshot. Everything else
//! (agents, environment state, metadata) passes through untouched.
//!
//! [`WorldData`] can only be built from a value that passes the structural
//! check, so a `WorldData` in hand is always safe to hand to a backend.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Fields every world data document must carry.
pub const REQUIRED_FIELDS: [&str; 2] = ["world_name", "saved_at"];

static NULL: Value = Value::Null;

/// Reasons a candidate document is not valid world data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The document is not a JSON object.
    #[error("world data must be a mapping, got {found}")]
    NotAMapping {
        /// JSON type name of the rejected value.
        found: &'static str,
    },

    /// A required field is absent.
    #[error("missing required field in world data: {0}")]
    MissingField(&'static str),
}

/// A validated world data document.
///
/// Guaranteed to be a JSON object containing `world_name` and `saved_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WorldData(Map<String, Value>);

impl WorldData {
    /// Validate `value` and take ownership of it as world data.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotAMapping`] for non-object values and
    /// [`ValidationError::MissingField`] naming the first absent field.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => {
                if let Some(field) = REQUIRED_FIELDS.iter().find(|f| !map.contains_key(**f)) {
                    return Err(ValidationError::MissingField(*field));
                }
                Ok(Self(map))
            }
            other => Err(ValidationError::NotAMapping {
                found: json_type_name(&other),
            }),
        }
    }

    /// Validate a borrowed value, cloning it on success.
    ///
    /// # Errors
    ///
    /// Same as [`WorldData::from_value`].
    pub fn from_ref(value: &Value) -> Result<Self, ValidationError> {
        check_shape(value)?;
        Self::from_value(value.clone())
    }

    /// The `world_name` field.
    pub fn world_name(&self) -> &Value {
        self.0.get("world_name").unwrap_or(&NULL)
    }

    /// The `saved_at` field.
    pub fn saved_at(&self) -> &Value {
        self.0.get("saved_at").unwrap_or(&NULL)
    }

    /// `world_name` rendered as the string key backends index on.
    pub fn world_key(&self) -> String {
        world_key_of(self.world_name())
    }

    /// Look up an arbitrary payload field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Borrow the underlying mapping.
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert back into a plain JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Serialize to compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl TryFrom<Value> for WorldData {
    type Error = ValidationError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<WorldData> for Value {
    fn from(data: WorldData) -> Self {
        data.into_value()
    }
}

impl<'de> Deserialize<'de> for WorldData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Check the structure of `value` without cloning it.
fn check_shape(value: &Value) -> Result<(), ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::NotAMapping {
            found: json_type_name(value),
        });
    };
    match REQUIRED_FIELDS.iter().find(|f| !map.contains_key(**f)) {
        Some(field) => Err(ValidationError::MissingField(*field)),
        None => Ok(()),
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a `world_name` value as a string key.
///
/// Strings are used verbatim; any other JSON value uses its compact JSON
/// text so that non-string names still map to a stable key.
pub fn world_key_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a `saved_at` value for human-readable listings.
pub fn saved_at_label(value: &Value) -> String {
    world_key_of(value)
}

/// Total order over `saved_at` tokens.
///
/// Numbers compare numerically and strings lexicographically (ISO-8601
/// timestamps therefore sort chronologically). Across types, numbers sort
/// before strings, and anything else sorts last by its JSON text.
pub fn compare_saved_at(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a)
            .cmp(&type_rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

const fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        _ => 2,
    }
}

fn compare_numbers(x: &serde_json::Number, y: &serde_json::Number) -> Ordering {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a.cmp(&b);
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a.cmp(&b);
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => Ordering::Equal,
    }
}
