//! Property kinds and values exchanged with the metadata store.
//!
//! The store understands exactly three primitive kinds: STRING, INT and
//! DOUBLE. Execution properties are always normalized to text before
//! storage so cache equivalence reduces to plain text-map equality.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The primitive kind of a property in a type schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    /// A UTF-8 string property.
    String,
    /// A 64-bit integer property.
    Int,
    /// A 64-bit floating point property.
    Double,
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "STRING"),
            Self::Int => write!(f, "INT"),
            Self::Double => write!(f, "DOUBLE"),
        }
    }
}

/// A property value carried by an artifact, execution or context record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    /// A string value.
    String(String),
    /// An integer value.
    Int(i64),
    /// A floating point value.
    Double(f64),
}

impl PropertyValue {
    /// Returns the schema kind of this value.
    #[must_use]
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::String(_) => PropertyType::String,
            Self::Int(_) => PropertyType::Int,
            Self::Double(_) => PropertyType::Double,
        }
    }

    /// Normalizes the value to its text encoding.
    ///
    /// Execution properties are always persisted in this form regardless
    /// of their original kind.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Double(d) => d.to_string(),
        }
    }

    /// Returns the string value, if this is a string property.
    #[must_use]
    pub fn string_value(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer property.
    #[must_use]
    pub fn int_value(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the floating point value, if this is a double property.
    #[must_use]
    pub fn double_value(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// An ordered property bag. Ordering makes map equality deterministic,
/// which the cache equivalence test relies on.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// An ordered mapping from property name to schema kind.
pub type PropertySchema = BTreeMap<String, PropertyType>;

/// Formats a schema as `{name: KIND, ...}` for diagnostics.
#[must_use]
pub fn format_schema(schema: &PropertySchema) -> String {
    let fields: Vec<String> = schema.iter().map(|(k, t)| format!("{k}: {t}")).collect();
    format!("{{{}}}", fields.join(", "))
}
