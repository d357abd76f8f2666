//! Values carried by fact fields.
//!
//! Values support the scalar types rule sets need: booleans, integers,
//! floats, quoted strings and bare symbols. Strings and symbols are distinct:
//! `"fever"` never equals `fever`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A single field value.
///
/// # Examples
///
/// ```
/// use triage_engine::Value;
///
/// let age = Value::Int(64);
/// let answer = Value::string("yes");
/// let symptom = Value::symbol("fever");
///
/// assert!(age.is_numeric());
/// assert_eq!(answer.as_text(), Some("yes"));
/// assert!(symptom.is_symbol());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
}

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Creates a symbol value.
    #[must_use]
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::Symbol(s.into())
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub const fn is_symbol(&self) -> bool {
        matches!(self, Self::Symbol(_))
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the text of a string or symbol.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Symbol(v) => Some(v),
            _ => None,
        }
    }

    /// Equality used by pattern matching.
    ///
    /// Integers and floats compare numerically; all other values compare
    /// structurally.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_float() == other.as_float()
            }
            _ => self == other,
        }
    }

    /// Ordering used by comparison predicates.
    ///
    /// Numbers order numerically, strings and symbols lexically within their
    /// own kind. Anything else is incomparable.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.as_float()?.partial_cmp(&other.as_float()?)
            }
            (Self::String(a), Self::String(b)) | (Self::Symbol(a), Self::Symbol(b)) => {
                Some(a.cmp(b))
            }
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Symbol(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_int() {
        let val = Value::Int(42);
        assert!(val.is_int());
        assert!(val.is_numeric());
        assert_eq!(val.as_int(), Some(42));
        assert_eq!(val.as_float(), Some(42.0));
        assert_eq!(val.type_name(), "int");
    }

    #[test]
    fn test_string_and_symbol_are_distinct() {
        let s = Value::string("fever");
        let y = Value::symbol("fever");
        assert_eq!(s.as_text(), y.as_text());
        assert!(!s.matches(&y));
        assert_eq!(s.compare(&y), None);
    }

    #[test]
    fn test_numeric_matching_crosses_int_and_float() {
        assert!(Value::Int(60).matches(&Value::Float(60.0)));
        assert!(!Value::Int(60).matches(&Value::Float(60.5)));
        assert_eq!(
            Value::Float(59.5).compare(&Value::Int(60)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_incomparable_values() {
        assert_eq!(Value::Int(1).compare(&Value::string("1")), None);
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::Bool(true)), "true");
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::string("hi")), "\"hi\"");
        assert_eq!(format!("{}", Value::symbol("fever")), "fever");
    }

    #[test]
    fn test_value_serialization() {
        let val = Value::symbol("chest-pain");
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"type":"symbol","value":"chest-pain"}"#);
        let deserialized: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(val, deserialized);
    }
}
