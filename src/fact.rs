//! Facts: immutable pieces of asserted knowledge.
//!
//! A fact is a relation name plus positional values. When the relation names
//! a declared [`Template`](crate::template::Template) the values follow the
//! template's field order; otherwise the fact is an ordered tuple such as
//! `(has fever)` and may have any arity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Identifier of a fact within one session.
///
/// Ids are assigned from a per-session sequence, so they also record
/// insertion order. They are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(u64);

impl FactId {
    /// Wraps a raw sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f-{}", self.0)
    }
}

/// An immutable fact value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Template or relation name.
    pub relation: String,
    /// Field values, positional.
    pub values: Vec<Value>,
}

impl Fact {
    /// Creates a fact from a relation name and positional values.
    #[must_use]
    pub fn new(relation: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            relation: relation.into(),
            values,
        }
    }

    /// Creates an ordered fact whose values are all symbols, e.g. `(has fever)`.
    #[must_use]
    pub fn symbols<I, S>(relation: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(relation, symbols.into_iter().map(Value::symbol).collect())
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of values.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.relation)?;
        for v in &self.values {
            write!(f, " {v}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fact_display() {
        let fact = Fact::symbols("has", ["shortness-of-breath"]);
        assert_eq!(fact.to_string(), "(has shortness-of-breath)");

        let fact = Fact::new("symptom", vec![Value::string("fever"), Value::string("yes")]);
        assert_eq!(fact.to_string(), "(symptom \"fever\" \"yes\")");
    }

    #[test]
    fn test_fact_id_orders_by_sequence() {
        assert!(FactId::new(1) < FactId::new(2));
        assert_eq!(FactId::new(7).to_string(), "f-7");
    }

    #[test]
    fn test_fact_accessors() {
        let fact = Fact::new("diagnosis_level", vec![Value::Int(80)]);
        assert_eq!(fact.arity(), 1);
        assert_eq!(fact.value(0), Some(&Value::Int(80)));
        assert_eq!(fact.value(1), None);
    }
}
