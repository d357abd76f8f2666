//! Atomic fact patterns and field tests.
//!
//! A pattern selects facts of one relation and constrains their fields.
//! Templated facts are usually matched by field name; ordered facts such as
//! `(has fever)` are matched by position.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Comparison operator for field predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    /// Returns true if `ordering` (left compared to right) satisfies the operator.
    #[must_use]
    pub const fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => matches!(ordering, Ordering::Equal),
            Self::Ne => !matches!(ordering, Ordering::Equal),
            Self::Lt => matches!(ordering, Ordering::Less),
            Self::Le => !matches!(ordering, Ordering::Greater),
            Self::Gt => matches!(ordering, Ordering::Greater),
            Self::Ge => !matches!(ordering, Ordering::Less),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Right-hand side of a comparison, or a value in a rule action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Operand {
    /// A constant.
    Literal(Value),
    /// A variable bound earlier in the same condition.
    Var(String),
}

impl Operand {
    /// Variable operand.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Returns the variable name, if any.
    #[must_use]
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(v) => Some(v),
            Self::Literal(_) => None,
        }
    }
}

macro_rules! literal_operand {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Operand {
                fn from(v: $t) -> Self {
                    Self::Literal(Value::from(v))
                }
            }
        )*
    };
}

literal_operand!(bool, i32, i64, f64, String, &str);

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => write!(f, "{v}"),
            Self::Var(name) => write!(f, "?{name}"),
        }
    }
}

/// Test applied to one field of a candidate fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum FieldTest {
    /// Matches any value.
    Any,
    /// Field equals a constant.
    Literal {
        value: Value,
    },
    /// Captures the field into a variable. If the variable is already bound
    /// the field must equal the bound value.
    Bind {
        var: String,
    },
    /// Field compared against a constant or a bound variable.
    Compare {
        op: CompareOp,
        rhs: Operand,
    },
    /// Textual field matches a regular expression.
    Regex {
        pattern: String,
    },
    /// Every nested test must hold, e.g. capture-and-constrain.
    All {
        tests: Vec<FieldTest>,
    },
}

impl FieldTest {
    /// Equality with a constant.
    #[must_use]
    pub fn eq(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    /// Equality with a symbol constant.
    #[must_use]
    pub fn symbol(s: impl Into<String>) -> Self {
        Self::eq(Value::symbol(s))
    }

    /// Variable capture.
    #[must_use]
    pub fn bind(var: impl Into<String>) -> Self {
        Self::Bind { var: var.into() }
    }

    /// Comparison.
    #[must_use]
    pub fn compare(op: CompareOp, rhs: impl Into<Operand>) -> Self {
        Self::Compare {
            op,
            rhs: rhs.into(),
        }
    }

    /// Captures `var` and requires `op rhs` to hold for it.
    #[must_use]
    pub fn bind_where(var: impl Into<String>, op: CompareOp, rhs: impl Into<Operand>) -> Self {
        Self::All {
            tests: vec![Self::bind(var), Self::compare(op, rhs)],
        }
    }

    /// Regular-expression match.
    #[must_use]
    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::Regex {
            pattern: pattern.into(),
        }
    }
}

impl fmt::Display for FieldTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "?"),
            Self::Literal { value } => write!(f, "{value}"),
            Self::Bind { var } => write!(f, "?{var}"),
            Self::Compare { op, rhs } => write!(f, ":({op} {rhs})"),
            Self::Regex { pattern } => write!(f, "~/{pattern}/"),
            Self::All { tests } => {
                for (i, t) in tests.iter().enumerate() {
                    if i > 0 {
                        write!(f, "&")?;
                    }
                    write!(f, "{t}")?;
                }
                Ok(())
            }
        }
    }
}

/// A field test addressed by field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotTest {
    /// Template field name.
    pub field: String,
    /// Test applied to that field.
    pub test: FieldTest,
}

/// How a pattern addresses fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slots {
    /// Tests by template field name; unnamed fields are unconstrained.
    Named(Vec<SlotTest>),
    /// One test per position; the fact must have exactly this arity.
    Positional(Vec<FieldTest>),
}

/// Atomic pattern over facts of one relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    /// Template or ordered-fact relation name.
    pub relation: String,
    /// Field tests.
    pub slots: Slots,
}

impl Pattern {
    /// Positional pattern, e.g. `(has fever)` or `(diagnosis ?)`.
    #[must_use]
    pub fn ordered(relation: impl Into<String>, tests: Vec<FieldTest>) -> Self {
        Self {
            relation: relation.into(),
            slots: Slots::Positional(tests),
        }
    }

    /// Positional pattern whose fields are all symbol constants.
    #[must_use]
    pub fn symbols<I, S>(relation: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ordered(relation, symbols.into_iter().map(FieldTest::symbol).collect())
    }

    /// Named-field pattern with no constraints yet.
    #[must_use]
    pub fn template(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            slots: Slots::Named(Vec::new()),
        }
    }

    /// Adds a named field test.
    ///
    /// On a positional pattern the test is appended as the next position.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, test: FieldTest) -> Self {
        match &mut self.slots {
            Slots::Named(tests) => tests.push(SlotTest {
                field: field.into(),
                test,
            }),
            Slots::Positional(tests) => tests.push(test),
        }
        self
    }

    /// All field tests, in evaluation order.
    pub fn tests(&self) -> Box<dyn Iterator<Item = &FieldTest> + '_> {
        match &self.slots {
            Slots::Named(tests) => Box::new(tests.iter().map(|s| &s.test)),
            Slots::Positional(tests) => Box::new(tests.iter()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.relation)?;
        match &self.slots {
            Slots::Named(tests) => {
                for s in tests {
                    write!(f, " ({} {})", s.field, s.test)?;
                }
            }
            Slots::Positional(tests) => {
                for t in tests {
                    write!(f, " {t}")?;
                }
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_op_holds() {
        assert!(CompareOp::Ge.holds(Ordering::Equal));
        assert!(CompareOp::Ge.holds(Ordering::Greater));
        assert!(!CompareOp::Ge.holds(Ordering::Less));
        assert!(CompareOp::Ne.holds(Ordering::Less));
        assert!(!CompareOp::Lt.holds(Ordering::Equal));
    }

    #[test]
    fn test_ordered_pattern_display() {
        let p = Pattern::symbols("has", ["shortness-of-breath"]);
        assert_eq!(p.to_string(), "(has shortness-of-breath)");

        let p = Pattern::ordered("diagnosis", vec![FieldTest::Any]);
        assert_eq!(p.to_string(), "(diagnosis ?)");
    }

    #[test]
    fn test_template_pattern_display() {
        let p = Pattern::template("patient")
            .with("age", FieldTest::bind_where("a", CompareOp::Ge, 60));
        assert_eq!(p.to_string(), "(patient (age ?a&:(>= 60)))");
    }

    #[test]
    fn test_with_on_positional_appends() {
        let p = Pattern::ordered("pair", vec![]).with("", FieldTest::bind("x"));
        assert_eq!(p.slots, Slots::Positional(vec![FieldTest::bind("x")]));
        assert_eq!(p.tests().count(), 1);
    }

    #[test]
    fn test_pattern_serialization() {
        let p = Pattern::template("symptom")
            .with("id", FieldTest::eq("fever"))
            .with("val", FieldTest::eq("yes"));
        let json = serde_json::to_string(&p).unwrap();
        let back: Pattern = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_operand_from_literal() {
        let op: Operand = 60.into();
        assert_eq!(op, Operand::Literal(Value::Int(60)));
        assert_eq!(Operand::var("a").as_var(), Some("a"));
    }
}
