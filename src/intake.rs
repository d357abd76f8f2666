//! Translation of collected answers into initial facts.
//!
//! An input collector produces a flat mapping from question key to answer.
//! Intake mappings, applied in declaration order, turn that mapping into the
//! facts a session starts from. Translation is deterministic: the same
//! answers always produce the same facts in the same order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fact::Fact;
use crate::template::{FieldType, Template, TemplateRegistry};
use crate::value::Value;

/// Answers keyed by question, ordered by key.
///
/// # Examples
///
/// ```
/// use triage_engine::Answers;
///
/// let answers = Answers::new().yes("fever").no("cough").set("age", 64);
/// assert!(answers.is_yes("fever"));
/// assert!(!answers.is_yes("cough"));
/// assert!(!answers.is_yes("breathing"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<String, Value>);

impl Answers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an answer.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Answers `key` with yes.
    #[must_use]
    pub fn yes(self, key: impl Into<String>) -> Self {
        self.set(key, true)
    }

    /// Answers `key` with no.
    #[must_use]
    pub fn no(self, key: impl Into<String>) -> Self {
        self.set(key, false)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns true if `key` was answered affirmatively.
    #[must_use]
    pub fn is_yes(&self, key: &str) -> bool {
        self.get(key).and_then(truthiness).unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Answers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Interprets an answer as yes/no, if it reads as one.
fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(n) => Some(*n != 0),
        Value::Float(_) => None,
        Value::String(s) | Value::Symbol(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Some(true),
            "no" | "n" | "false" | "0" | "" => Some(false),
            _ => None,
        },
    }
}

fn is_blank(value: &Value) -> bool {
    value.as_text().is_some_and(|s| s.trim().is_empty())
}

fn invalid(key: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidAnswer {
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Converts an answer into a value a field of type `ty` accepts.
///
/// Booleans destined for textual fields are written as `"yes"`/`"no"`.
///
/// # Errors
/// `InvalidAnswer` if the answer cannot be read as the field's type.
pub fn coerce(key: &str, value: &Value, ty: FieldType) -> Result<Value, ValidationError> {
    let text = || match value {
        Value::Bool(b) => (if *b { "yes" } else { "no" }).to_string(),
        Value::String(s) | Value::Symbol(s) => s.clone(),
        other => other.to_string(),
    };
    match ty {
        FieldType::Any => Ok(value.clone()),
        FieldType::String => Ok(Value::String(text())),
        FieldType::Symbol => Ok(Value::Symbol(text())),
        FieldType::Bool => truthiness(value)
            .map(Value::Bool)
            .ok_or_else(|| invalid(key, format!("expected yes or no, got {value}"))),
        FieldType::Int => match value {
            Value::Int(n) => Ok(Value::Int(*n)),
            Value::String(s) | Value::Symbol(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| invalid(key, format!("expected a whole number, got {s:?}"))),
            other => Err(invalid(key, format!("expected a whole number, got {other}"))),
        },
        FieldType::Float => match value {
            Value::Int(_) | Value::Float(_) => Ok(value.clone()),
            Value::String(s) | Value::Symbol(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| invalid(key, format!("expected a number, got {s:?}"))),
            Value::Bool(_) => Err(invalid(key, format!("expected a number, got {value}"))),
        },
    }
}

/// One templated field filled from an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordField {
    /// Template field.
    pub field: String,
    /// Answer key.
    pub key: String,
    /// Used when the answer is missing or blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl RecordField {
    #[must_use]
    pub fn new(field: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            key: key.into(),
            default: None,
        }
    }

    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// How answers become facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntakeMapping {
    /// One ordered fact `(relation key)` per key answered yes.
    Flag {
        relation: String,
        /// Restricts and orders the keys; all answers by default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
    },
    /// One templated fact per key, e.g. `(symptom (id "fever") (val "yes"))`.
    KeyValue {
        template: String,
        key_field: String,
        value_field: String,
        /// Restricts and orders the keys; all answers by default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
        /// Value for listed keys that were not answered.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Value>,
    },
    /// One templated fact assembled from several answers.
    Record {
        template: String,
        fields: Vec<RecordField>,
    },
}

impl IntakeMapping {
    /// Flag mapping over every answer.
    #[must_use]
    pub fn flag(relation: impl Into<String>) -> Self {
        Self::Flag {
            relation: relation.into(),
            keys: None,
        }
    }

    /// Key/value mapping over every answer.
    #[must_use]
    pub fn key_value(
        template: impl Into<String>,
        key_field: impl Into<String>,
        value_field: impl Into<String>,
    ) -> Self {
        Self::KeyValue {
            template: template.into(),
            key_field: key_field.into(),
            value_field: value_field.into(),
            keys: None,
            default: None,
        }
    }

    /// Record mapping.
    #[must_use]
    pub fn record(template: impl Into<String>, fields: Vec<RecordField>) -> Self {
        Self::Record {
            template: template.into(),
            fields,
        }
    }

    /// Restricts a flag or key/value mapping to `keys`, in that order.
    #[must_use]
    pub fn with_keys<I, S>(mut self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Self::Flag { keys, .. } | Self::KeyValue { keys, .. } = &mut self {
            *keys = Some(list.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Sets the value used for unanswered keys of a key/value mapping.
    #[must_use]
    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        if let Self::KeyValue { default, .. } = &mut self {
            *default = Some(value.into());
        }
        self
    }

    /// Checks the mapping against the registry.
    ///
    /// # Errors
    /// `UnknownTemplate` for an undeclared template and `InvalidDefinition`
    /// for fields the template does not have.
    pub fn validate(&self, registry: &TemplateRegistry) -> Result<(), ValidationError> {
        let bad = |reason: String| ValidationError::InvalidDefinition { reason };
        match self {
            Self::Flag { relation, .. } => {
                if relation.trim().is_empty() {
                    return Err(bad("flag mapping has an empty relation".to_string()));
                }
                if let Some(t) = registry.get(relation) {
                    if t.fields.len() != 1 {
                        return Err(bad(format!(
                            "flag relation '{relation}' is a template with {} fields",
                            t.fields.len()
                        )));
                    }
                }
            }
            Self::KeyValue {
                template,
                key_field,
                value_field,
                ..
            } => {
                let t = registry.lookup(template)?;
                for field in [key_field, value_field] {
                    if t.field_index(field).is_none() {
                        return Err(bad(format!("template '{template}' has no field '{field}'")));
                    }
                }
                if key_field == value_field {
                    return Err(bad(format!("key and value field of '{template}' are both '{key_field}'")));
                }
            }
            Self::Record { template, fields } => {
                let t = registry.lookup(template)?;
                for (i, f) in fields.iter().enumerate() {
                    let Some(idx) = t.field_index(&f.field) else {
                        return Err(bad(format!("template '{template}' has no field '{}'", f.field)));
                    };
                    if fields[..i].iter().any(|o| o.field == f.field) {
                        return Err(bad(format!("record field '{}' mapped twice", f.field)));
                    }
                    if let Some(default) = &f.default {
                        coerce(&f.key, default, t.fields[idx].ty).map_err(|e| bad(e.to_string()))?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn selected_keys<'a>(answers: &'a Answers, keys: Option<&'a [String]>, consumed: &BTreeSet<&str>) -> Vec<&'a str> {
    match keys {
        Some(list) => list.iter().map(String::as_str).filter(|k| !consumed.contains(k)).collect(),
        None => answers.iter().map(|(k, _)| k).filter(|k| !consumed.contains(k)).collect(),
    }
}

fn field_type(template: &Template, field: &str) -> FieldType {
    template
        .field_index(field)
        .map_or(FieldType::Any, |i| template.fields[i].ty)
}

/// Translates answers into initial facts.
///
/// # Errors
/// - `UnknownTemplate` if a mapping names an undeclared template.
/// - `MissingAnswer` if a record field has neither an answer nor a default,
///   or a listed key/value key has neither.
/// - `InvalidAnswer` if an answer cannot be read as its field's type.
/// - `TemplateMismatch` if the assembled fact does not fit its template.
pub fn translate(
    registry: &TemplateRegistry,
    mappings: &[IntakeMapping],
    answers: &Answers,
) -> Result<Vec<Fact>, ValidationError> {
    let consumed: BTreeSet<&str> = mappings
        .iter()
        .filter_map(|m| match m {
            IntakeMapping::Record { fields, .. } => Some(fields.iter().map(|f| f.key.as_str())),
            _ => None,
        })
        .flatten()
        .collect();

    let mut facts = Vec::new();
    for mapping in mappings {
        match mapping {
            IntakeMapping::Flag { relation, keys } => {
                for key in selected_keys(answers, keys.as_deref(), &consumed) {
                    let Some(answer) = answers.get(key) else {
                        continue;
                    };
                    let yes = truthiness(answer)
                        .ok_or_else(|| invalid(key, format!("expected yes or no, got {answer}")))?;
                    if yes {
                        let fact = Fact::symbols(relation.clone(), [key]);
                        registry.check(&fact)?;
                        facts.push(fact);
                    }
                }
            }
            IntakeMapping::KeyValue {
                template,
                key_field,
                value_field,
                keys,
                default,
            } => {
                let t = registry.lookup(template)?;
                let key_ty = field_type(t, key_field);
                let value_ty = field_type(t, value_field);
                for key in selected_keys(answers, keys.as_deref(), &consumed) {
                    let answer = answers
                        .get(key)
                        .or(default.as_ref())
                        .ok_or_else(|| ValidationError::MissingAnswer { key: key.to_string() })?;
                    let key_value = coerce(key, &Value::string(key), key_ty)?;
                    let value = coerce(key, answer, value_ty)?;
                    facts.push(t.fact([(key_field.as_str(), key_value), (value_field.as_str(), value)])?);
                }
            }
            IntakeMapping::Record { template, fields } => {
                let t = registry.lookup(template)?;
                let mut named = Vec::with_capacity(fields.len());
                for f in fields {
                    let answer = answers
                        .get(&f.key)
                        .filter(|v| !is_blank(v))
                        .or(f.default.as_ref())
                        .ok_or_else(|| ValidationError::MissingAnswer { key: f.key.clone() })?;
                    named.push((f.field.as_str(), coerce(&f.key, answer, field_type(t, &f.field))?));
                }
                facts.push(t.fact(named)?);
            }
        }
    }
    Ok(facts)
}
