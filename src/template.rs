//! Templates and the template registry.
//!
//! A template declares the shape of one fact kind: its name, its ordered
//! typed fields, and the role its facts play when an outcome is aggregated
//! (plain data, score contribution, advisory message, or conclusion).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fact::Fact;
use crate::value::Value;

/// Type of a template field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    /// Accepts floats and integers.
    Float,
    String,
    Symbol,
    Any,
}

impl FieldType {
    /// Returns true if `value` may be stored in a field of this type.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Bool => value.is_bool(),
            Self::Int => value.is_int(),
            Self::Float => value.is_numeric(),
            Self::String => value.is_string(),
            Self::Symbol => value.is_symbol(),
        }
    }

    const fn is_textual(self) -> bool {
        matches!(self, Self::String | Self::Symbol | Self::Any)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::Any => "any",
        };
        f.write_str(s)
    }
}

/// One declared field of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name, unique within the template.
    pub name: String,
    /// Accepted value type.
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Value used when a named construction omits this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSpec {
    /// Creates a required field.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// How facts of one score kind fold into a single contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFold {
    /// Highest value wins (a capped severity level).
    Max,
    /// Values add up (additive risk contributions).
    Sum,
}

/// Role a template's facts play in outcome aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TemplateRole {
    /// Ordinary data.
    #[default]
    Plain,
    /// Score-bearing: `field` holds a non-negative integer contribution.
    Score {
        field: String,
        fold: ScoreFold,
    },
    /// Message-bearing: collected as `(tag, message)` advisories.
    Message {
        tag_field: String,
        message_field: String,
    },
    /// Conclusion-bearing: `field` is collected as a named diagnosis.
    Conclusion {
        field: String,
    },
}

/// Declared shape of one fact kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template name; also the relation name of its facts.
    pub name: String,
    /// Ordered fields.
    pub fields: Vec<FieldSpec>,
    /// Aggregation role.
    #[serde(default)]
    pub role: TemplateRole,
}

impl Template {
    /// Creates a plain template.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
            role: TemplateRole::Plain,
        }
    }

    /// Single-field score template, e.g. `(diagnosis_level 80)`.
    #[must_use]
    pub fn score(name: impl Into<String>, fold: ScoreFold) -> Self {
        Self::new(name, vec![FieldSpec::new("value", FieldType::Int)]).with_role(
            TemplateRole::Score {
                field: "value".to_string(),
                fold,
            },
        )
    }

    /// Two-field message template with `type` and `message` fields.
    #[must_use]
    pub fn message(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vec![
                FieldSpec::new("type", FieldType::String),
                FieldSpec::new("message", FieldType::String),
            ],
        )
        .with_role(TemplateRole::Message {
            tag_field: "type".to_string(),
            message_field: "message".to_string(),
        })
    }

    /// Single-field conclusion template, e.g. `(diagnosis covid-severe)`.
    #[must_use]
    pub fn conclusion(name: impl Into<String>) -> Self {
        Self::new(name, vec![FieldSpec::new("value", FieldType::Symbol)]).with_role(
            TemplateRole::Conclusion {
                field: "value".to_string(),
            },
        )
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: TemplateRole) -> Self {
        self.role = role;
        self
    }

    /// Position of a named field.
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Builds a fact from named field values, filling defaults.
    pub fn fact<'a, I>(&self, named: I) -> Result<Fact, ValidationError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut slots: Vec<Option<Value>> = vec![None; self.fields.len()];
        for (name, value) in named {
            let idx = self
                .field_index(name)
                .ok_or_else(|| self.mismatch(format!("no field named '{name}'")))?;
            if slots[idx].is_some() {
                return Err(self.mismatch(format!("field '{name}' given twice")));
            }
            slots[idx] = Some(value);
        }

        let mut values = Vec::with_capacity(self.fields.len());
        for (field_spec, slot) in self.fields.iter().zip(slots) {
            match slot.or_else(|| field_spec.default.clone()) {
                Some(v) => values.push(v),
                None => return Err(self.mismatch(format!("missing field '{}'", field_spec.name))),
            }
        }

        let fact = Fact::new(self.name.clone(), values);
        self.check(&fact)?;
        Ok(fact)
    }

    /// Checks that a fact conforms to this template.
    pub fn check(&self, fact: &Fact) -> Result<(), ValidationError> {
        if fact.relation != self.name {
            return Err(self.mismatch(format!("relation is '{}'", fact.relation)));
        }
        if fact.arity() != self.fields.len() {
            return Err(self.mismatch(format!(
                "expected {} fields, got {}",
                self.fields.len(),
                fact.arity()
            )));
        }
        for (field_spec, value) in self.fields.iter().zip(&fact.values) {
            if !field_spec.ty.accepts(value) {
                return Err(self.mismatch(format!(
                    "field '{}' expects {}, got {}",
                    field_spec.name,
                    field_spec.ty,
                    value.type_name()
                )));
            }
        }
        if let TemplateRole::Score { field, .. } = &self.role {
            let score = self
                .field_index(field)
                .and_then(|i| fact.values[i].as_int())
                .unwrap_or(0);
            if score < 0 {
                return Err(self.mismatch(format!(
                    "score field '{field}' must be non-negative, got {score}"
                )));
            }
        }
        Ok(())
    }

    fn mismatch(&self, reason: String) -> ValidationError {
        ValidationError::TemplateMismatch {
            template: self.name.clone(),
            reason,
        }
    }

    fn validate_shape(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidTemplate {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("template name cannot be empty".to_string()));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(invalid(format!("field #{i} has an empty name")));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(invalid(format!("field '{}' declared twice", field.name)));
            }
            if let Some(default) = &field.default {
                if !field.ty.accepts(default) {
                    return Err(invalid(format!(
                        "default of '{}' is {}, expected {}",
                        field.name,
                        default.type_name(),
                        field.ty
                    )));
                }
            }
        }

        let typed_field = |name: &str| {
            self.fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| f.ty)
                .ok_or_else(|| invalid(format!("role refers to missing field '{name}'")))
        };
        match &self.role {
            TemplateRole::Plain => {}
            TemplateRole::Score { field, .. } => {
                if typed_field(field.as_str())? != FieldType::Int {
                    return Err(invalid(format!("score field '{field}' must be int")));
                }
            }
            TemplateRole::Message {
                tag_field,
                message_field,
            } => {
                for name in [tag_field, message_field] {
                    if !typed_field(name.as_str())?.is_textual() {
                        return Err(invalid(format!("message field '{name}' must be textual")));
                    }
                }
            }
            TemplateRole::Conclusion { field } => {
                typed_field(field.as_str())?;
            }
        }
        Ok(())
    }
}

/// Registry of templates, in definition order.
///
/// Built once when a knowledge base is assembled and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
    by_name: HashMap<String, usize>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a template.
    ///
    /// # Errors
    /// - `DuplicateTemplate` if the name is taken.
    /// - `InvalidTemplate` if the template's fields or role are malformed.
    pub fn define(&mut self, template: Template) -> Result<(), ValidationError> {
        if self.by_name.contains_key(&template.name) {
            return Err(ValidationError::DuplicateTemplate {
                name: template.name,
            });
        }
        template.validate_shape()?;
        self.by_name.insert(template.name.clone(), self.templates.len());
        self.templates.push(template);
        Ok(())
    }

    /// Looks up a template by name.
    pub fn lookup(&self, name: &str) -> Result<&Template, ValidationError> {
        self.get(name).ok_or_else(|| ValidationError::UnknownTemplate {
            name: name.to_string(),
        })
    }

    /// Looks up a template by name, if declared.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.by_name.get(name).map(|&i| &self.templates[i])
    }

    /// Returns true if `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Templates in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns true if no templates are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Validates a fact against its template; ordered facts always pass.
    pub fn check(&self, fact: &Fact) -> Result<(), ValidationError> {
        match self.get(&fact.relation) {
            Some(template) => template.check(fact),
            None => Ok(()),
        }
    }
}
