//! Rules and the rule base.
//!
//! A rule pairs a condition tree with an ordered list of facts to assert.
//! Rules are pure data: they can be written in Rust with the builders below
//! or deserialized from a rule-set definition. Loading validates every rule
//! against the template registry and resolves named action fields into
//! positional form once, so firing never has to consult templates.

mod validation;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::fact::Fact;
use crate::inference::Binding;
use crate::pattern::{Operand, Pattern};
use crate::template::TemplateRegistry;
use crate::value::Value;

/// Condition tree of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Condition {
    /// Atomic fact pattern.
    Pattern(Pattern),
    /// Every child must match with consistent bindings.
    All {
        children: Vec<Condition>,
    },
    /// The first child that matches supplies the bindings.
    Any {
        children: Vec<Condition>,
    },
    /// Matches when the child has no match at all.
    Not {
        child: Box<Condition>,
    },
}

impl Condition {
    /// Conjunction.
    #[must_use]
    pub fn all(children: Vec<Condition>) -> Self {
        Self::All { children }
    }

    /// Disjunction.
    #[must_use]
    pub fn any(children: Vec<Condition>) -> Self {
        Self::Any { children }
    }

    /// Negation-as-absence.
    #[must_use]
    pub fn not(child: Condition) -> Self {
        Self::Not {
            child: Box::new(child),
        }
    }

    /// Evaluation order of a conjunction's children.
    ///
    /// Nested conjunctions are flattened. Patterns come first, then
    /// disjunctions, then negations, each group in declaration order, so a
    /// negation or disjunction always sees every variable its positive
    /// siblings bind. An empty nested conjunction is kept as-is.
    pub(crate) fn conjuncts(children: &[Condition]) -> Vec<&Condition> {
        fn flatten<'a>(children: &'a [Condition], out: &mut Vec<&'a Condition>) {
            for child in children {
                match child {
                    Condition::All { children: nested } if !nested.is_empty() => flatten(nested, out),
                    other => out.push(other),
                }
            }
        }

        let mut out = Vec::with_capacity(children.len());
        flatten(children, &mut out);
        out.sort_by_key(|c| match c {
            Condition::Pattern(_) | Condition::All { .. } => 0,
            Condition::Any { .. } => 1,
            Condition::Not { .. } => 2,
        });
        out
    }
}

impl From<Pattern> for Condition {
    fn from(p: Pattern) -> Self {
        Self::Pattern(p)
    }
}

fn write_group(f: &mut fmt::Formatter<'_>, head: &str, children: &[Condition]) -> fmt::Result {
    write!(f, "({head}")?;
    for c in children {
        write!(f, " {c}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(p) => write!(f, "{p}"),
            Self::All { children } => write_group(f, "and", children),
            Self::Any { children } => write_group(f, "or", children),
            Self::Not { child } => write!(f, "(not {child})"),
        }
    }
}

/// A field value in an action, addressed by template field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionField {
    /// Template field name.
    pub field: String,
    /// Constant or bound variable.
    pub value: Operand,
}

/// Field values of an asserted fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionFields {
    /// By template field name; omitted fields take their template default.
    Named(Vec<ActionField>),
    /// By position.
    Positional(Vec<Operand>),
}

/// Assert one fact when the rule fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Template or ordered-fact relation name.
    pub relation: String,
    /// Field values.
    pub fields: ActionFields,
}

impl Action {
    /// Asserts an ordered fact.
    #[must_use]
    pub fn ordered(relation: impl Into<String>, values: Vec<Operand>) -> Self {
        Self {
            relation: relation.into(),
            fields: ActionFields::Positional(values),
        }
    }

    /// Asserts an ordered fact of symbols, e.g. `(diagnosis covid-severe)`.
    #[must_use]
    pub fn symbols<I, S>(relation: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ordered(
            relation,
            symbols
                .into_iter()
                .map(|s| Operand::Literal(Value::symbol(s)))
                .collect(),
        )
    }

    /// Asserts a templated fact; add fields with [`Action::set`].
    #[must_use]
    pub fn template(relation: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            fields: ActionFields::Named(Vec::new()),
        }
    }

    /// Sets a named field (or appends a positional value).
    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Operand>) -> Self {
        match &mut self.fields {
            ActionFields::Named(fields) => fields.push(ActionField {
                field: field.into(),
                value: value.into(),
            }),
            ActionFields::Positional(values) => values.push(value.into()),
        }
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(assert ({}", self.relation)?;
        match &self.fields {
            ActionFields::Named(fields) => {
                for a in fields {
                    write!(f, " ({} {})", a.field, a.value)?;
                }
            }
            ActionFields::Positional(values) => {
                for v in values {
                    write!(f, " {v}")?;
                }
            }
        }
        write!(f, "))")
    }
}

/// A rule definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule name.
    pub name: String,
    /// Human-readable summary for rulebook listings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Condition tree.
    pub condition: Condition,
    /// Facts asserted when the rule fires, in order.
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    /// Creates a rule with no actions.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: impl Into<Condition>) -> Self {
        Self {
            name: name.into(),
            description: None,
            condition: condition.into(),
            actions: Vec::new(),
        }
    }

    /// Appends an action.
    #[must_use]
    pub fn then(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Position of a rule in its rule base (declaration order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(usize);

impl RuleId {
    /// Declaration index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r-{}", self.0)
    }
}

/// A fact to assert, in positional form.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    /// Relation name.
    pub relation: String,
    /// Positional values.
    pub values: Vec<Operand>,
}

impl Effect {
    /// Substitutes bound variables, returning the fact to assert.
    ///
    /// Returns the name of the first unbound variable on failure.
    pub fn instantiate(&self, binding: &Binding) -> Result<Fact, String> {
        let values = self
            .values
            .iter()
            .map(|op| binding.resolve(op).ok_or_else(|| op.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fact::new(self.relation.clone(), values))
    }
}

/// A validated rule.
#[derive(Debug, Clone)]
pub struct LoadedRule {
    /// Declaration position.
    pub id: RuleId,
    /// The rule as defined.
    pub rule: Rule,
    /// Actions in positional form.
    pub effects: Vec<Effect>,
}

impl LoadedRule {
    /// Rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.rule.name
    }

    /// Condition tree.
    #[must_use]
    pub fn condition(&self) -> &Condition {
        &self.rule.condition
    }
}

/// Ordered collection of validated rules.
#[derive(Debug, Clone, Default)]
pub struct RuleBase {
    rules: Vec<LoadedRule>,
    by_name: HashMap<String, RuleId>,
}

impl RuleBase {
    /// Creates an empty rule base.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and appends a rule.
    ///
    /// # Errors
    /// - `DuplicateRule` if the name is taken.
    /// - `InvalidCondition` if the condition or an action is malformed or
    ///   references an undeclared template field.
    pub fn load(&mut self, registry: &TemplateRegistry, rule: Rule) -> Result<RuleId, ValidationError> {
        if self.by_name.contains_key(&rule.name) {
            return Err(ValidationError::DuplicateRule { name: rule.name });
        }
        let effects = validation::validate_rule(registry, &rule)?;
        let id = RuleId(self.rules.len());
        self.by_name.insert(rule.name.clone(), id);
        self.rules.push(LoadedRule { id, rule, effects });
        Ok(id)
    }

    /// Looks up a rule by id.
    #[must_use]
    pub fn get(&self, id: RuleId) -> Option<&LoadedRule> {
        self.rules.get(id.0)
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&LoadedRule> {
        self.by_name.get(name).and_then(|&id| self.get(id))
    }

    /// Rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &LoadedRule> {
        self.rules.iter()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if no rules are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
