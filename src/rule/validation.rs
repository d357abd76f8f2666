//! Rule validation.
//!
//! Rules are checked once, when they are loaded, so that inference never
//! meets a dangling template reference or an unbound variable. Variables
//! are tracked in evaluation order: a comparison may only refer to a
//! variable that an earlier field test or an earlier evaluated conjunct
//! bound, and an action may only use variables bound on every path through
//! the condition. A pattern cannot compare against a variable that only a
//! sibling disjunction binds, since patterns are evaluated first.

use std::collections::BTreeSet;

use crate::error::ValidationError;
use crate::inference::cached_regex;
use crate::pattern::{FieldTest, Operand, Pattern, Slots};
use crate::rule::{Action, ActionFields, Condition, Effect, Rule};
use crate::template::TemplateRegistry;

/// Conservative bound on condition nesting.
pub const MAX_CONDITION_DEPTH: usize = 64;

type Vars = BTreeSet<String>;

struct RuleChecker<'a> {
    registry: &'a TemplateRegistry,
    rule: &'a str,
}

impl RuleChecker<'_> {
    fn invalid(&self, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidCondition {
            rule: self.rule.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the variables bound after `cond` matches.
    fn condition(&self, cond: &Condition, bound: &Vars, depth: usize) -> Result<Vars, ValidationError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(self.invalid(format!(
                "condition nesting exceeds {MAX_CONDITION_DEPTH} levels"
            )));
        }
        match cond {
            Condition::Pattern(p) => self.pattern(p, bound),
            Condition::All { children } => {
                if children.is_empty() {
                    return Err(self.invalid("empty conjunction"));
                }
                let mut vars = bound.clone();
                for child in Condition::conjuncts(children) {
                    vars = self.condition(child, &vars, depth + 1)?;
                }
                Ok(vars)
            }
            Condition::Any { children } => {
                if children.is_empty() {
                    return Err(self.invalid("empty disjunction"));
                }
                let mut common: Option<Vars> = None;
                for child in children {
                    let vars = self.condition(child, bound, depth + 1)?;
                    common = Some(match common {
                        None => vars,
                        Some(prev) => prev.intersection(&vars).cloned().collect(),
                    });
                }
                Ok(common.unwrap_or_else(|| bound.clone()))
            }
            Condition::Not { child } => {
                self.condition(child, bound, depth + 1)?;
                Ok(bound.clone())
            }
        }
    }

    fn pattern(&self, pattern: &Pattern, bound: &Vars) -> Result<Vars, ValidationError> {
        if pattern.relation.trim().is_empty() {
            return Err(self.invalid("pattern has an empty relation name"));
        }

        let template = self.registry.get(&pattern.relation);
        match (&pattern.slots, template) {
            (Slots::Named(tests), Some(t)) => {
                for (i, slot) in tests.iter().enumerate() {
                    if t.field_index(&slot.field).is_none() {
                        return Err(self.invalid(format!(
                            "template '{}' has no field '{}'",
                            t.name, slot.field
                        )));
                    }
                    if tests[..i].iter().any(|s| s.field == slot.field) {
                        return Err(self.invalid(format!(
                            "field '{}' tested twice in {pattern}",
                            slot.field
                        )));
                    }
                }
            }
            (Slots::Named(_), None) => {
                return Err(self.invalid(format!(
                    "pattern {pattern} names fields of undeclared template '{}'",
                    pattern.relation
                )));
            }
            (Slots::Positional(tests), Some(t)) => {
                if tests.len() != t.fields.len() {
                    return Err(self.invalid(format!(
                        "pattern {pattern} has {} positions, template '{}' has {} fields",
                        tests.len(),
                        t.name,
                        t.fields.len()
                    )));
                }
            }
            (Slots::Positional(_), None) => {}
        }

        let mut vars = bound.clone();
        for test in pattern.tests() {
            self.field_test(test, &mut vars)?;
        }
        Ok(vars)
    }

    fn field_test(&self, test: &FieldTest, vars: &mut Vars) -> Result<(), ValidationError> {
        match test {
            FieldTest::Any | FieldTest::Literal { .. } => Ok(()),
            FieldTest::Bind { var } => {
                if var.trim().is_empty() {
                    return Err(self.invalid("variable name cannot be empty"));
                }
                vars.insert(var.clone());
                Ok(())
            }
            FieldTest::Compare { rhs, .. } => self.operand(rhs, vars),
            FieldTest::Regex { pattern } => cached_regex(pattern)
                .map(|_| ())
                .map_err(|e| self.invalid(format!("invalid regex '{pattern}': {e}"))),
            FieldTest::All { tests } => {
                if tests.is_empty() {
                    return Err(self.invalid("empty field test conjunction"));
                }
                for t in tests {
                    self.field_test(t, vars)?;
                }
                Ok(())
            }
        }
    }

    fn operand(&self, operand: &Operand, vars: &Vars) -> Result<(), ValidationError> {
        match operand.as_var() {
            Some(v) if !vars.contains(v) => Err(self.invalid(format!("variable ?{v} is not bound"))),
            _ => Ok(()),
        }
    }

    fn action(&self, action: &Action, vars: &Vars) -> Result<Effect, ValidationError> {
        let template = self.registry.get(&action.relation);
        let values = match (&action.fields, template) {
            (ActionFields::Positional(values), None) => values.clone(),
            (ActionFields::Positional(values), Some(t)) => {
                if values.len() != t.fields.len() {
                    return Err(self.invalid(format!(
                        "action {action} has {} values, template '{}' has {} fields",
                        values.len(),
                        t.name,
                        t.fields.len()
                    )));
                }
                values.clone()
            }
            (ActionFields::Named(_), None) => {
                return Err(self.invalid(format!(
                    "action {action} names fields of undeclared template '{}'",
                    action.relation
                )));
            }
            (ActionFields::Named(fields), Some(t)) => {
                let mut slots: Vec<Option<Operand>> = vec![None; t.fields.len()];
                for f in fields {
                    let idx = t.field_index(&f.field).ok_or_else(|| {
                        self.invalid(format!("template '{}' has no field '{}'", t.name, f.field))
                    })?;
                    if slots[idx].is_some() {
                        return Err(self.invalid(format!("action sets field '{}' twice", f.field)));
                    }
                    slots[idx] = Some(f.value.clone());
                }
                t.fields
                    .iter()
                    .zip(slots)
                    .map(|(field_spec, slot)| {
                        slot.or_else(|| field_spec.default.clone().map(Operand::Literal))
                            .ok_or_else(|| {
                                self.invalid(format!(
                                    "action {action} leaves field '{}' without a value",
                                    field_spec.name
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        if let Some(t) = template {
            for (field_spec, value) in t.fields.iter().zip(&values) {
                if let Operand::Literal(v) = value {
                    if !field_spec.ty.accepts(v) {
                        return Err(self.invalid(format!(
                            "action {action}: field '{}' expects {}, got {}",
                            field_spec.name,
                            field_spec.ty,
                            v.type_name()
                        )));
                    }
                }
            }
        }
        for value in &values {
            self.operand(value, vars)?;
        }

        Ok(Effect {
            relation: action.relation.clone(),
            values,
        })
    }
}

/// Validates a rule and returns its actions in positional form.
pub(crate) fn validate_rule(registry: &TemplateRegistry, rule: &Rule) -> Result<Vec<Effect>, ValidationError> {
    let checker = RuleChecker {
        registry,
        rule: &rule.name,
    };
    if rule.name.trim().is_empty() {
        return Err(checker.invalid("rule name cannot be empty"));
    }
    let vars = checker.condition(&rule.condition, &Vars::new(), 0)?;
    rule.actions.iter().map(|a| checker.action(a, &vars)).collect()
}
