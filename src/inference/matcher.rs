//! Condition evaluation against a fact store.
//!
//! Matching is pure: it reads the store and returns matches in a
//! deterministic order (fact insertion order, then conjunct order).
//! Bindings are threaded through conjunctions so that a repeated variable
//! acts as an equality join. Conjunctions evaluate patterns before
//! disjunctions and negations, so the order children are written in does
//! not change which facts match.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::fact::{Fact, FactId};
use crate::pattern::{CompareOp, FieldTest, Operand, Pattern, Slots};
use crate::rule::Condition;
use crate::store::FactStore;
use crate::value::Value;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();
const REGEX_CACHE_MAX: usize = 256;

/// Compiles a regex once per process and shares it across sessions.
pub(crate) fn cached_regex(pattern: &str) -> Result<regex::Regex, regex::Error> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let guard = cache.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern)?;

    let mut guard = cache.write().unwrap_or_else(PoisonError::into_inner);
    if guard.len() >= REGEX_CACHE_MAX {
        guard.clear();
    }
    guard
        .entry(pattern.to_string())
        .or_insert_with(|| compiled.clone());

    Ok(compiled)
}

/// Variable bindings of one (partial) match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Binding(BTreeMap<String, Value>);

impl Binding {
    /// Empty binding.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Value bound to `var`.
    #[must_use]
    pub fn get(&self, var: &str) -> Option<&Value> {
        self.0.get(var)
    }

    /// Binds `var` to `value`.
    ///
    /// If `var` is already bound, nothing changes and the result says
    /// whether the existing value equals `value`.
    pub fn bind(&mut self, var: &str, value: Value) -> bool {
        match self.0.get(var) {
            Some(existing) => existing.matches(&value),
            None => {
                self.0.insert(var.to_string(), value);
                true
            }
        }
    }

    /// Resolves an operand to a value; `None` for an unbound variable.
    #[must_use]
    pub fn resolve(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Literal(v) => Some(v.clone()),
            Operand::Var(name) => self.0.get(name).cloned(),
        }
    }

    /// Bound variables in name order.
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

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "?{k}={v}")?;
        }
        write!(f, "}}")
    }
}

/// One way a condition is satisfied.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Captured variables.
    pub binding: Binding,
    /// Ids of the positive facts that satisfied the condition, in evaluation order.
    pub support: Vec<FactId>,
}

impl Match {
    fn seed(binding: Binding) -> Self {
        Self {
            binding,
            support: Vec::new(),
        }
    }
}

/// Every fact satisfying `pattern` under `binding`, with the extended binding.
#[must_use]
pub fn match_pattern(pattern: &Pattern, store: &FactStore<'_>, binding: &Binding) -> Vec<(FactId, Binding)> {
    let template = store.registry().get(&pattern.relation);

    // Resolve named fields to positions once per pattern.
    let positions: Option<Vec<(usize, &FieldTest)>> = match (&pattern.slots, template) {
        (Slots::Named(tests), Some(t)) => tests
            .iter()
            .map(|s| t.field_index(&s.field).map(|i| (i, &s.test)))
            .collect(),
        (Slots::Named(_), None) => None,
        (Slots::Positional(tests), _) => Some(tests.iter().enumerate().collect()),
    };
    let Some(positions) = positions else {
        return Vec::new();
    };
    let exact_arity = matches!(pattern.slots, Slots::Positional(_));

    store
        .of_relation(&pattern.relation)
        .filter_map(|entry| {
            if exact_arity && entry.fact.arity() != positions.len() {
                return None;
            }
            let mut candidate = binding.clone();
            fact_satisfies(&entry.fact, &positions, &mut candidate).then_some((entry.id, candidate))
        })
        .collect()
}

fn fact_satisfies(fact: &Fact, positions: &[(usize, &FieldTest)], binding: &mut Binding) -> bool {
    positions.iter().all(|(idx, test)| {
        fact.value(*idx)
            .is_some_and(|value| field_satisfies(test, value, binding))
    })
}

fn field_satisfies(test: &FieldTest, value: &Value, binding: &mut Binding) -> bool {
    match test {
        FieldTest::Any => true,
        FieldTest::Literal { value: expected } => value.matches(expected),
        FieldTest::Bind { var } => binding.bind(var, value.clone()),
        FieldTest::Compare { op, rhs } => {
            let Some(rhs) = binding.resolve(rhs) else {
                return false;
            };
            compare(*op, value, &rhs)
        }
        FieldTest::Regex { pattern } => value
            .as_text()
            .is_some_and(|text| cached_regex(pattern).is_ok_and(|re| re.is_match(text))),
        FieldTest::All { tests } => tests.iter().all(|t| field_satisfies(t, value, binding)),
    }
}

fn compare(op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
    match op {
        CompareOp::Eq => lhs.matches(rhs),
        CompareOp::Ne => !lhs.matches(rhs),
        _ => lhs.compare(rhs).is_some_and(|ord| op.holds(ord)),
    }
}

/// Every match of `condition` against the store, in deterministic order.
#[must_use]
pub fn match_condition(condition: &Condition, store: &FactStore<'_>) -> Vec<Match> {
    extend(condition, store, &Match::seed(Binding::new()))
}

/// Returns true if `condition` has at least one match.
#[must_use]
pub fn is_satisfied(condition: &Condition, store: &FactStore<'_>) -> bool {
    !match_condition(condition, store).is_empty()
}

/// Returns true if the given support still yields a match of `condition`
/// with an identical binding.
#[must_use]
pub fn still_matches(condition: &Condition, store: &FactStore<'_>, m: &Match) -> bool {
    if m.support.iter().any(|id| store.get(*id).is_none()) {
        return false;
    }
    match_condition(condition, store).iter().any(|candidate| candidate == m)
}

fn extend(condition: &Condition, store: &FactStore<'_>, partial: &Match) -> Vec<Match> {
    match condition {
        Condition::Pattern(p) => match_pattern(p, store, &partial.binding)
            .into_iter()
            .map(|(id, binding)| {
                let mut support = partial.support.clone();
                support.push(id);
                Match { binding, support }
            })
            .collect(),
        Condition::All { children } => {
            let mut partials = vec![partial.clone()];
            for child in Condition::conjuncts(children) {
                partials = partials
                    .iter()
                    .flat_map(|p| extend(child, store, p))
                    .collect();
                if partials.is_empty() {
                    break;
                }
            }
            partials
        }
        Condition::Any { children } => children
            .iter()
            .map(|child| extend(child, store, partial))
            .find(|matches| !matches.is_empty())
            .unwrap_or_default(),
        Condition::Not { child } => {
            if extend(child, store, partial).is_empty() {
                vec![partial.clone()]
            } else {
                Vec::new()
            }
        }
    }
}
