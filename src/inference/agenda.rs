//! Agenda construction and refraction.
//!
//! Each pass every rule contributes at most one activation: its first match
//! whose supporting facts have not already fired that rule. Activations are
//! ordered by rule declaration order.

use std::collections::HashSet;

use crate::fact::FactId;
use crate::inference::matcher::{match_condition, Binding, Match};
use crate::rule::{RuleBase, RuleId};
use crate::store::FactStore;

/// A rule selected to fire in the current pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    /// The rule to fire.
    pub rule: RuleId,
    /// Bindings used to instantiate its actions.
    pub binding: Binding,
    /// Facts that satisfied its condition.
    pub support: Vec<FactId>,
}

impl Activation {
    /// The match this activation was built from.
    #[must_use]
    pub fn as_match(&self) -> Match {
        Match {
            binding: self.binding.clone(),
            support: self.support.clone(),
        }
    }
}

/// Supporting fact combinations that have already fired, per rule.
#[derive(Debug, Clone, Default)]
pub struct Refraction {
    fired: HashSet<(RuleId, Vec<FactId>)>,
}

impl Refraction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `rule` already fired on `support`.
    #[must_use]
    pub fn has_fired(&self, rule: RuleId, support: &[FactId]) -> bool {
        self.fired.contains(&(rule, support.to_vec()))
    }

    /// Records a firing. Returns false if it was already recorded.
    pub fn record(&mut self, rule: RuleId, support: Vec<FactId>) -> bool {
        self.fired.insert((rule, support))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fired.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    pub fn clear(&mut self) {
        self.fired.clear();
    }
}

/// Activations of one pass, in firing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Agenda {
    activations: Vec<Activation>,
}

impl Agenda {
    /// Computes the agenda against the current store.
    #[must_use]
    pub fn build(rules: &RuleBase, store: &FactStore<'_>, refraction: &Refraction) -> Self {
        let activations = rules
            .iter()
            .filter_map(|rule| {
                match_condition(rule.condition(), store)
                    .into_iter()
                    .find(|m| !refraction.has_fired(rule.id, &m.support))
                    .map(|m| Activation {
                        rule: rule.id,
                        binding: m.binding,
                        support: m.support,
                    })
            })
            .collect();
        Self { activations }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.activations.len()
    }

    /// Activations in firing order.
    pub fn iter(&self) -> impl Iterator<Item = &Activation> {
        self.activations.iter()
    }
}

impl IntoIterator for Agenda {
    type Item = Activation;
    type IntoIter = std::vec::IntoIter<Activation>;

    fn into_iter(self) -> Self::IntoIter {
        self.activations.into_iter()
    }
}
