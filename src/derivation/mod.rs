//! Derivation records.
//!
//! Every rule firing is recorded with the facts that supported it and the
//! facts it asserted. The trace is the reasoning log of a session: it links
//! each derived fact back to its premises, down to the initial answers.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::fact::FactId;
use crate::inference::Binding;
use crate::store::FactEntry;

/// One rule firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Derivation {
    /// Pass the rule fired in, starting at 1.
    pub pass: usize,

    /// Rule name.
    pub rule: String,

    /// Variables the actions were instantiated with.
    #[serde(default, skip_serializing_if = "Binding::is_empty")]
    pub binding: Binding,

    /// Facts that satisfied the rule's condition.
    pub premises: Vec<FactId>,

    /// Facts asserted by the firing. With duplicate suppression enabled an
    /// already-present fact is listed under its existing id.
    pub asserted: Vec<FactId>,
}

impl Derivation {
    /// Renders the firing with fact contents, for reasoning logs.
    #[must_use]
    pub fn describe(&self, facts: &[FactEntry]) -> String {
        let by_id: HashMap<FactId, &FactEntry> = facts.iter().map(|e| (e.id, e)).collect();
        let render = |ids: &[FactId]| {
            ids.iter()
                .map(|id| by_id.get(id).map_or_else(|| id.to_string(), |e| e.fact.to_string()))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let premises = if self.premises.is_empty() {
            "(no matching facts)".to_string()
        } else {
            render(&self.premises)
        };
        format!(
            "pass {}: {} on {} => {}",
            self.pass,
            self.rule,
            premises,
            render(&self.asserted)
        )
    }
}

impl fmt::Display for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass {}: {} [", self.pass, self.rule)?;
        for (i, id) in self.premises.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{id}")?;
        }
        write!(f, "] =>")?;
        for id in &self.asserted {
            write!(f, " {id}")?;
        }
        Ok(())
    }
}

/// Firings that contributed to `target`, premises first.
///
/// Returns an empty list for facts that were asserted initially rather than
/// derived.
#[must_use]
pub fn explain(target: FactId, trace: &[Derivation]) -> Vec<&Derivation> {
    let producer: HashMap<FactId, usize> = trace
        .iter()
        .enumerate()
        .flat_map(|(i, d)| d.asserted.iter().map(move |id| (*id, i)))
        .rev()
        .collect();

    let mut needed = BTreeSet::new();
    let mut stack = vec![target];
    while let Some(id) = stack.pop() {
        if let Some(&idx) = producer.get(&id) {
            if needed.insert(idx) {
                stack.extend(trace[idx].premises.iter().copied());
            }
        }
    }
    needed.into_iter().map(|i| &trace[i]).collect()
}
