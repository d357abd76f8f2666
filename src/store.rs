//! The per-session fact store.
//!
//! Facts are kept in insertion order. Every assertion is validated against
//! the template registry the store was opened with; ordered facts (relations
//! with no declared template) are accepted with any arity.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{ExecutionError, ValidationError};
use crate::fact::{Fact, FactId};
use crate::inference::{match_pattern, Binding};
use crate::pattern::Pattern;
use crate::template::TemplateRegistry;

/// A fact together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactEntry {
    /// Assigned id.
    pub id: FactId,
    /// The fact value.
    pub fact: Fact,
}

/// Result of inserting a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The fact was stored under a new id.
    Added(FactId),
    /// Duplicates are disabled and an equal fact already exists.
    Existing(FactId),
}

impl Insertion {
    /// The id of the stored fact, new or existing.
    #[must_use]
    pub const fn id(self) -> FactId {
        match self {
            Self::Added(id) | Self::Existing(id) => id,
        }
    }

    /// Returns true if a new fact was stored.
    #[must_use]
    pub const fn is_added(self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// Facts asserted in one session.
#[derive(Debug, Clone)]
pub struct FactStore<'r> {
    registry: &'r TemplateRegistry,
    entries: Vec<FactEntry>,
    next_seq: u64,
    allow_duplicates: bool,
}

impl<'r> FactStore<'r> {
    /// Opens an empty store validating against `registry`.
    #[must_use]
    pub fn new(registry: &'r TemplateRegistry, allow_duplicates: bool) -> Self {
        Self {
            registry,
            entries: Vec::new(),
            next_seq: 1,
            allow_duplicates,
        }
    }

    /// Asserts a fact and returns its id.
    ///
    /// When duplicates are disabled and an equal fact is present, the
    /// existing id is returned and nothing is stored.
    ///
    /// # Errors
    /// `TemplateMismatch` if the fact does not conform to its template.
    pub fn assert(&mut self, fact: Fact) -> Result<FactId, ValidationError> {
        self.insert(fact).map(Insertion::id)
    }

    /// Asserts a fact and reports whether it was newly stored.
    pub fn insert(&mut self, fact: Fact) -> Result<Insertion, ValidationError> {
        self.registry.check(&fact)?;

        if !self.allow_duplicates {
            if let Some(existing) = self.entries.iter().find(|e| e.fact == fact) {
                return Ok(Insertion::Existing(existing.id));
            }
        }

        let id = FactId::new(self.next_seq);
        self.next_seq += 1;
        trace!(%id, %fact, "fact asserted");
        self.entries.push(FactEntry { id, fact });
        Ok(Insertion::Added(id))
    }

    /// Removes a fact by id and returns it.
    ///
    /// # Errors
    /// `UnknownFact` if no fact with this id is present.
    pub fn retract(&mut self, id: FactId) -> Result<Fact, ExecutionError> {
        let idx = self
            .entries
            .binary_search_by_key(&id, |e| e.id)
            .map_err(|_| ExecutionError::UnknownFact { id })?;
        let entry = self.entries.remove(idx);
        trace!(%id, fact = %entry.fact, "fact retracted");
        Ok(entry.fact)
    }

    /// Looks up a fact by id.
    #[must_use]
    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.entries
            .binary_search_by_key(&id, |e| e.id)
            .ok()
            .map(|idx| &self.entries[idx].fact)
    }

    /// All facts in insertion order.
    pub fn all(&self) -> impl Iterator<Item = &Fact> {
        self.entries.iter().map(|e| &e.fact)
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[FactEntry] {
        &self.entries
    }

    /// Entries of one relation, in insertion order.
    pub fn of_relation<'a>(&'a self, relation: &'a str) -> impl Iterator<Item = &'a FactEntry> + 'a {
        self.entries.iter().filter(move |e| e.fact.relation == relation)
    }

    /// Every fact satisfying `pattern` under `binding`, with the extended binding.
    #[must_use]
    pub fn matches(&self, pattern: &Pattern, binding: &Binding) -> Vec<(FactId, Binding)> {
        match_pattern(pattern, self, binding)
    }

    /// The registry facts are validated against.
    #[must_use]
    pub fn registry(&self) -> &'r TemplateRegistry {
        self.registry
    }

    /// Number of facts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the store holds no facts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every fact and restarts id assignment.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 1;
    }
}
