//! The inference loop.
//!
//! A session owns one fact store and borrows a knowledge base. Running it
//! alternates between matching (building the agenda against the current
//! store) and firing (asserting the actions of every activation) until the
//! agenda comes up empty.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::FiringMode;
use crate::derivation::Derivation;
use crate::engine::KnowledgeBase;
use crate::error::{ExecutionError, TriageResult, ValidationError};
use crate::fact::{Fact, FactId};
use crate::inference::{still_matches, Activation, Agenda, Refraction};
use crate::intake::{translate, Answers};
use crate::scoring::{aggregate, Outcome};
use crate::store::{FactEntry, FactStore};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting facts; not yet run.
    Idle,
    /// Building the agenda for the next pass.
    Matching,
    /// Firing the activations of the current pass.
    Firing,
    /// No rule can fire.
    Quiescent,
    /// A pass failed; the session must be reset.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Matching => "matching",
            Self::Firing => "firing",
            Self::Quiescent => "quiescent",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a single [`Session::step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// A pass fired these rules, in order.
    Fired {
        /// Pass number, starting at 1.
        pass: usize,
        /// Names of the rules that fired.
        rules: Vec<String>,
    },
    /// The agenda was empty.
    Quiescent,
}

/// One inference run over a shared knowledge base.
#[derive(Debug)]
pub struct Session<'kb> {
    kb: &'kb KnowledgeBase,
    store: FactStore<'kb>,
    refraction: Refraction,
    trace: Vec<Derivation>,
    state: SessionState,
    passes: usize,
    last_fired: Vec<String>,
    failure: Option<ExecutionError>,
}

impl<'kb> Session<'kb> {
    pub(crate) fn new(kb: &'kb KnowledgeBase) -> Self {
        Self {
            kb,
            store: FactStore::new(kb.registry(), kb.config().allow_duplicate_facts),
            refraction: Refraction::new(),
            trace: Vec::new(),
            state: SessionState::Idle,
            passes: 0,
            last_fired: Vec::new(),
            failure: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Passes that fired at least one activation.
    #[must_use]
    pub const fn passes(&self) -> usize {
        self.passes
    }

    /// The error that failed the session, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&ExecutionError> {
        self.failure.as_ref()
    }

    #[must_use]
    pub fn facts(&self) -> &FactStore<'kb> {
        &self.store
    }

    /// Rule firings so far, in order.
    #[must_use]
    pub fn derivations(&self) -> &[Derivation] {
        &self.trace
    }

    #[must_use]
    pub const fn knowledge_base(&self) -> &'kb KnowledgeBase {
        self.kb
    }

    fn ensure_usable(&self) -> Result<(), ExecutionError> {
        match &self.failure {
            Some(err) => Err(ExecutionError::SessionAborted {
                reason: err.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Asserts a fact. A quiescent session becomes idle again.
    ///
    /// # Errors
    /// - `TemplateMismatch` if the fact does not fit its template.
    /// - `SessionAborted` if the session has failed.
    pub fn assert(&mut self, fact: Fact) -> TriageResult<FactId> {
        self.ensure_usable()?;
        let id = self.store.assert(fact)?;
        self.state = SessionState::Idle;
        Ok(id)
    }

    /// Translates answers through the knowledge base's intake mappings and
    /// asserts the resulting facts.
    ///
    /// Nothing is asserted if any answer is rejected.
    ///
    /// # Errors
    /// - `MissingAnswer` if a record field has no answer and no default.
    /// - `InvalidAnswer` if an answer cannot be read as its field's type.
    /// - `TemplateMismatch` if a translated fact does not fit its template.
    /// - `SessionAborted` if the session has failed.
    pub fn assert_answers(&mut self, answers: &Answers) -> TriageResult<Vec<FactId>> {
        self.ensure_usable()?;
        let facts = translate(self.kb.registry(), self.kb.intake(), answers)?;
        facts
            .into_iter()
            .map(|fact| self.assert(fact))
            .collect()
    }

    /// Retracts a fact by id.
    ///
    /// # Errors
    /// `UnknownFact` if it is not present.
    pub fn retract(&mut self, id: FactId) -> TriageResult<Fact> {
        self.ensure_usable()?;
        let fact = self.store.retract(id)?;
        self.state = SessionState::Idle;
        Ok(fact)
    }

    /// Runs one pass: builds the agenda and fires it.
    ///
    /// # Errors
    /// - `NonTerminatingRuleSet` if the agenda is still non-empty after
    ///   `max_passes` passes.
    /// - `ActionRejected` if a rule asserts a fact its template rejects.
    /// - `SessionAborted` if the session had already failed.
    pub fn step(&mut self) -> TriageResult<Step> {
        self.ensure_usable()?;
        if self.state == SessionState::Quiescent {
            return Ok(Step::Quiescent);
        }

        self.state = SessionState::Matching;
        let agenda = Agenda::build(self.kb.rules(), &self.store, &self.refraction);
        if agenda.is_empty() {
            self.state = SessionState::Quiescent;
            tracing::info!(
                rule_set = %self.kb.name(),
                passes = self.passes,
                facts = self.store.len(),
                "session quiescent"
            );
            return Ok(Step::Quiescent);
        }

        let max_passes = self.kb.config().max_passes;
        if self.passes >= max_passes {
            let err = ExecutionError::NonTerminatingRuleSet {
                rule_set: self.kb.name().to_string(),
                max_passes,
                last_fired: self.last_fired.clone(),
            };
            tracing::warn!(
                rule_set = %self.kb.name(),
                max_passes,
                pending = agenda.len(),
                "rule set did not reach quiescence"
            );
            return Err(self.fail(err).into());
        }

        self.state = SessionState::Firing;
        let pass = self.passes + 1;
        tracing::debug!(rule_set = %self.kb.name(), pass, activations = agenda.len(), "pass started");

        let mut fired = Vec::with_capacity(agenda.len());
        for activation in agenda {
            match self.fire(pass, activation) {
                Ok(Some(name)) => fired.push(name),
                Ok(None) => {}
                Err(err) => return Err(self.fail(err).into()),
            }
        }

        self.passes = pass;
        self.last_fired.clone_from(&fired);
        self.state = SessionState::Matching;
        Ok(Step::Fired { pass, rules: fired })
    }

    /// Fires one activation; `None` if revalidation dropped it.
    fn fire(&mut self, pass: usize, activation: Activation) -> Result<Option<String>, ExecutionError> {
        let kb = self.kb;
        let Some(rule) = kb.rules().get(activation.rule) else {
            return Ok(None);
        };

        if kb.config().firing_mode == FiringMode::Revalidate
            && !still_matches(rule.condition(), &self.store, &activation.as_match())
        {
            tracing::debug!(rule = %rule.name(), pass, "activation no longer matches, dropped");
            return Ok(None);
        }

        self.refraction.record(rule.id, activation.support.clone());

        let mut asserted = Vec::with_capacity(rule.effects.len());
        for effect in &rule.effects {
            let fact = effect.instantiate(&activation.binding).map_err(|var| {
                ExecutionError::ActionRejected {
                    rule: rule.name().to_string(),
                    fact: format!("({} ...)", effect.relation),
                    source: ValidationError::InvalidCondition {
                        rule: rule.name().to_string(),
                        reason: format!("variable {var} is not bound"),
                    },
                }
            })?;
            let rendered = fact.to_string();
            let id = self
                .store
                .assert(fact)
                .map_err(|source| ExecutionError::ActionRejected {
                    rule: rule.name().to_string(),
                    fact: rendered,
                    source,
                })?;
            asserted.push(id);
        }

        tracing::debug!(rule = %rule.name(), pass, asserted = ?asserted, "rule fired");
        self.trace.push(Derivation {
            pass,
            rule: rule.name().to_string(),
            binding: activation.binding,
            premises: activation.support,
            asserted,
        });
        Ok(Some(rule.name().to_string()))
    }

    fn fail(&mut self, err: ExecutionError) -> ExecutionError {
        if let ExecutionError::ActionRejected { rule, fact, .. } = &err {
            tracing::warn!(rule = %rule, fact = %fact, "rule action rejected");
        }
        self.state = SessionState::Failed;
        self.failure = Some(err.clone());
        err
    }

    /// Runs passes until quiescence and returns the number of firing passes.
    ///
    /// # Errors
    /// See [`Session::step`].
    pub fn run(&mut self) -> TriageResult<usize> {
        while let Step::Fired { .. } = self.step()? {}
        Ok(self.passes)
    }

    /// Aggregates the current store into an outcome.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        let facts: Vec<FactEntry> = self.store.entries().to_vec();
        let assessment = aggregate(self.kb.registry(), self.kb.scoring(), &facts);
        Outcome {
            rule_set: self.kb.name().to_string(),
            score: assessment.score,
            band: assessment.band,
            advisories: assessment.advisories,
            conclusions: assessment.conclusions,
            facts,
            derivations: self.trace.clone(),
            passes: self.passes,
        }
    }

    /// Clears facts, refraction memory, trace and state.
    pub fn reset(&mut self) {
        self.store.clear();
        self.refraction.clear();
        self.trace.clear();
        self.state = SessionState::Idle;
        self.passes = 0;
        self.last_fired.clear();
        self.failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::pattern::{FieldTest, Operand, Pattern};
    use crate::rule::{Action, Condition, Rule};
    use crate::template::{ScoreFold, Template};
    use crate::value::Value;

    fn walk(max_passes: usize) -> KnowledgeBase {
        KnowledgeBase::builder("walk")
            .rule(
                Rule::new(
                    "advance",
                    Condition::all(vec![
                        Pattern::ordered("at", vec![FieldTest::bind("x")]).into(),
                        Pattern::ordered("link", vec![FieldTest::bind("x"), FieldTest::bind("y")]).into(),
                    ]),
                )
                .then(Action::ordered("at", vec![Operand::var("y")])),
            )
            .config(EngineConfig::default().with_max_passes(max_passes))
            .build()
            .unwrap()
    }

    fn start_walk(session: &mut Session<'_>) {
        for (from, to) in [("a", "b"), ("b", "c"), ("c", "d")] {
            session.assert(Fact::symbols("link", [from, to])).unwrap();
        }
        session.assert(Fact::symbols("at", ["a"])).unwrap();
    }

    #[test]
    fn test_state_machine_transitions() {
        let kb = KnowledgeBase::builder("demo")
            .rule(Rule::new("a", Pattern::symbols("has", ["x"])).then(Action::symbols("seen", ["x"])))
            .build()
            .unwrap();
        let mut session = kb.session();
        assert_eq!(session.state(), SessionState::Idle);

        session.assert(Fact::symbols("has", ["x"])).unwrap();
        assert_eq!(
            session.step().unwrap(),
            Step::Fired {
                pass: 1,
                rules: vec!["a".to_string()]
            }
        );
        assert_eq!(session.state(), SessionState::Matching);
        assert_eq!(session.step().unwrap(), Step::Quiescent);
        assert_eq!(session.state(), SessionState::Quiescent);
        assert_eq!(session.step().unwrap(), Step::Quiescent);

        session.assert(Fact::symbols("has", ["y"])).unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_refraction_persists_across_runs() {
        let kb = KnowledgeBase::builder("demo")
            .rule(Rule::new("a", Pattern::symbols("has", ["x"])).then(Action::symbols("seen", ["x"])))
            .build()
            .unwrap();
        let mut session = kb.session();
        session.assert(Fact::symbols("has", ["x"])).unwrap();
        assert_eq!(session.run().unwrap(), 1);
        session.assert(Fact::symbols("has", ["z"])).unwrap();
        assert_eq!(session.run().unwrap(), 1);
        assert_eq!(session.derivations().len(), 1);
    }

    #[test]
    fn test_snapshot_mode_fires_whole_agenda() {
        let kb = KnowledgeBase::builder("demo")
            .rule(Rule::new("first", Pattern::symbols("go", ["now"])).then(Action::symbols("mark", ["done"])))
            .rule(
                Rule::new("fallback", Condition::not(Pattern::symbols("mark", ["done"]).into()))
                    .then(Action::symbols("mark", ["fallback"])),
            )
            .build()
            .unwrap();
        let mut session = kb.session();
        session.assert(Fact::symbols("go", ["now"])).unwrap();
        session.run().unwrap();
        let rules: Vec<_> = session.derivations().iter().map(|d| d.rule.as_str()).collect();
        assert_eq!(rules, vec!["first", "fallback"]);
    }

    #[test]
    fn test_revalidate_mode_drops_cancelled_activation() {
        let kb = KnowledgeBase::builder("demo")
            .rule(Rule::new("first", Pattern::symbols("go", ["now"])).then(Action::symbols("mark", ["done"])))
            .rule(
                Rule::new("fallback", Condition::not(Pattern::symbols("mark", ["done"]).into()))
                    .then(Action::symbols("mark", ["fallback"])),
            )
            .config(EngineConfig::default().with_firing_mode(FiringMode::Revalidate))
            .build()
            .unwrap();
        let mut session = kb.session();
        session.assert(Fact::symbols("go", ["now"])).unwrap();
        session.run().unwrap();
        let rules: Vec<_> = session.derivations().iter().map(|d| d.rule.as_str()).collect();
        assert_eq!(rules, vec!["first"]);
    }

    #[test]
    fn test_chained_passes_reach_fixpoint() {
        let kb = walk(100);
        let mut session = kb.session();
        start_walk(&mut session);
        assert_eq!(session.run().unwrap(), 3);
        let reached: Vec<_> = session
            .derivations()
            .iter()
            .map(|d| d.binding.get("y").cloned())
            .collect();
        assert_eq!(
            reached,
            vec![Some(Value::symbol("b")), Some(Value::symbol("c")), Some(Value::symbol("d"))]
        );
    }

    #[test]
    fn test_pass_limit() {
        // Exactly max_passes passes succeeds.
        let kb = walk(3);
        let mut session = kb.session();
        start_walk(&mut session);
        assert_eq!(session.run().unwrap(), 3);

        let kb = walk(2);
        let mut session = kb.session();
        start_walk(&mut session);
        let err = session.run().unwrap_err();
        assert!(err.is_execution());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(
            session.failure(),
            Some(ExecutionError::NonTerminatingRuleSet { max_passes: 2, last_fired, .. })
                if last_fired == &vec!["advance".to_string()]
        ));
        assert!(matches!(
            session.step(),
            Err(crate::error::TriageError::Execution(ExecutionError::SessionAborted { .. }))
        ));

        session.reset();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.facts().is_empty());
        assert!(session.derivations().is_empty());
    }

    #[test]
    fn test_rejected_action_fails_session() {
        let kb = KnowledgeBase::builder("demo")
            .template(Template::score("risk_adder", ScoreFold::Sum))
            .rule(
                Rule::new("negative", Pattern::ordered("delta", vec![FieldTest::bind("d")]))
                    .then(Action::ordered("risk_adder", vec![Operand::var("d")])),
            )
            .build()
            .unwrap();
        let mut session = kb.session();
        session.assert(Fact::new("delta", vec![Value::Int(-5)])).unwrap();
        let err = session.run().unwrap_err();
        match err {
            crate::error::TriageError::Execution(ExecutionError::ActionRejected { rule, source, .. }) => {
                assert_eq!(rule, "negative");
                assert!(matches!(source, ValidationError::TemplateMismatch { .. }));
            }
            other => panic!("expected ActionRejected, got {other:?}"),
        }
    }

    #[test]
    fn test_assert_answers_rejects_without_asserting() {
        let kb = crate::catalog::respiratory_risk().unwrap();
        let mut session = kb.session();

        let err = session.assert_answers(&Answers::new().yes("fever")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TriageError::Validation(ValidationError::MissingAnswer { .. })
        ));
        let err = session.assert_answers(&Answers::new().set("age", "old")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TriageError::Validation(ValidationError::InvalidAnswer { .. })
        ));
        assert!(session.facts().is_empty());

        session.fail(ExecutionError::SessionAborted {
            reason: "test".to_string(),
        });
        let err = session.assert_answers(&Answers::new().set("age", 40)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TriageError::Execution(ExecutionError::SessionAborted { .. })
        ));
    }

    #[test]
    fn test_disjunction_fires_once_on_its_first_branch() {
        let kb = KnowledgeBase::builder("demo")
            .rule(
                Rule::new(
                    "either",
                    Condition::any(vec![
                        Pattern::symbols("has", ["a"]).into(),
                        Pattern::symbols("has", ["b"]).into(),
                    ]),
                )
                .then(Action::symbols("seen", ["either"])),
            )
            .build()
            .unwrap();
        let mut session = kb.session();
        let first = session.assert(Fact::symbols("has", ["a"])).unwrap();
        session.run().unwrap();
        session.assert(Fact::symbols("has", ["b"])).unwrap();
        session.run().unwrap();

        assert_eq!(session.derivations().len(), 1);
        assert_eq!(session.derivations()[0].premises, vec![first]);
    }

    #[test]
    fn test_retract_unknown_fact() {
        let kb = KnowledgeBase::builder("demo").build().unwrap();
        let mut session = kb.session();
        let id = session.assert(Fact::symbols("has", ["x"])).unwrap();
        session.retract(id).unwrap();
        assert!(session.retract(id).is_err());
    }
}
