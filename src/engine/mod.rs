//! Knowledge bases and sessions.
//!
//! A [`KnowledgeBase`] bundles everything that is fixed for a rule set:
//! templates, rules, intake mappings, scoring policy and engine settings.
//! It is validated once when built and is read-only afterwards, so any
//! number of sessions (on any number of threads) can borrow it.

mod session;

/// Bounded worker pool running sessions concurrently.
pub mod runtime;

pub use session::{Session, SessionState, Step};

use crate::config::EngineConfig;
use crate::definition::RuleSetDefinition;
use crate::error::{TriageResult, ValidationError};
use crate::fact::Fact;
use crate::intake::{Answers, IntakeMapping};
use crate::rule::{Rule, RuleBase};
use crate::scoring::{Outcome, ScoringPolicy};
use crate::template::{Template, TemplateRegistry};

/// An immutable, validated rule set.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    name: String,
    description: Option<String>,
    registry: TemplateRegistry,
    rules: RuleBase,
    intake: Vec<IntakeMapping>,
    scoring: ScoringPolicy,
    config: EngineConfig,
}

impl KnowledgeBase {
    /// Starts building a knowledge base.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> KnowledgeBaseBuilder {
        KnowledgeBaseBuilder::new(name)
    }

    /// Builds a knowledge base from a rule-set definition.
    ///
    /// # Errors
    /// The first validation error found; nothing is partially loaded.
    pub fn from_definition(definition: RuleSetDefinition) -> Result<Self, ValidationError> {
        let RuleSetDefinition {
            name,
            description,
            templates,
            rules,
            intake,
            scoring,
            config,
        } = definition;
        let mut builder = Self::builder(name).config(config).scoring(scoring);
        if let Some(description) = description {
            builder = builder.description(description);
        }
        builder.templates.extend(templates);
        builder.rules.extend(rules);
        builder.intake.extend(intake);
        builder.build()
    }

    /// Builds a knowledge base from a JSON rule-set definition.
    ///
    /// # Errors
    /// `InvalidDefinition` if the JSON does not parse, otherwise as
    /// [`KnowledgeBase::from_definition`].
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        Self::from_definition(RuleSetDefinition::from_json(json)?)
    }

    /// Exports the knowledge base as a definition.
    #[must_use]
    pub fn to_definition(&self) -> RuleSetDefinition {
        RuleSetDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            templates: self.registry.iter().cloned().collect(),
            rules: self.rules.iter().map(|r| r.rule.clone()).collect(),
            intake: self.intake.clone(),
            scoring: self.scoring.clone(),
            config: self.config.clone(),
        }
    }

    /// Opens an empty session.
    #[must_use]
    pub fn session(&self) -> Session<'_> {
        Session::new(self)
    }

    /// Translates answers into initial facts, runs to quiescence and returns
    /// the outcome.
    ///
    /// # Errors
    /// - Intake errors (`MissingAnswer`, `InvalidAnswer`, `TemplateMismatch`).
    /// - Inference errors (`NonTerminatingRuleSet`, `ActionRejected`).
    pub fn begin_session(&self, answers: &Answers) -> TriageResult<Outcome> {
        let mut session = self.session();
        session.assert_answers(answers)?;
        self.finish(session)
    }

    /// Runs a session from explicit initial facts.
    ///
    /// # Errors
    /// As [`KnowledgeBase::begin_session`].
    pub fn begin_session_with<I>(&self, facts: I) -> TriageResult<Outcome>
    where
        I: IntoIterator<Item = Fact>,
    {
        let mut session = self.session();
        for fact in facts {
            session.assert(fact)?;
        }
        self.finish(session)
    }

    fn finish(&self, mut session: Session<'_>) -> TriageResult<Outcome> {
        session.run()?;
        let outcome = session.outcome();
        tracing::info!(
            rule_set = %self.name,
            passes = outcome.passes,
            score = outcome.score,
            band = outcome.label().unwrap_or("-"),
            conclusions = ?outcome.conclusions,
            "session complete"
        );
        Ok(outcome)
    }

    /// One line per rule, in declaration order, for display.
    #[must_use]
    pub fn rulebook(&self) -> Vec<String> {
        self.rules
            .iter()
            .map(|r| match &r.rule.description {
                Some(d) => format!("{}: {d}", r.name()),
                None => format!("{}: {}", r.name(), r.condition()),
            })
            .collect()
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    #[must_use]
    pub fn rules(&self) -> &RuleBase {
        &self.rules
    }

    #[must_use]
    pub fn intake(&self) -> &[IntakeMapping] {
        &self.intake
    }

    #[must_use]
    pub fn scoring(&self) -> &ScoringPolicy {
        &self.scoring
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Builder for [`KnowledgeBase`].
///
/// # Example
/// ```
/// use triage_engine::{Action, KnowledgeBase, Pattern, Rule};
///
/// let kb = KnowledgeBase::builder("demo")
///     .rule(Rule::new("flu", Pattern::symbols("has", ["fever"])).then(Action::symbols("diagnosis", ["flu"])))
///     .build()
///     .unwrap();
/// assert_eq!(kb.rules().len(), 1);
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct KnowledgeBaseBuilder {
    name: String,
    description: Option<String>,
    templates: Vec<Template>,
    rules: Vec<Rule>,
    intake: Vec<IntakeMapping>,
    scoring: ScoringPolicy,
    config: EngineConfig,
}

impl KnowledgeBaseBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            templates: Vec::new(),
            rules: Vec::new(),
            intake: Vec::new(),
            scoring: ScoringPolicy::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declares a template.
    pub fn template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    /// Appends a rule; declaration order is firing order.
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Appends an intake mapping.
    pub fn intake(mut self, mapping: IntakeMapping) -> Self {
        self.intake.push(mapping);
        self
    }

    pub fn scoring(mut self, scoring: ScoringPolicy) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validates everything and builds the knowledge base.
    ///
    /// # Errors
    /// The first of: `InvalidDefinition` (empty name or bad scoring policy),
    /// `DuplicateTemplate`/`InvalidTemplate`, `DuplicateRule`/`InvalidCondition`,
    /// or an intake mapping error.
    pub fn build(self) -> Result<KnowledgeBase, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::InvalidDefinition {
                reason: "rule set name cannot be empty".to_string(),
            });
        }

        let mut registry = TemplateRegistry::new();
        for template in self.templates {
            registry.define(template)?;
        }

        let mut rules = RuleBase::new();
        for rule in self.rules {
            rules.load(&registry, rule)?;
        }

        for mapping in &self.intake {
            mapping.validate(&registry)?;
        }
        self.scoring.validate()?;

        tracing::debug!(
            rule_set = %self.name,
            templates = registry.len(),
            rules = rules.len(),
            "knowledge base built"
        );

        Ok(KnowledgeBase {
            name: self.name,
            description: self.description,
            registry,
            rules,
            intake: self.intake,
            scoring: self.scoring,
            config: self.config,
        })
    }
}
