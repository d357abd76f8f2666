//! # triage-engine - a forward-chaining rule engine for symptom triage
//!
//! Facts describe what is known about a case. Rules pattern-match over the
//! facts and assert new ones. The engine fires rules to quiescence and folds
//! the resulting facts into an [`Outcome`] holding a severity score, a band,
//! tagged advisories and named conclusions.
//!
//! ## Core Concepts
//!
//! - **Template**: named, typed field layout for a family of facts, with an
//!   optional role (score, message, conclusion) read by the scoring step
//! - **Rule**: a condition (patterns combined with and/or/not) plus actions
//! - **KnowledgeBase**: an immutable, validated rule set shared by sessions
//! - **Session**: one run of the inference loop over its own fact store
//!
//! ## Usage
//!
//! ```rust
//! use triage_engine::{Action, Answers, Condition, IntakeMapping, KnowledgeBase, Pattern, Rule, Template};
//!
//! let kb = KnowledgeBase::builder("demo")
//!     .template(Template::conclusion("diagnosis"))
//!     .intake(IntakeMapping::flag("has"))
//!     .rule(
//!         Rule::new(
//!             "flu",
//!             Condition::all(vec![
//!                 Pattern::symbols("has", ["fever"]).into(),
//!                 Pattern::symbols("has", ["body-ache"]).into(),
//!             ]),
//!         )
//!         .then(Action::symbols("diagnosis", ["flu"])),
//!     )
//!     .build()?;
//!
//! let outcome = kb.begin_session(&Answers::new().yes("fever").yes("body-ache"))?;
//! assert!(outcome.has_conclusion("flu"));
//! # Ok::<(), triage_engine::TriageError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod error;
pub mod fact;
pub mod pattern;
pub mod template;
pub mod value;

// Matching and inference
pub mod derivation;
pub mod inference;
pub mod rule;
pub mod store;

// Sessions, intake and results
pub mod catalog;
pub mod config;
pub mod definition;
pub mod engine;
pub mod intake;
pub mod scoring;

pub use config::{EngineConfig, FiringMode};
pub use definition::RuleSetDefinition;
pub use derivation::{explain, Derivation};
pub use engine::runtime::{RuntimeConfig, SessionHandle, TriageRuntime};
pub use engine::{KnowledgeBase, KnowledgeBaseBuilder, Session, SessionState, Step};
pub use error::{ExecutionError, TriageError, TriageResult, ValidationError};
pub use fact::{Fact, FactId};
pub use inference::{Binding, Match};
pub use intake::{Answers, IntakeMapping, RecordField};
pub use pattern::{CompareOp, FieldTest, Operand, Pattern};
pub use rule::{Action, Condition, Rule, RuleBase, RuleId};
pub use scoring::{Advisory, Band, Outcome, ScoringPolicy};
pub use store::{FactEntry, FactStore};
pub use template::{FieldSpec, FieldType, ScoreFold, Template, TemplateRegistry, TemplateRole};
pub use value::Value;
