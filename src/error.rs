//! Error types for the triage engine.
//!
//! All errors are strongly typed using thiserror. Load-time problems
//! (templates, rules, intake answers) are [`ValidationError`]s and prevent a
//! session from starting; problems that surface while inference runs are
//! [`ExecutionError`]s and abort only the session that hit them.

use thiserror::Error;

use crate::fact::FactId;

/// Validation errors raised while building a knowledge base or asserting facts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Fact does not match template '{template}': {reason}")]
    TemplateMismatch {
        template: String,
        reason: String,
    },

    #[error("Template '{name}' is already defined")]
    DuplicateTemplate {
        name: String,
    },

    #[error("Unknown template: {name}")]
    UnknownTemplate {
        name: String,
    },

    #[error("Invalid template '{name}': {reason}")]
    InvalidTemplate {
        name: String,
        reason: String,
    },

    #[error("Invalid condition in rule '{rule}': {reason}")]
    InvalidCondition {
        rule: String,
        reason: String,
    },

    #[error("Rule '{name}' is already defined")]
    DuplicateRule {
        name: String,
    },

    #[error("Required answer '{key}' is missing")]
    MissingAnswer {
        key: String,
    },

    #[error("Answer '{key}' is invalid: {reason}")]
    InvalidAnswer {
        key: String,
        reason: String,
    },

    #[error("Invalid rule set definition: {reason}")]
    InvalidDefinition {
        reason: String,
    },
}

/// Execution errors raised while a session runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(
        "Rule set '{rule_set}' did not reach quiescence within {max_passes} passes (last pass fired: {last_fired:?})"
    )]
    NonTerminatingRuleSet {
        rule_set: String,
        max_passes: usize,
        last_fired: Vec<String>,
    },

    #[error("Fact not found: {id}")]
    UnknownFact {
        id: FactId,
    },

    #[error("Rule '{rule}' asserted an invalid fact {fact}: {source}")]
    ActionRejected {
        rule: String,
        fact: String,
        #[source]
        source: ValidationError,
    },

    #[error("Session queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Session worker pool is disconnected")]
    Disconnected,

    #[error("Session timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Session has failed and must be reset: {reason}")]
    SessionAborted {
        reason: String,
    },

    #[error("Failed to spawn session worker: {reason}")]
    WorkerSpawn {
        reason: String,
    },
}

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriageError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl TriageError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if the same request could succeed when submitted again.
    ///
    /// Only worker-pool saturation and timeouts qualify; everything else is a
    /// configuration or rule-set defect.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Execution(e) => {
                matches!(e, ExecutionError::QueueFull { .. } | ExecutionError::Timeout { .. })
            }
        }
    }
}

/// Result type alias for engine operations.
pub type TriageResult<T> = Result<T, TriageError>;
