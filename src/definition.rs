//! Rule-set definitions as structured data.
//!
//! A [`RuleSetDefinition`] is the serde form of a knowledge base. Rule sets
//! can be shipped as JSON and loaded at startup without recompiling.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::ValidationError;
use crate::intake::IntakeMapping;
use crate::rule::Rule;
use crate::scoring::ScoringPolicy;
use crate::template::Template;

/// Everything needed to build a knowledge base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSetDefinition {
    /// Rule set name.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Templates, in definition order.
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Rules, in declaration order.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Intake mappings, in application order.
    #[serde(default)]
    pub intake: Vec<IntakeMapping>,
    #[serde(default)]
    pub scoring: ScoringPolicy,
    #[serde(default)]
    pub config: EngineConfig,
}

impl RuleSetDefinition {
    /// Parses a JSON definition.
    ///
    /// # Errors
    /// `InvalidDefinition` carrying the parser's message.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::InvalidDefinition {
            reason: e.to_string(),
        })
    }

    /// Renders the definition as pretty-printed JSON.
    ///
    /// # Errors
    /// `InvalidDefinition` if serialization fails.
    pub fn to_json(&self) -> Result<String, ValidationError> {
        serde_json::to_string_pretty(self).map_err(|e| ValidationError::InvalidDefinition {
            reason: e.to_string(),
        })
    }
}
