//! Outcome aggregation.
//!
//! Turns the terminal fact store of a session into a classification:
//! score-role facts fold into a severity score, message-role facts become
//! advisories, conclusion-role facts become named conclusions, and the
//! score is mapped onto the policy's bands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::derivation::Derivation;
use crate::error::ValidationError;
use crate::store::FactEntry;
use crate::template::{ScoreFold, TemplateRegistry, TemplateRole};
use crate::value::Value;

/// A named score threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// Lowest score that falls into this band.
    pub min_score: u64,
    /// Classification label, e.g. `"HIGH RISK / EMERGENCY"`.
    pub label: String,
    /// Guidance shown with the classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<String>,
}

impl Band {
    #[must_use]
    pub fn new(min_score: u64, label: impl Into<String>) -> Self {
        Self {
            min_score,
            label: label.into(),
            advice: None,
        }
    }

    #[must_use]
    pub fn with_advice(mut self, advice: impl Into<String>) -> Self {
        self.advice = Some(advice.into());
        self
    }
}

/// How the severity score is computed and classified.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Score before any contribution.
    pub base: u64,
    /// Upper clamp for the score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ceiling: Option<u64>,
    /// Classification bands.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bands: Vec<Band>,
}

impl ScoringPolicy {
    #[must_use]
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    #[must_use]
    pub fn with_band(mut self, band: Band) -> Self {
        self.bands.push(band);
        self
    }

    /// Checks that the ceiling is not below the base and thresholds are unique.
    ///
    /// # Errors
    /// `InvalidDefinition` describing the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(ceiling) = self.ceiling {
            if ceiling < self.base {
                return Err(ValidationError::InvalidDefinition {
                    reason: format!("score ceiling {ceiling} is below base {}", self.base),
                });
            }
        }
        for (i, band) in self.bands.iter().enumerate() {
            if band.label.trim().is_empty() {
                return Err(ValidationError::InvalidDefinition {
                    reason: format!("band at {} has an empty label", band.min_score),
                });
            }
            if self.bands[..i].iter().any(|b| b.min_score == band.min_score) {
                return Err(ValidationError::InvalidDefinition {
                    reason: format!("two bands start at score {}", band.min_score),
                });
            }
        }
        Ok(())
    }

    /// The band with the highest threshold not above `score`.
    #[must_use]
    pub fn classify(&self, score: u64) -> Option<&Band> {
        self.bands
            .iter()
            .filter(|b| b.min_score <= score)
            .max_by_key(|b| b.min_score)
    }
}

/// A tagged message collected from a message-role fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Advisory {
    /// Tag such as `critical`, `warning`, `risk` or `info`.
    pub tag: String,
    pub message: String,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.tag.to_uppercase(), self.message)
    }
}

/// Aggregated view of a fact store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assessment {
    pub score: u64,
    pub band: Option<Band>,
    pub advisories: Vec<Advisory>,
    pub conclusions: Vec<String>,
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.as_text().map_or_else(|| v.to_string(), str::to_string),
        None => String::new(),
    }
}

/// Folds the facts of a session into an assessment.
///
/// Facts of undeclared relations and plain templates are ignored.
#[must_use]
pub fn aggregate(registry: &TemplateRegistry, policy: &ScoringPolicy, facts: &[FactEntry]) -> Assessment {
    let mut contributions: u64 = 0;
    let mut advisories = Vec::new();
    let mut conclusions: Vec<String> = Vec::new();

    for template in registry.iter() {
        let TemplateRole::Score { field, fold } = &template.role else {
            continue;
        };
        let Some(idx) = template.field_index(field) else {
            continue;
        };
        let values = facts
            .iter()
            .filter(|e| e.fact.relation == template.name)
            .filter_map(|e| e.fact.value(idx).and_then(Value::as_int))
            .filter_map(|v| u64::try_from(v).ok());
        let kind_total = match fold {
            ScoreFold::Max => values.max().unwrap_or(0),
            ScoreFold::Sum => values.fold(0u64, u64::saturating_add),
        };
        contributions = contributions.saturating_add(kind_total);
    }

    for entry in facts {
        let Some(template) = registry.get(&entry.fact.relation) else {
            continue;
        };
        match &template.role {
            TemplateRole::Message {
                tag_field,
                message_field,
            } => {
                let field = |name: &str| template.field_index(name).and_then(|i| entry.fact.value(i));
                advisories.push(Advisory {
                    tag: text_of(field(tag_field.as_str())),
                    message: text_of(field(message_field.as_str())),
                });
            }
            TemplateRole::Conclusion { field } => {
                let conclusion = text_of(template.field_index(field).and_then(|i| entry.fact.value(i)));
                if !conclusions.contains(&conclusion) {
                    conclusions.push(conclusion);
                }
            }
            TemplateRole::Plain | TemplateRole::Score { .. } => {}
        }
    }

    let mut score = policy.base.saturating_add(contributions);
    if let Some(ceiling) = policy.ceiling {
        score = score.min(ceiling);
    }

    Assessment {
        score,
        band: policy.classify(score).cloned(),
        advisories,
        conclusions,
    }
}

/// Final result of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Name of the knowledge base that produced it.
    pub rule_set: String,
    /// Severity score.
    pub score: u64,
    /// Classification, if the policy declares bands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    /// Advisories in assertion order.
    pub advisories: Vec<Advisory>,
    /// Unique conclusions in assertion order.
    pub conclusions: Vec<String>,
    /// Terminal fact store.
    pub facts: Vec<FactEntry>,
    /// Rule firings in order.
    pub derivations: Vec<Derivation>,
    /// Number of passes that fired at least one rule.
    pub passes: usize,
}

impl Outcome {
    /// Returns true if any advisory carries `tag` (case-insensitive).
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.advisories.iter().any(|a| a.tag.eq_ignore_ascii_case(tag))
    }

    /// Returns true if `conclusion` was reached.
    #[must_use]
    pub fn has_conclusion(&self, conclusion: &str) -> bool {
        self.conclusions.iter().any(|c| c == conclusion)
    }

    /// Band label, if classified.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.band.as_ref().map(|b| b.label.as_str())
    }

    /// Hex blake3 digest of the outcome's JSON form.
    ///
    /// Equal outcomes always have equal fingerprints.
    ///
    /// # Errors
    /// Returns the serialization error if the outcome cannot be encoded.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, self)?;
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Human-readable account of the session, in the order it happened.
    #[must_use]
    pub fn reasoning_log(&self) -> Vec<String> {
        let mut log = Vec::with_capacity(self.derivations.len() + self.advisories.len() + 2);
        for d in &self.derivations {
            log.push(d.describe(&self.facts));
        }
        log.push(format!(
            "Inference complete after {} pass(es). Calculated score: {}",
            self.passes, self.score
        ));
        log.extend(self.advisories.iter().map(ToString::to_string));
        if let Some(band) = &self.band {
            match &band.advice {
                Some(advice) => log.push(format!("{}: {advice}", band.label)),
                None => log.push(band.label.clone()),
            }
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Fact, FactId};
    use crate::template::Template;

    fn registry() -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        registry.define(Template::message("advice")).unwrap();
        registry.define(Template::score("diagnosis_level", ScoreFold::Max)).unwrap();
        registry.define(Template::score("risk_adder", ScoreFold::Sum)).unwrap();
        registry.define(Template::conclusion("diagnosis")).unwrap();
        registry
    }

    fn entries(facts: Vec<Fact>) -> Vec<FactEntry> {
        facts
            .into_iter()
            .zip(1..)
            .map(|(fact, n)| FactEntry {
                id: FactId::new(n),
                fact,
            })
            .collect()
    }

    fn int(relation: &str, v: i64) -> Fact {
        Fact::new(relation, vec![Value::Int(v)])
    }

    fn bands() -> ScoringPolicy {
        ScoringPolicy::default()
            .with_band(Band::new(0, "LOW RISK"))
            .with_band(Band::new(30, "LOW to MODERATE RISK"))
            .with_band(Band::new(60, "MODERATE to HIGH RISK"))
            .with_band(Band::new(100, "HIGH RISK / EMERGENCY"))
    }

    #[test]
    fn test_max_and_sum_folds() {
        let facts = entries(vec![
            int("diagnosis_level", 50),
            int("risk_adder", 20),
            int("diagnosis_level", 80),
            int("risk_adder", 20),
        ]);
        let a = aggregate(&registry(), &bands(), &facts);
        assert_eq!(a.score, 120);
        assert_eq!(a.band.map(|b| b.label), Some("HIGH RISK / EMERGENCY".to_string()));
    }

    #[test]
    fn test_score_is_order_independent() {
        let mut facts = vec![int("risk_adder", 20), int("diagnosis_level", 30), int("diagnosis_level", 80)];
        let forward = aggregate(&registry(), &bands(), &entries(facts.clone())).score;
        facts.reverse();
        let backward = aggregate(&registry(), &bands(), &entries(facts)).score;
        assert_eq!(forward, 100);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_ceiling_and_base() {
        let policy = bands().with_base(5).with_ceiling(100);
        let facts = entries(vec![int("diagnosis_level", 100), int("risk_adder", 20)]);
        assert_eq!(aggregate(&registry(), &policy, &facts).score, 100);

        let a = aggregate(&registry(), &policy, &[]);
        assert_eq!(a.score, 5);
        assert_eq!(a.band.map(|b| b.label), Some("LOW RISK".to_string()));
    }

    #[test]
    fn test_advisories_and_unique_conclusions_in_order() {
        let facts = entries(vec![
            Fact::symbols("diagnosis", ["covid-suspected"]),
            Fact::new("advice", vec![Value::string("warning"), Value::string("isolate")]),
            Fact::symbols("diagnosis", ["covid-severe"]),
            Fact::symbols("diagnosis", ["covid-suspected"]),
            Fact::symbols("has", ["fever"]),
        ]);
        let a = aggregate(&registry(), &ScoringPolicy::default(), &facts);
        assert_eq!(a.conclusions, vec!["covid-suspected", "covid-severe"]);
        assert_eq!(a.advisories.len(), 1);
        assert_eq!(a.advisories[0].to_string(), "[WARNING] isolate");
        assert!(a.band.is_none());
    }

    #[test]
    fn test_policy_validation() {
        assert!(bands().validate().is_ok());
        assert!(ScoringPolicy::default().with_base(10).with_ceiling(5).validate().is_err());
        assert!(bands().with_band(Band::new(30, "dup")).validate().is_err());
    }

    #[test]
    fn test_outcome_fingerprint_is_stable() {
        let outcome = Outcome {
            rule_set: "demo".to_string(),
            score: 80,
            band: None,
            advisories: vec![Advisory {
                tag: "warning".to_string(),
                message: "isolate".to_string(),
            }],
            conclusions: vec![],
            facts: vec![],
            derivations: vec![],
            passes: 1,
        };
        let a = outcome.fingerprint().unwrap();
        assert_eq!(a, outcome.clone().fingerprint().unwrap());
        assert_eq!(a.len(), 64);

        let mut other = outcome.clone();
        other.score = 81;
        assert_ne!(a, other.fingerprint().unwrap());
        assert!(outcome.has_tag("WARNING"));
        assert!(!outcome.has_tag("critical"));
    }
}
