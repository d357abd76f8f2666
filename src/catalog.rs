//! Built-in respiratory triage rule sets.
//!
//! Two rule sets ship with the crate: a symptom checklist that reaches a
//! named diagnosis, and a questionnaire that accumulates a risk score. Both
//! are educational demonstrations and not medical advice.

use crate::config::{EngineConfig, FiringMode};
use crate::engine::KnowledgeBase;
use crate::error::ValidationError;
use crate::intake::{IntakeMapping, RecordField};
use crate::pattern::{CompareOp, FieldTest, Pattern};
use crate::rule::{Action, Condition, Rule};
use crate::scoring::{Band, ScoringPolicy};
use crate::template::{FieldSpec, FieldType, ScoreFold, Template};

/// Checklist keys, in questionnaire order.
pub const CHECKLIST_SYMPTOMS: [&str; 8] = [
    "fever",
    "persistent-high-fever",
    "dry-cough",
    "loss-smell",
    "shortness-of-breath",
    "chest-pain",
    "sore-throat",
    "runny-nose",
];

/// Risk questionnaire yes/no keys, in questionnaire order.
pub const RISK_QUESTIONS: [&str; 8] = [
    "fever",
    "cough",
    "breathing",
    "sore_throat",
    "taste_smell",
    "body_ache",
    "pre_existing",
    "contact",
];

fn has(symptom: &str) -> Condition {
    Pattern::symbols("has", [symptom]).into()
}

fn advice(tag: &str, message: &str) -> Action {
    Action::template("advice").set("type", tag).set("message", message)
}

/// Symptom checklist: ticked symptoms become `(has <symptom>)` facts and
/// the rules conclude `covid-severe`, `covid-suspected` or `unknown`.
///
/// Activations are revalidated before firing so the fallback rule, declared
/// last, never fires in the same pass as a diagnosis.
///
/// # Errors
/// Only if the built-in definition is inconsistent.
pub fn respiratory_checklist() -> Result<KnowledgeBase, ValidationError> {
    KnowledgeBase::builder("respiratory-checklist")
        .description("Symptom checklist reaching a named respiratory diagnosis")
        .template(Template::conclusion("diagnosis"))
        .template(Template::message("advice"))
        .template(Template::score("severity", ScoreFold::Max))
        .intake(IntakeMapping::flag("has").with_keys(CHECKLIST_SYMPTOMS))
        .rule(
            Rule::new(
                "covid-severe-rule",
                Condition::all(vec![
                    has("shortness-of-breath"),
                    Condition::any(vec![has("chest-pain"), has("persistent-high-fever")]),
                ]),
            )
            .with_description("shortness-of-breath AND (chest pain OR persistent high fever) -> covid-severe")
            .then(Action::symbols("diagnosis", ["covid-severe"]))
            .then(advice("critical", "Seek urgent medical care or call emergency services."))
            .then(Action::template("severity").set("value", 100)),
        )
        .rule(
            Rule::new(
                "covid-suspected-rule",
                Condition::all(vec![has("fever"), has("dry-cough"), has("loss-smell")]),
            )
            .with_description("fever AND dry cough AND loss of smell/taste -> covid-suspected")
            .then(Action::symbols("diagnosis", ["covid-suspected"]))
            .then(advice(
                "warning",
                "Self-isolate, get tested (PCR/antigen), monitor symptoms, and consult healthcare services.",
            ))
            .then(Action::template("severity").set("value", 80)),
        )
        .rule(
            Rule::new(
                "unknown-rule",
                Condition::not(Pattern::ordered("diagnosis", vec![FieldTest::Any]).into()),
            )
            .with_description("if no rule applies -> unknown")
            .then(Action::symbols("diagnosis", ["unknown"])),
        )
        .config(EngineConfig::default().with_firing_mode(FiringMode::Revalidate))
        .build()
}

fn answered(id: &str, val: &str) -> Condition {
    Pattern::template("symptom")
        .with("id", FieldTest::eq(id))
        .with("val", FieldTest::eq(val))
        .into()
}

/// Risk questionnaire: patient details and yes/no answers become
/// `patient` and `symptom` facts; rules raise a diagnosis level (highest
/// wins) and add risk factors (which accumulate).
///
/// # Errors
/// Only if the built-in definition is inconsistent.
pub fn respiratory_risk() -> Result<KnowledgeBase, ValidationError> {
    KnowledgeBase::builder("respiratory-risk")
        .description("Risk-score questionnaire for COVID-19 and other respiratory illness")
        .template(Template::new(
            "patient",
            vec![
                FieldSpec::new("name", FieldType::String).with_default("Patient"),
                FieldSpec::new("age", FieldType::Int),
            ],
        ))
        .template(Template::new(
            "symptom",
            vec![
                FieldSpec::new("id", FieldType::String),
                FieldSpec::new("val", FieldType::String),
            ],
        ))
        .template(Template::message("advice"))
        .template(Template::score("diagnosis_level", ScoreFold::Max))
        .template(Template::score("risk_adder", ScoreFold::Sum))
        .intake(IntakeMapping::record(
            "patient",
            vec![
                RecordField::new("name", "name").with_default("Patient"),
                RecordField::new("age", "age"),
            ],
        ))
        .intake(
            IntakeMapping::key_value("symptom", "id", "val")
                .with_keys(RISK_QUESTIONS)
                .with_default("no"),
        )
        .rule(
            Rule::new("emergency-check", answered("breathing", "yes"))
                .with_description("difficulty breathing -> critical, level 100")
                .then(advice("critical", "CRITICAL: Difficulty breathing is a severe symptom."))
                .then(Action::template("diagnosis_level").set("value", 100)),
        )
        .rule(
            Rule::new(
                "classic-covid",
                Condition::all(vec![
                    answered("fever", "yes"),
                    answered("cough", "yes"),
                    answered("taste_smell", "yes"),
                ]),
            )
            .with_description("fever AND cough AND loss of taste/smell -> level 80")
            .then(advice(
                "warning",
                "High Probability: Loss of taste/smell with fever is highly specific to COVID-19.",
            ))
            .then(Action::template("diagnosis_level").set("value", 80)),
        )
        .rule(
            Rule::new(
                "risk-age",
                Pattern::template("patient").with("age", FieldTest::bind_where("a", CompareOp::Ge, 60)),
            )
            .with_description("age 60 or over -> +20")
            .then(advice("risk", "Risk Factor: Patient is over 60, requiring extra caution."))
            .then(Action::template("risk_adder").set("value", 20)),
        )
        .rule(
            Rule::new("risk-conditions", answered("pre_existing", "yes"))
                .with_description("pre-existing conditions -> +20")
                .then(advice("risk", "Risk Factor: Pre-existing medical conditions detected."))
                .then(Action::template("risk_adder").set("value", 20)),
        )
        .rule(
            Rule::new("contact-tracing", answered("contact", "yes"))
                .with_description("contact with a confirmed case -> level 50")
                .then(advice("warning", "Exposure: Known contact with a confirmed case."))
                .then(Action::template("diagnosis_level").set("value", 50)),
        )
        .rule(
            Rule::new(
                "flu-check",
                Condition::all(vec![
                    answered("fever", "yes"),
                    answered("body_ache", "yes"),
                    answered("breathing", "no"),
                    answered("taste_smell", "no"),
                ]),
            )
            .with_description("fever AND body ache, no breathing trouble or taste loss -> level 30")
            .then(advice("info", "Analysis: Symptoms resemble seasonal Flu."))
            .then(Action::template("diagnosis_level").set("value", 30)),
        )
        .scoring(
            ScoringPolicy::default()
                .with_ceiling(100)
                .with_band(
                    Band::new(0, "LOW RISK")
                        .with_advice("You appear healthy or have very mild symptoms."),
                )
                .with_band(
                    Band::new(30, "LOW to MODERATE RISK")
                        .with_advice("Likely a Flu or Cold, but monitor your symptoms closely."),
                )
                .with_band(
                    Band::new(60, "MODERATE to HIGH RISK")
                        .with_advice("You have significant symptoms. Isolate and consult a doctor."),
                )
                .with_band(
                    Band::new(100, "HIGH RISK / EMERGENCY")
                        .with_advice("Please go to the nearest hospital immediately."),
                ),
        )
        .build()
}
