use triage_engine::catalog::respiratory_risk;
use triage_engine::{Answers, KnowledgeBase, TriageError, ValidationError};

fn risk() -> KnowledgeBase {
    respiratory_risk().unwrap()
}

fn adult() -> Answers {
    Answers::new().set("name", "Ada").set("age", 30)
}

#[test]
fn risk_breathing_is_an_emergency() {
    let outcome = risk().begin_session(&adult().yes("breathing")).unwrap();

    assert!(outcome.has_tag("critical"));
    assert_eq!(outcome.score, 100);
    assert_eq!(outcome.label(), Some("HIGH RISK / EMERGENCY"));
    assert_eq!(
        outcome.advisories[0].message,
        "CRITICAL: Difficulty breathing is a severe symptom."
    );
}

#[test]
fn risk_classic_covid_scores_80_without_critical() {
    let outcome = risk()
        .begin_session(&adult().yes("fever").yes("cough").yes("taste_smell"))
        .unwrap();

    assert!(outcome.has_tag("warning"));
    assert!(!outcome.has_tag("critical"));
    assert_eq!(outcome.score, 80);
    assert_eq!(outcome.label(), Some("MODERATE to HIGH RISK"));
    assert_eq!(outcome.advisories.len(), 1);
}

#[test]
fn risk_nothing_answered_yes_is_minimum() {
    let outcome = risk().begin_session(&adult()).unwrap();
    assert_eq!(outcome.score, 0);
    assert!(outcome.advisories.is_empty());
    assert_eq!(outcome.label(), Some("LOW RISK"));
    assert_eq!(outcome.passes, 0);
}

#[test]
fn risk_factors_each_add_twenty() {
    let kb = risk();

    let older = kb
        .begin_session(&Answers::new().set("age", 65))
        .unwrap();
    assert_eq!(older.score, 20);
    assert!(older.has_tag("risk"));

    let both = kb
        .begin_session(&Answers::new().set("age", 65).yes("pre_existing"))
        .unwrap();
    assert_eq!(both.score, 40);
    assert_eq!(both.label(), Some("LOW to MODERATE RISK"));

    let boundary = kb.begin_session(&Answers::new().set("age", 60)).unwrap();
    assert_eq!(boundary.score, 20);
    let younger = kb.begin_session(&Answers::new().set("age", 59)).unwrap();
    assert_eq!(younger.score, 0);
}

#[test]
fn risk_levels_take_the_maximum_then_add_factors() {
    let outcome = risk()
        .begin_session(&Answers::new().set("age", 70).yes("contact").yes("fever").yes("body_ache"))
        .unwrap();
    // contact 50 and flu 30 fold to 50; age adds 20.
    assert_eq!(outcome.score, 70);
    assert_eq!(outcome.label(), Some("MODERATE to HIGH RISK"));
    let tags: Vec<&str> = outcome.advisories.iter().map(|a| a.tag.as_str()).collect();
    assert_eq!(tags, vec!["risk", "warning", "info"]);
}

#[test]
fn risk_score_is_capped() {
    let outcome = risk()
        .begin_session(&Answers::new().set("age", 80).yes("breathing").yes("pre_existing"))
        .unwrap();
    assert_eq!(outcome.score, 100);
}

#[test]
fn risk_age_is_required_and_numeric() {
    let kb = risk();

    let missing = kb.begin_session(&Answers::new().yes("fever")).unwrap_err();
    assert!(matches!(
        missing,
        TriageError::Validation(ValidationError::MissingAnswer { ref key }) if key == "age"
    ));

    let invalid = kb
        .begin_session(&Answers::new().set("age", "sixty"))
        .unwrap_err();
    assert!(invalid.is_validation());
    assert!(matches!(
        invalid,
        TriageError::Validation(ValidationError::InvalidAnswer { ref key, .. }) if key == "age"
    ));

    let text = kb.begin_session(&Answers::new().set("age", " 61 ")).unwrap();
    assert_eq!(text.score, 20);
}

#[test]
fn risk_blank_name_defaults_to_patient() {
    let outcome = risk()
        .begin_session(&Answers::new().set("name", "  ").set("age", 40))
        .unwrap();
    let patient = outcome
        .facts
        .iter()
        .find(|e| e.fact.relation == "patient")
        .unwrap();
    assert_eq!(patient.fact.value(0).and_then(|v| v.as_text()), Some("Patient"));
}

#[test]
fn risk_outcome_fingerprint_is_stable() {
    let kb = risk();
    let answers = adult().yes("fever").yes("cough").yes("taste_smell").yes("contact");
    let a = kb.begin_session(&answers).unwrap();
    let b = kb.begin_session(&answers).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    assert_eq!(a.fingerprint().unwrap().len(), 64);
}
