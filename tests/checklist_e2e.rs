use triage_engine::catalog::respiratory_checklist;
use triage_engine::{Answers, KnowledgeBase, SessionState};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn checklist() -> KnowledgeBase {
    init_tracing();
    respiratory_checklist().unwrap()
}

#[test]
fn checklist_severe_path() {
    let kb = checklist();
    let outcome = kb
        .begin_session(&Answers::new().yes("shortness-of-breath").yes("chest-pain"))
        .unwrap();

    assert_eq!(outcome.conclusions, vec!["covid-severe"]);
    assert!(outcome.has_tag("critical"));
    assert_eq!(outcome.score, 100);
    assert_eq!(outcome.passes, 1);
}

#[test]
fn checklist_severe_via_persistent_fever_branch() {
    let kb = checklist();
    let outcome = kb
        .begin_session(
            &Answers::new()
                .yes("shortness-of-breath")
                .yes("persistent-high-fever"),
        )
        .unwrap();
    assert!(outcome.has_conclusion("covid-severe"));
}

#[test]
fn checklist_breathing_alone_is_not_severe() {
    let kb = checklist();
    let outcome = kb
        .begin_session(&Answers::new().yes("shortness-of-breath"))
        .unwrap();
    assert_eq!(outcome.conclusions, vec!["unknown"]);
    assert!(outcome.advisories.is_empty());
}

#[test]
fn checklist_suspected_path() {
    let kb = checklist();
    let outcome = kb
        .begin_session(&Answers::new().yes("fever").yes("dry-cough").yes("loss-smell"))
        .unwrap();

    assert_eq!(outcome.conclusions, vec!["covid-suspected"]);
    assert!(outcome.has_tag("warning"));
    assert!(!outcome.has_tag("critical"));
    assert_eq!(outcome.score, 80);
}

#[test]
fn checklist_fallback_reaches_unknown() {
    let kb = checklist();
    let outcome = kb
        .begin_session(&Answers::new().yes("sore-throat").no("fever"))
        .unwrap();

    assert_eq!(outcome.conclusions, vec!["unknown"]);
    assert_eq!(outcome.score, 0);
    assert!(outcome.advisories.is_empty());

    let empty = kb.begin_session(&Answers::new()).unwrap();
    assert_eq!(empty.conclusions, vec!["unknown"]);
}

#[test]
fn checklist_both_diagnoses_suppress_unknown() {
    let kb = checklist();
    let outcome = kb
        .begin_session(
            &Answers::new()
                .yes("shortness-of-breath")
                .yes("chest-pain")
                .yes("fever")
                .yes("dry-cough")
                .yes("loss-smell"),
        )
        .unwrap();

    assert_eq!(outcome.conclusions, vec!["covid-severe", "covid-suspected"]);
    assert!(!outcome.has_conclusion("unknown"));
    assert_eq!(outcome.score, 100);
    let fired: Vec<&str> = outcome.derivations.iter().map(|d| d.rule.as_str()).collect();
    assert_eq!(fired, vec!["covid-severe-rule", "covid-suspected-rule"]);
}

#[test]
fn checklist_reasoning_log_names_rules() {
    let kb = checklist();
    let outcome = kb
        .begin_session(&Answers::new().yes("shortness-of-breath").yes("chest-pain"))
        .unwrap();
    let log = outcome.reasoning_log();
    assert!(log[0].starts_with("pass 1: covid-severe-rule on"));
    assert!(log[0].contains("(diagnosis covid-severe)"));
    assert!(log.iter().any(|l| l.contains("Seek urgent medical care")));
}

#[test]
fn checklist_session_can_be_stepped_and_reset() {
    let kb = checklist();
    let mut session = kb.session();
    session.assert_answers(&Answers::new().yes("fever")).unwrap();
    assert_eq!(session.state(), SessionState::Idle);

    session.run().unwrap();
    assert_eq!(session.state(), SessionState::Quiescent);
    assert!(session.outcome().has_conclusion("unknown"));

    session.reset();
    assert!(session.facts().is_empty());
    session
        .assert_answers(&Answers::new().yes("fever").yes("dry-cough").yes("loss-smell"))
        .unwrap();
    session.run().unwrap();
    let outcome = session.outcome();
    assert_eq!(outcome.conclusions, vec!["covid-suspected"]);
}

#[test]
fn checklist_sessions_do_not_leak_facts() {
    let kb = checklist();
    let first = kb
        .begin_session(&Answers::new().yes("shortness-of-breath").yes("chest-pain"))
        .unwrap();
    let second = kb.begin_session(&Answers::new()).unwrap();
    assert!(first.has_conclusion("covid-severe"));
    assert_eq!(second.conclusions, vec!["unknown"]);
    assert_eq!(second.facts.len(), 1);
}
