use std::sync::Arc;
use std::thread;

use triage_engine::catalog::{respiratory_risk, RISK_QUESTIONS};
use triage_engine::{Answers, RuntimeConfig, TriageRuntime};

fn answers_for(seed: usize) -> Answers {
    let mut answers = Answers::new().set("age", i64::try_from(40 + seed % 40).unwrap());
    for (i, key) in RISK_QUESTIONS.iter().enumerate() {
        if (seed >> i) & 1 == 1 {
            answers.insert(*key, true);
        }
    }
    answers
}

#[test]
fn runtime_matches_direct_sessions() {
    let kb = Arc::new(respiratory_risk().unwrap());
    let runtime = TriageRuntime::shared(
        Arc::clone(&kb),
        &RuntimeConfig {
            workers: 4,
            queue_capacity: 64,
        },
    )
    .unwrap();

    let handles: Vec<_> = (0..32)
        .map(|seed| (seed, runtime.submit(answers_for(seed)).unwrap()))
        .collect();

    for (seed, handle) in handles {
        let outcome = handle.join().unwrap();
        let direct = kb.begin_session(&answers_for(seed)).unwrap();
        assert_eq!(outcome, direct, "seed {seed}");
    }
}

#[test]
fn runtime_is_shared_across_threads() {
    let runtime = Arc::new(TriageRuntime::new(respiratory_risk().unwrap(), &RuntimeConfig::default()).unwrap());

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                let outcome = runtime
                    .run(Answers::new().set("age", 30).yes("breathing"))
                    .unwrap();
                outcome.fingerprint().unwrap()
            })
        })
        .collect();

    let prints: Vec<String> = threads.into_iter().map(|t| t.join().unwrap()).collect();
    assert!(prints.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn runtime_surfaces_session_errors() {
    let runtime = TriageRuntime::new(respiratory_risk().unwrap(), &RuntimeConfig::default()).unwrap();
    let err = runtime.run(Answers::new().yes("fever")).unwrap_err();
    assert!(err.is_validation());
    assert!(!err.is_retryable());
    assert_eq!(runtime.knowledge_base().name(), "respiratory-risk");
}
