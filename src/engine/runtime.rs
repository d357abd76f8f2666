//! Concurrent session runtime.
//!
//! Sessions are single-threaded, but independent sessions over one knowledge
//! base can run in parallel. This module provides a small bounded
//! thread-based runtime: requests queue on a crossbeam channel and a fixed
//! set of workers each run one fresh session per request.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::engine::KnowledgeBase;
use crate::error::{ExecutionError, TriageError, TriageResult};
use crate::intake::Answers;
use crate::scoring::Outcome;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued requests.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 1024,
        }
    }
}

enum Job {
    Run {
        answers: Answers,
        reply: Sender<TriageResult<Outcome>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(workers: usize, queue_capacity: usize, kb: &Arc<KnowledgeBase>) -> Result<Self, ExecutionError> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            tx,
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let kb = Arc::clone(kb);
            let spawned = thread::Builder::new()
                .name(format!("triage-{}-{idx}", kb.name()))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Job::Run { answers, reply }) => {
                            let result = kb.begin_session(&answers);
                            let _ = reply.send(result);
                        }
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Job::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                });
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(ExecutionError::WorkerSpawn {
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(pool)
    }

    fn try_submit(&self, job: Job) -> Result<(), ExecutionError> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(ExecutionError::Disconnected),
        }
    }

    fn shutdown(self) {
        // Workers drain queued jobs, then see the closed channel and exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Handle to a submitted session.
#[derive(Debug)]
pub struct SessionHandle {
    rx: Receiver<TriageResult<Outcome>>,
}

impl SessionHandle {
    /// Waits for the session to finish.
    ///
    /// # Errors
    /// The session's own error, or `Disconnected` if its worker went away.
    pub fn join(self) -> TriageResult<Outcome> {
        self.rx
            .recv()
            .map_err(|_| TriageError::Execution(ExecutionError::Disconnected))?
    }

    /// Waits for the session to finish, up to `timeout`.
    ///
    /// # Errors
    /// `Timeout` if the session has not finished in time, otherwise as
    /// [`SessionHandle::join`].
    pub fn join_timeout(self, timeout: Duration) -> TriageResult<Outcome> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => TriageError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => TriageError::Execution(ExecutionError::Disconnected),
        })?
    }
}

/// Runs sessions over one shared knowledge base on a bounded worker pool.
pub struct TriageRuntime {
    kb: Arc<KnowledgeBase>,
    pool: Option<WorkerPool>,
}

impl TriageRuntime {
    /// Starts the worker threads.
    ///
    /// # Errors
    /// `WorkerSpawn` if a worker thread cannot be created.
    pub fn new(kb: KnowledgeBase, config: &RuntimeConfig) -> Result<Self, ExecutionError> {
        Self::shared(Arc::new(kb), config)
    }

    /// Starts the worker threads over an already shared knowledge base.
    ///
    /// # Errors
    /// `WorkerSpawn` if a worker thread cannot be created.
    pub fn shared(kb: Arc<KnowledgeBase>, config: &RuntimeConfig) -> Result<Self, ExecutionError> {
        let pool = WorkerPool::start(config.workers, config.queue_capacity, &kb)?;
        tracing::debug!(
            rule_set = %kb.name(),
            workers = pool.workers.len(),
            queue_capacity = pool.queue_capacity,
            "runtime started"
        );
        Ok(Self { kb, pool: Some(pool) })
    }

    fn pool(&self) -> Result<&WorkerPool, ExecutionError> {
        self.pool.as_ref().ok_or(ExecutionError::Disconnected)
    }

    /// Queues a session without waiting for it.
    ///
    /// # Errors
    /// `QueueFull` if the queue is saturated; `Disconnected` if the workers
    /// are gone.
    pub fn submit(&self, answers: Answers) -> Result<SessionHandle, ExecutionError> {
        let (tx, rx) = bounded::<TriageResult<Outcome>>(1);
        self.pool()?.try_submit(Job::Run { answers, reply: tx })?;
        Ok(SessionHandle { rx })
    }

    /// Runs a session and waits for its outcome.
    ///
    /// # Errors
    /// As [`TriageRuntime::submit`] and [`SessionHandle::join`].
    pub fn run(&self, answers: Answers) -> TriageResult<Outcome> {
        self.submit(answers)?.join()
    }

    /// The shared knowledge base.
    #[must_use]
    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> Result<Receiver<()>, ExecutionError> {
        let (tx, rx) = bounded::<()>(1);
        self.pool()?.try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for TriageRuntime {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeMapping;
    use crate::pattern::Pattern;
    use crate::rule::{Action, Rule};
    use crate::template::Template;

    fn kb() -> KnowledgeBase {
        KnowledgeBase::builder("rt")
            .template(Template::conclusion("diagnosis"))
            .intake(IntakeMapping::flag("has"))
            .rule(Rule::new("flu", Pattern::symbols("has", ["fever"])).then(Action::symbols("diagnosis", ["flu"])))
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_returns_outcome() {
        let runtime = TriageRuntime::new(kb(), &RuntimeConfig::default()).unwrap();
        let outcome = runtime.run(Answers::new().yes("fever")).unwrap();
        assert_eq!(outcome.conclusions, vec!["flu"]);
    }

    #[test]
    fn test_queue_full_fails_fast() {
        let runtime = TriageRuntime::new(
            kb(),
            &RuntimeConfig {
                workers: 1,
                queue_capacity: 1,
            },
        )
        .unwrap();

        // Occupy the worker, then fill the single queue slot.
        let busy = runtime.submit_sleep(Duration::from_millis(200)).unwrap();
        thread::sleep(Duration::from_millis(50));
        let queued = runtime.submit(Answers::new()).unwrap();

        let err = runtime.submit(Answers::new()).unwrap_err();
        assert_eq!(err, ExecutionError::QueueFull { capacity: 1 });
        assert!(TriageError::from(err).is_retryable());

        busy.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(queued.join_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_join_timeout_reports_timeout() {
        let runtime = TriageRuntime::new(
            kb(),
            &RuntimeConfig {
                workers: 1,
                queue_capacity: 4,
            },
        )
        .unwrap();
        let busy = runtime.submit_sleep(Duration::from_millis(200)).unwrap();
        let handle = runtime.submit(Answers::new()).unwrap();
        let err = handle.join_timeout(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, TriageError::Execution(ExecutionError::Timeout { duration_ms: 10 })));
        busy.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_join_reports_disconnected_when_reply_sender_dropped() {
        let (tx, rx) = bounded::<TriageResult<Outcome>>(1);
        drop(tx);
        let err = SessionHandle { rx }.join().unwrap_err();
        assert_eq!(err, TriageError::Execution(ExecutionError::Disconnected));
    }

    #[test]
    fn test_join_timeout_reports_disconnected_not_timeout() {
        let (tx, rx) = bounded::<TriageResult<Outcome>>(1);
        drop(tx);
        let err = SessionHandle { rx }
            .join_timeout(Duration::from_millis(10))
            .unwrap_err();
        assert_eq!(err, TriageError::Execution(ExecutionError::Disconnected));
    }
}
