//! `MockRunner` — a test double for `ActionRunner`.
//!
//! Useful in unit and integration tests where spawning real processes is
//! either unavailable or irrelevant.  Clones share their call log, so a test
//! can keep one handle and register another.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{ActionError, ActionOutput, ActionRunner, ExecutionContext, ExitStatus};

/// Behaviour injected into `MockRunner` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Exit with the given status and stdout.
    Exit { status: ExitStatus, stdout: String },
    /// Fail to run at all.
    Error(String),
    /// Exit non-zero for the first `n` calls, then succeed.
    FailTimes(usize),
    /// Never finish; only cancellation or a timeout ends it.
    Hang,
    /// Panic inside the runner.
    Panic(String),
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub action: String,
    pub args: String,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// A mock runner that records every call and returns a
/// programmer-specified result.
#[derive(Debug, Clone)]
pub struct MockRunner {
    behaviour: MockBehaviour,
    delay: Duration,
    calls: Arc<Mutex<Vec<MockCall>>>,
    counters: Arc<Counters>,
}

impl MockRunner {
    pub fn new(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Always exits 0.
    pub fn succeeding() -> Self {
        Self::new(MockBehaviour::Exit {
            status: ExitStatus::SUCCESS,
            stdout: String::new(),
        })
    }

    /// Always exits 0 printing `stdout`.
    pub fn printing(stdout: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Exit {
            status: ExitStatus::SUCCESS,
            stdout: stdout.into(),
        })
    }

    /// Always exits with `code`.
    pub fn exiting(code: i32) -> Self {
        Self::new(MockBehaviour::Exit {
            status: ExitStatus::from_code(code),
            stdout: String::new(),
        })
    }

    pub fn erroring(msg: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Error(msg.into()))
    }

    pub fn failing_times(n: usize) -> Self {
        Self::new(MockBehaviour::FailTimes(n))
    }

    pub fn hanging() -> Self {
        Self::new(MockBehaviour::Hang)
    }

    pub fn panicking(msg: impl Into<String>) -> Self {
        Self::new(MockBehaviour::Panic(msg.into()))
    }

    /// Sleep for `delay` before producing the result.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of times this runner has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All calls seen so far, in call order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Names of the actions run, in call order.
    pub fn actions(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.action).collect()
    }

    /// Highest number of concurrent invocations observed.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActionRunner for MockRunner {
    async fn run(&self, args: &str, ctx: &ExecutionContext) -> Result<ActionOutput, ActionError> {
        let call_index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(MockCall {
                action: ctx.action.clone(),
                args: args.to_owned(),
            });
            calls.len()
        };

        let _guard = InFlight::enter(&self.counters);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behaviour {
            MockBehaviour::Exit { status, stdout } => Ok(ActionOutput {
                status: *status,
                stdout: stdout.clone(),
                stderr: String::new(),
            }),
            MockBehaviour::Error(msg) => Err(ActionError::Io(std::io::Error::other(msg.clone()))),
            MockBehaviour::FailTimes(n) if call_index <= *n => {
                Ok(ActionOutput::from_status(ExitStatus::from_code(1)))
            }
            MockBehaviour::FailTimes(_) => Ok(ActionOutput::from_status(ExitStatus::SUCCESS)),
            MockBehaviour::Hang => std::future::pending().await,
            MockBehaviour::Panic(msg) => panic!("{msg}"),
        }
    }
}
