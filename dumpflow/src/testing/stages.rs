//! Stages for executor tests.

use crate::context::Context;
use crate::errors::StageError;
use crate::stages::{Stage, StagePolicy, TaskHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Appends its own name to `files` and records what it received.
///
/// Can be scripted to fail its first calls.
#[derive(Debug)]
pub struct ScriptedStage {
    name: String,
    policy: StagePolicy,
    failures: Mutex<VecDeque<StageError>>,
    inputs: Mutex<Vec<Vec<PathBuf>>>,
}

impl ScriptedStage {
    /// A stage that always succeeds.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: StagePolicy::default(),
            failures: Mutex::new(VecDeque::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Fails the next calls with these errors, one per call.
    #[must_use]
    pub fn failing_first(self, errors: impl IntoIterator<Item = StageError>) -> Self {
        self.failures.lock().extend(errors);
        self
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: StagePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }

    /// The `files` list of every received context.
    #[must_use]
    pub fn inputs(&self) -> Vec<Vec<PathBuf>> {
        self.inputs.lock().clone()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> StagePolicy {
        self.policy
    }

    async fn execute(&self, mut ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        self.inputs.lock().push(ctx.files().as_slice().to_vec());
        if let Some(error) = self.failures.lock().pop_front() {
            return Err(error);
        }
        ctx.push_file(&self.name);
        Ok(ctx)
    }
}

/// Always fails with the same error.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    error: StageError,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(name: impl Into<String>, error: StageError) -> Self {
        Self {
            name: name.into(),
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: Context, _task: &TaskHandle) -> Result<Context, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

const SLOW_TICK: Duration = Duration::from_millis(10);

/// Sleeps, then passes the context through.
///
/// Stops early once its attempt is cancelled.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
    policy: StagePolicy,
}

impl SlowStage {
    /// Creates the stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
            policy: StagePolicy::default(),
        }
    }

    /// Sets the policy.
    #[must_use]
    pub fn with_policy(mut self, policy: StagePolicy) -> Self {
        self.policy = policy;
        self
    }
}

#[async_trait]
impl Stage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> StagePolicy {
        self.policy
    }

    async fn execute(&self, ctx: Context, task: &TaskHandle) -> Result<Context, StageError> {
        let until = tokio::time::Instant::now() + self.delay;
        while tokio::time::Instant::now() < until {
            if task.cancellation().is_cancelled() {
                return Err(StageError::failure(format!("{} stopped", self.name)));
            }
            tokio::time::sleep(SLOW_TICK.min(self.delay)).await;
        }
        Ok(ctx)
    }
}
