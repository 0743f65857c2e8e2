//! Sequential pipeline execution over task records.

use super::{Pipeline, RetryDecision};
use crate::context::Context;
use crate::core::{StageResult, TaskError, TaskId, TaskRecord};
use crate::errors::{DumpflowError, PipelineFailure, StageError, StoreError};
use crate::events::{kinds, EventSink, NoOpEventSink};
use crate::stages::{Stage, TaskHandle};
use crate::store::{TaskStore, TaskUpdate};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// Runs pipelines on a bounded pool of worker slots.
///
/// Slots are shared by every run; within one run stages never overlap.
#[derive(Clone)]
pub struct PipelineExecutor {
    store: Arc<dyn TaskStore>,
    workers: Arc<Semaphore>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("available_workers", &self.workers.available_permits())
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Creates an executor with `concurrency` worker slots (at least one).
    pub fn new(store: Arc<dyn TaskStore>, concurrency: usize) -> Self {
        Self {
            store,
            workers: Arc::new(Semaphore::new(concurrency.max(1))),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the sink that receives lifecycle events.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the task store runs are recorded in.
    #[must_use]
    pub fn store(&self) -> Arc<dyn TaskStore> {
        Arc::clone(&self.store)
    }

    /// Records one pending task per stage and starts the run.
    ///
    /// Returns as soon as the records exist; the run continues in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns an error if the task store rejects a record.
    pub async fn submit(&self, pipeline: Arc<Pipeline>, ctx: Context) -> Result<Submission, DumpflowError> {
        let mut stage_ids = Vec::with_capacity(pipeline.len());
        let mut parent = None;
        for stage in pipeline.stages() {
            let id = TaskId::new();
            self.store.insert(TaskRecord::pending(id, stage.name(), parent)).await?;
            stage_ids.push(id);
            parent = Some(id);
        }

        let (Some(&parent_id), Some(&task_id)) = (stage_ids.first(), stage_ids.last()) else {
            return Err(DumpflowError::Internal(format!("pipeline '{}' has no stages", pipeline.name())));
        };

        self.events
            .emit(
                kinds::PIPELINE_SUBMITTED,
                Some(json!({
                    "pipeline": pipeline.name(),
                    "task_id": task_id,
                    "parent_id": parent_id,
                    "stages": pipeline.stage_names(),
                })),
            )
            .await;
        info!(pipeline = pipeline.name(), %task_id, %parent_id, "Pipeline submitted");

        let span = info_span!("pipeline", pipeline = pipeline.name(), %task_id);
        let run = Run {
            pipeline,
            stage_ids: stage_ids.clone(),
            store: Arc::clone(&self.store),
            workers: Arc::clone(&self.workers),
            events: Arc::clone(&self.events),
        };
        let handle = tokio::spawn(run.drive(ctx).instrument(span));

        Ok(Submission {
            task_id,
            parent_id,
            stage_ids,
            handle,
        })
    }

    /// Submits a run and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns [`DumpflowError::Pipeline`] if a stage failed.
    pub async fn run(&self, pipeline: Arc<Pipeline>, ctx: Context) -> Result<Context, DumpflowError> {
        self.submit(pipeline, ctx).await?.wait().await
    }
}

/// A submitted run.
///
/// Dropping it detaches the run; it keeps going in the background.
#[derive(Debug)]
pub struct Submission {
    task_id: TaskId,
    parent_id: TaskId,
    stage_ids: Vec<TaskId>,
    handle: JoinHandle<Result<Context, DumpflowError>>,
}

impl Submission {
    /// Task of the last stage; identifies the run.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Task of the first stage.
    #[must_use]
    pub fn parent_id(&self) -> TaskId {
        self.parent_id
    }

    /// Tasks of every stage, in execution order.
    #[must_use]
    pub fn stage_ids(&self) -> &[TaskId] {
        &self.stage_ids
    }

    /// Waits for the run to finish and returns the final context.
    ///
    /// # Errors
    ///
    /// Returns [`DumpflowError::Pipeline`] if a stage failed.
    pub async fn wait(self) -> Result<Context, DumpflowError> {
        self.handle
            .await
            .map_err(|e| DumpflowError::Internal(format!("pipeline driver failed: {e}")))?
    }
}

struct Run {
    pipeline: Arc<Pipeline>,
    stage_ids: Vec<TaskId>,
    store: Arc<dyn TaskStore>,
    workers: Arc<Semaphore>,
    events: Arc<dyn EventSink>,
}

impl Run {
    async fn drive(self, mut ctx: Context) -> Result<Context, DumpflowError> {
        let started = Instant::now();
        for (stage, &task_id) in self.pipeline.stages().iter().zip(&self.stage_ids) {
            let span = info_span!("stage", stage = stage.name(), %task_id);
            let outcome = self.run_stage(stage, task_id, &ctx).instrument(span).await;
            match outcome {
                Ok(next) => ctx = next,
                Err(error) => {
                    let failure = PipelineFailure {
                        pipeline: self.pipeline.name().to_string(),
                        stage: stage.name().to_string(),
                        task_id,
                        error,
                        context: Box::new(ctx),
                    };
                    self.fail(&failure).await;
                    return Err(failure.into());
                }
            }
        }

        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(pipeline = self.pipeline.name(), duration_ms, "Pipeline completed");
        self.events
            .emit(
                kinds::PIPELINE_COMPLETED,
                Some(json!({"pipeline": self.pipeline.name(), "duration_ms": duration_ms})),
            )
            .await;
        Ok(ctx)
    }

    /// Runs one stage to a terminal task state, retrying per its policy.
    async fn run_stage(&self, stage: &Arc<dyn Stage>, task_id: TaskId, ctx: &Context) -> Result<Context, StageError> {
        let policy = stage.policy();
        let handle = TaskHandle::new(task_id, stage.name(), Arc::clone(&self.store));
        let mut attempt = 0;

        loop {
            attempt += 1;
            let started_at = Utc::now();
            let outcome = match self.workers.acquire().await {
                Ok(_permit) => {
                    self.store.update(task_id, TaskUpdate::Started).await?;
                    self.events.try_emit(
                        kinds::STAGE_STARTED,
                        Some(json!({"stage": stage.name(), "task_id": task_id, "attempt": attempt})),
                    );
                    attempt_once(stage, &handle, ctx.clone(), policy.time_limit).await
                }
                Err(_) => Err(StageError::connectivity("worker pool is closed")),
            };

            let error = match outcome {
                Ok(next) => return self.complete(stage.name(), task_id, started_at, next).await,
                Err(error) => error,
            };

            match policy.retry.decide(attempt, &error) {
                RetryDecision::Retry(delay) => {
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    warn!(attempt, delay_ms, error = %error, "Stage failed, retrying");
                    self.store
                        .update(
                            task_id,
                            TaskUpdate::Retry {
                                attempt,
                                error: TaskError::from(&error),
                            },
                        )
                        .await?;
                    self.events.try_emit(
                        kinds::STAGE_RETRYING,
                        Some(json!({"stage": stage.name(), "attempt": attempt, "error": error.to_string()})),
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp | RetryDecision::NotRetryable => {
                    if let Err(err) = self.store.update(task_id, TaskUpdate::Failure(TaskError::from(&error))).await {
                        warn!(error = %err, "Could not record stage failure");
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Persists the stage result and reads it back as the next input.
    async fn complete(
        &self,
        stage: &str,
        task_id: TaskId,
        started_at: DateTime<Utc>,
        ctx: Context,
    ) -> Result<Context, StageError> {
        let result = StageResult::completed(stage, started_at, ctx);
        let duration_ms = result.duration_ms();
        let value = result
            .to_value()
            .map_err(|e| StageError::failure(format!("stage result is not serializable: {e}")))?;
        self.store.update(task_id, TaskUpdate::Success(value)).await?;

        let record = self.store.get(task_id).await?.ok_or(StoreError::UnknownTask(task_id))?;
        let stored = record
            .result
            .ok_or_else(|| StageError::connectivity(format!("task {task_id} has no stored result")))?;
        let parsed = StageResult::from_value(&stored).map_err(|e| StageError::failure(e.to_string()))?;

        info!(duration_ms, "Stage completed");
        self.events.try_emit(
            kinds::STAGE_COMPLETED,
            Some(json!({"stage": stage, "task_id": task_id, "duration_ms": duration_ms})),
        );
        Ok(parsed.context)
    }

    async fn fail(&self, failure: &PipelineFailure) {
        self.events
            .emit(
                kinds::STAGE_FAILED,
                Some(json!({
                    "stage": failure.stage,
                    "task_id": failure.task_id,
                    "kind": failure.error.kind(),
                    "error": failure.error.to_string(),
                })),
            )
            .await;

        if let Some(handler) = self.pipeline.failure_handler() {
            let handler = Arc::clone(handler);
            let detail = failure.clone();
            let outcome = tokio::spawn(async move { handler.on_failure(&detail.context, &detail).await }).await;
            if let Err(err) = &outcome {
                error!(error = %err, "Failure handler panicked");
            }
            self.events
                .emit(
                    kinds::PIPELINE_CLEANUP,
                    Some(json!({"stage": failure.stage, "completed": outcome.is_ok()})),
                )
                .await;
        }

        self.events
            .emit(
                kinds::PIPELINE_FAILED,
                Some(json!({"pipeline": failure.pipeline, "stage": failure.stage})),
            )
            .await;
    }
}

/// How long a timed-out attempt may take to honor its stop signal.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Runs a single attempt on its own task, bounded by the time limit.
///
/// On timeout the attempt's stop signal is raised and the attempt is
/// awaited for up to [`STOP_GRACE`], so blocking work has released its
/// files before the failure handler runs.
async fn attempt_once(
    stage: &Arc<dyn Stage>,
    handle: &TaskHandle,
    ctx: Context,
    limit: Option<Duration>,
) -> Result<Context, StageError> {
    let stage = Arc::clone(stage);
    let handle = handle.for_attempt();
    let cancel = handle.cancellation().clone();
    let mut work = tokio::spawn(async move { stage.execute(ctx, &handle).await });

    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, &mut work).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                if tokio::time::timeout(STOP_GRACE, &mut work).await.is_err() {
                    warn!(grace_secs = STOP_GRACE.as_secs(), "Stage ignored its stop signal, aborting");
                    work.abort();
                }
                return Err(StageError::Timeout {
                    limit_secs: limit.as_secs(),
                });
            }
        },
        None => work.await,
    };

    joined.map_err(|e| StageError::failure(format!("stage task failed: {e}")))?
}
