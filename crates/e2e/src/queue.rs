//! Command queue: strict serial execution of a case's steps
//!
//! Each step is awaited before the next one starts. The first hard failure
//! ends the queue; a tolerated failure becomes the step's output; an absent
//! precondition skips the step and everything after it.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::context::ExecutionContext;
use crate::error::{CadenceError, CadenceResult};
use crate::report::{StepOutcome, StepResult};
use crate::spec::Step;

#[derive(Debug)]
pub enum QueueVerdict {
    Completed,
    Failed(CadenceError),
    /// Names the precondition that was absent
    Skipped(String),
}

#[derive(Debug)]
pub struct QueueOutcome {
    pub steps: Vec<StepResult>,
    pub verdict: QueueVerdict,
}

impl QueueOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self.verdict, QueueVerdict::Completed)
    }

    /// Collapse into a result, turning a skip back into `PreconditionAbsent`
    /// so an enclosing queue skips too.
    pub fn into_result(self) -> CadenceResult<Vec<StepResult>> {
        match self.verdict {
            QueueVerdict::Completed => Ok(self.steps),
            QueueVerdict::Failed(err) => Err(err),
            QueueVerdict::Skipped(key) => Err(CadenceError::PreconditionAbsent(key)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    steps: Vec<Step>,
    deadline: Option<Duration>,
}

impl CommandQueue {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps, deadline: None }
    }

    /// Wall clock budget for the whole drain.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn enqueue(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Drain the queue against `ctx`.
    pub async fn run(&self, ctx: &mut ExecutionContext) -> QueueOutcome {
        let started = Instant::now();
        let cancel = ctx.cancel_token().clone();
        let budget = self.deadline;
        let deadline = async move {
            match budget {
                Some(budget) => tokio::time::sleep_until(started + budget).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut results = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let label = step.label();
            let step_start = Instant::now();
            debug!(step = %label, "executing step");

            let result = tokio::select! {
                r = ctx.execute(step) => r,
                _ = cancel.cancelled() => Err(CadenceError::Cancelled(format!("{} interrupted", label))),
                _ = &mut deadline => {
                    cancel.cancel();
                    Err(CadenceError::TimeoutExceeded {
                        what: format!("case to finish (during {})", label),
                        elapsed_ms: started.elapsed().as_millis() as u64,
                        attempts: 0,
                        last_observed: serde_json::Value::Null,
                    })
                }
            };
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    debug!(step = %label, duration_ms, "step passed");
                    results.push(StepResult::passed(label, duration_ms, output));
                }
                Err(err) if err.is_skip() => {
                    info!(step = %label, "skipped: {}", err);
                    let key = match &err {
                        CadenceError::PreconditionAbsent(key) => key.clone(),
                        other => other.to_string(),
                    };
                    results.push(StepResult::from_error(label, duration_ms, StepOutcome::Skipped, &err));
                    return QueueOutcome {
                        steps: results,
                        verdict: QueueVerdict::Skipped(key),
                    };
                }
                Err(err) if !step.fail_on_error && !matches!(err, CadenceError::Cancelled(_)) && !cancel.is_cancelled() => {
                    info!(step = %label, "tolerated failure: {}", err);
                    results.push(StepResult::from_error(label, duration_ms, StepOutcome::Tolerated, &err));
                }
                Err(err) => {
                    debug!(step = %label, "step failed: {}", err);
                    results.push(StepResult::from_error(label, duration_ms, StepOutcome::Failed, &err));
                    return QueueOutcome {
                        steps: results,
                        verdict: QueueVerdict::Failed(err),
                    };
                }
            }
        }

        QueueOutcome {
            steps: results,
            verdict: QueueVerdict::Completed,
        }
    }
}
