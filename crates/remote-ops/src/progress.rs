//! Multi-step progress as a finite event stream
//!
//! Long jobs (e.g. generating a list with an AI model, then saving each
//! item) run their steps through the retry controller one after another and
//! report progress as discrete events. The stream owns its steps, so it
//! cannot be restarted once consumed.

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::config::ExecutionConfig;
use crate::execution::{ExecutionOutcome, FailureDetail, OperationFn, RetryController};

/// One step of a job
pub struct Step<T> {
    pub label: String,
    pub operation: OperationFn<T>,
}

impl<T> Step<T> {
    pub fn new(label: impl Into<String>, operation: OperationFn<T>) -> Self {
        Self {
            label: label.into(),
            operation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent<T> {
    Started {
        total: usize,
    },
    StepSucceeded {
        index: usize,
        label: String,
        value: T,
        attempts: u32,
    },
    StepFailed {
        index: usize,
        label: String,
        detail: FailureDetail,
    },
    Finished {
        completed: usize,
        total: usize,
    },
}

impl<T> ProgressEvent<T> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Finished { .. })
    }
}

/// Run `steps` in order, stopping at the first step that fails
pub fn run_steps<T>(
    controller: RetryController,
    config: ExecutionConfig,
    steps: Vec<Step<T>>,
) -> impl Stream<Item = ProgressEvent<T>>
where
    T: Send + 'static,
{
    async_stream::stream! {
        let total = steps.len();
        let mut completed = 0;
        yield ProgressEvent::Started { total };

        for (index, step) in steps.into_iter().enumerate() {
            let operation = step.operation;
            let outcome = controller.execute(|| operation(), &config).await;
            match outcome {
                ExecutionOutcome::Succeeded { value, attempts } => {
                    completed += 1;
                    yield ProgressEvent::StepSucceeded { index, label: step.label, value, attempts };
                }
                ExecutionOutcome::Failed(detail) => {
                    tracing::debug!(index, label = %step.label, "step failed, stopping job");
                    yield ProgressEvent::StepFailed { index, label: step.label, detail };
                    break;
                }
                ExecutionOutcome::Cancelled { .. } => break,
            }
        }

        yield ProgressEvent::Finished { completed, total };
    }
}
