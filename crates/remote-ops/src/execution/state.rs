//! Operation state container
//!
//! One container per call-site ("load buckets for user X"). It drives the
//! retry controller and publishes every state transition.
//!
//! Concurrent `execute()` policy is cancel-and-supersede: each call bumps a
//! generation counter and cancels the previous sequence. A sequence only
//! writes its result if its generation is still current, so the state always
//! reflects the most recently issued call regardless of completion order.
//! `reset()` bumps the generation too.

use futures::future::{BoxFuture, FutureExt, TryFutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::error::{Classification, ErrorClass, Failure};
use super::retry::{ExecutionOutcome, RetryController};
use crate::config::ExecutionConfig;

/// Re-invocable operation producing a fresh future per attempt
pub type OperationFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, Failure>> + Send + Sync>;

/// Box a closure into an [`OperationFn`]
pub fn operation_fn<T, E, F, Fut>(operation: F) -> OperationFn<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    E: Into<Failure> + 'static,
    T: 'static,
{
    Arc::new(move || {
        operation()
            .map_err(|error| -> Failure { error.into() })
            .boxed()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Loading => write!(f, "loading"),
            Phase::Success => write!(f, "success"),
            Phase::Error => write!(f, "error"),
        }
    }
}

/// Read model exposed to the call-site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationState<T> {
    pub data: Option<T>,
    pub phase: Phase,
    /// Final failure message. Names the attempt count for network and timeout
    /// failures; the raw failure text for unknown and rejected ones.
    pub error: Option<String>,
    pub classification: Option<Classification>,
}

impl<T> OperationState<T> {
    pub fn idle(data: Option<T>) -> Self {
        Self {
            data,
            phase: Phase::Idle,
            error: None,
            classification: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    /// Error caused by lost connectivity, eligible for reconnect retry
    pub fn is_network_error(&self) -> bool {
        self.phase == Phase::Error
            && self
                .classification
                .as_ref()
                .is_some_and(|c| c.class == ErrorClass::Network)
    }
}

struct Slot<T> {
    state: OperationState<T>,
    generation: u64,
    cancel_token: Option<CancellationToken>,
    last_operation: Option<OperationFn<T>>,
}

pub struct OperationContainer<T> {
    label: String,
    controller: RetryController,
    config: ExecutionConfig,
    seed: Option<T>,
    slot: Mutex<Slot<T>>,
    event_tx: broadcast::Sender<OperationState<T>>,
}

impl<T> fmt::Debug for OperationContainer<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot.lock();
        f.debug_struct("OperationContainer")
            .field("label", &self.label)
            .field("config", &self.config)
            .field("state", &slot.state)
            .field("generation", &slot.generation)
            .finish()
    }
}

impl<T> OperationContainer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        label: impl Into<String>,
        controller: RetryController,
        config: ExecutionConfig,
        seed: Option<T>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            label: label.into(),
            controller,
            config,
            slot: Mutex::new(Slot {
                state: OperationState::idle(seed.clone()),
                generation: 0,
                cancel_token: None,
                last_operation: None,
            }),
            seed,
            event_tx,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Snapshot of the current state
    pub fn state(&self) -> OperationState<T> {
        self.slot.lock().state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperationState<T>> {
        self.event_tx.subscribe()
    }

    /// Run `operation` through the controller. Never fails: returns the value
    /// on success, `None` on failure or when superseded.
    pub async fn execute<E, F, Fut>(&self, operation: F) -> Option<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Failure> + 'static,
    {
        self.execute_shared(operation_fn(operation)).await
    }

    /// [`execute`](Self::execute) for an already boxed operation
    pub async fn execute_shared(&self, operation: OperationFn<T>) -> Option<T> {
        let (generation, cancel_token) = {
            let mut slot = self.slot.lock();
            if let Some(previous) = slot.cancel_token.take() {
                tracing::debug!(label = %self.label, "superseding in-flight execution");
                previous.cancel();
            }
            slot.generation += 1;
            let cancel_token = CancellationToken::new();
            slot.cancel_token = Some(cancel_token.clone());
            slot.last_operation = Some(Arc::clone(&operation));
            slot.state.phase = Phase::Loading;
            slot.state.error = None;
            slot.state.classification = None;
            self.publish(&slot.state);
            (slot.generation, cancel_token)
        };

        let outcome = self
            .controller
            .execute_with_cancel(|| operation(), &self.config, &cancel_token)
            .await;

        let mut slot = self.slot.lock();
        if slot.generation != generation {
            tracing::debug!(label = %self.label, "discarding stale result");
            return None;
        }
        slot.cancel_token = None;

        match outcome {
            ExecutionOutcome::Succeeded { value, .. } => {
                slot.state.data = Some(value.clone());
                slot.state.phase = Phase::Success;
                self.publish(&slot.state);
                Some(value)
            }
            ExecutionOutcome::Failed(detail) => {
                tracing::debug!(
                    label = %self.label,
                    class = %detail.class(),
                    attempts = detail.attempts,
                    "operation ended in error"
                );
                slot.state.phase = Phase::Error;
                slot.state.error = Some(detail.message);
                slot.state.classification = Some(detail.classification);
                self.publish(&slot.state);
                None
            }
            // Only the generation's own token cancels it, and every cancel bumps the generation
            ExecutionOutcome::Cancelled { .. } => None,
        }
    }

    /// Re-run the last executed operation; `None` if nothing ran yet
    pub async fn retry(&self) -> Option<T> {
        let operation = self.slot.lock().last_operation.clone()?;
        self.execute_shared(operation).await
    }

    /// Back to `Idle` with the seeded data; any in-flight result is discarded
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        if let Some(previous) = slot.cancel_token.take() {
            previous.cancel();
        }
        slot.generation += 1;
        slot.state = OperationState::idle(self.seed.clone());
        self.publish(&slot.state);
    }

    /// Overwrite `data` only, e.g. for optimistic local updates
    pub fn set_data(&self, data: Option<T>) {
        let mut slot = self.slot.lock();
        slot.state.data = data;
        self.publish(&slot.state);
    }

    fn publish(&self, state: &OperationState<T>) {
        let _ = self.event_tx.send(state.clone());
    }
}
