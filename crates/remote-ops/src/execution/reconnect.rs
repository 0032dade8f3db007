//! Reconnect-triggered retry coordinator
//!
//! Watches the prober's status stream. On each offline -> online transition
//! it re-drives every registered container that is sitting in a network
//! error, once per transition. Containers that are loading, succeeded or
//! failed for any other reason are left alone.
//!
//! The registry only holds weak references: a container torn down with its
//! call-site is never re-driven, and its entry is pruned on the next update.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::state::{OperationContainer, OperationFn};
use crate::network::{ConnectivityProber, ConnectivityStatus};

/// Type-erased view of a registered container
trait Redrivable: Send + Sync {
    fn label(&self) -> &str;
    fn is_alive(&self) -> bool;
    fn eligible(&self) -> bool;
    fn redrive(&self) -> BoxFuture<'static, ()>;
}

struct Registration<T> {
    label: String,
    container: Weak<OperationContainer<T>>,
    operation: OperationFn<T>,
}

impl<T> Redrivable for Registration<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn label(&self) -> &str {
        &self.label
    }

    fn is_alive(&self) -> bool {
        self.container.strong_count() > 0
    }

    fn eligible(&self) -> bool {
        self.container.upgrade().is_some_and(|container| {
            let state = container.state();
            !state.is_loading() && state.is_network_error()
        })
    }

    fn redrive(&self) -> BoxFuture<'static, ()> {
        let container = self.container.clone();
        let operation = Arc::clone(&self.operation);
        async move {
            if let Some(container) = container.upgrade() {
                container.execute_shared(operation).await;
            }
        }
        .boxed()
    }
}

/// Registration handle returned by [`ReconnectCoordinator::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(Uuid);

#[derive(Clone)]
pub struct ReconnectCoordinator {
    prober: ConnectivityProber,
    registrations: Arc<Mutex<HashMap<RegistrationId, Arc<dyn Redrivable>>>>,
    last_connected: Arc<Mutex<bool>>,
}

impl std::fmt::Debug for ReconnectCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectCoordinator")
            .field("registered", &self.registrations.lock().len())
            .field("last_connected", &*self.last_connected.lock())
            .finish()
    }
}

impl ReconnectCoordinator {
    pub fn new(prober: ConnectivityProber) -> Self {
        let last_connected = prober.is_connected();
        Self {
            prober,
            registrations: Arc::new(Mutex::new(HashMap::new())),
            last_connected: Arc::new(Mutex::new(last_connected)),
        }
    }

    /// Register a container with the closure that populates it. The
    /// registration does not keep the container alive.
    pub fn register<T>(
        &self,
        container: &Arc<OperationContainer<T>>,
        operation: OperationFn<T>,
    ) -> RegistrationId
    where
        T: Clone + Send + Sync + 'static,
    {
        let id = RegistrationId(Uuid::new_v4());
        let registration = Registration {
            label: container.label().to_string(),
            container: Arc::downgrade(container),
            operation,
        };
        self.registrations.lock().insert(id, Arc::new(registration));
        id
    }

    pub fn unregister(&self, id: RegistrationId) -> bool {
        self.registrations.lock().remove(&id).is_some()
    }

    /// Live registrations; entries whose container is gone are dropped first
    pub fn registered_count(&self) -> usize {
        self.prune();
        self.registrations.lock().len()
    }

    fn prune(&self) {
        self.registrations.lock().retain(|_, registration| {
            let alive = registration.is_alive();
            if !alive {
                tracing::debug!(label = registration.label(), "container dropped, unregistering");
            }
            alive
        });
    }

    /// Feed one status update. On an offline -> online transition, spawns a
    /// re-drive per eligible container and returns their handles.
    pub fn handle_status(&self, status: &ConnectivityStatus) -> Vec<JoinHandle<()>> {
        let reconnected = {
            let mut last = self.last_connected.lock();
            let reconnected = !*last && status.is_connected;
            *last = status.is_connected;
            reconnected
        };
        self.prune();
        if !reconnected {
            return Vec::new();
        }

        let eligible: Vec<Arc<dyn Redrivable>> = self
            .registrations
            .lock()
            .values()
            .filter(|registration| registration.eligible())
            .cloned()
            .collect();

        tracing::info!(count = eligible.len(), "connectivity restored, re-driving failed operations");

        eligible
            .into_iter()
            .map(|registration| {
                tracing::debug!(label = registration.label(), "re-driving after reconnect");
                tokio::spawn(registration.redrive())
            })
            .collect()
    }

    /// Follow the prober's status stream until `cancel_token` fires
    pub fn spawn(&self, cancel_token: CancellationToken) -> JoinHandle<()> {
        let mut events = self.prober.subscribe();
        let coordinator = self.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(status) => {
                            coordinator.handle_status(&status);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "reconnect coordinator lagged behind status stream");
                            // re-sync from the current snapshot
                            coordinator.handle_status(&coordinator.prober.status());
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!("reconnect coordinator stopped");
        })
    }
}
