//! Service handle
//!
//! Bundles one prober, one controller and one reconnect coordinator so
//! domain services receive their dependencies explicitly instead of reaching
//! for process-wide singletons.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecutionConfig, ExecutionProfiles, Settings};
use crate::execution::{
    ExecutionOutcome, Failure, OperationContainer, OperationFn, ReconnectCoordinator,
    RegistrationId, RetryController,
};
use crate::network::{ConnectivityProber, ProbeError};

/// Which execution profile a call uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Query,
    Mutation,
    Auth,
    Generation,
}

impl ExecutionProfiles {
    pub fn for_kind(&self, kind: OperationKind) -> &ExecutionConfig {
        match kind {
            OperationKind::Query => &self.query,
            OperationKind::Mutation => &self.mutation,
            OperationKind::Auth => &self.auth,
            OperationKind::Generation => &self.generation,
        }
    }
}

pub struct RemoteOps {
    prober: ConnectivityProber,
    controller: RetryController,
    coordinator: ReconnectCoordinator,
    profiles: ExecutionProfiles,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for RemoteOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOps")
            .field("prober", &self.prober)
            .field("coordinator", &self.coordinator)
            .field("running", &self.is_running())
            .finish()
    }
}

impl RemoteOps {
    /// Build from settings with the HTTP reachability probe
    pub fn from_settings(settings: &Settings) -> Result<Self, ProbeError> {
        let prober = ConnectivityProber::from_config(settings.connectivity.clone())?;
        Ok(Self::new(prober, settings.execution.clone()))
    }

    /// Build around an existing prober, e.g. one with a substituted probe
    pub fn new(prober: ConnectivityProber, profiles: ExecutionProfiles) -> Self {
        let controller = RetryController::new(prober.clone());
        Self::with_controller(controller, profiles)
    }

    pub fn with_controller(controller: RetryController, profiles: ExecutionProfiles) -> Self {
        let prober = controller.prober().clone();
        Self {
            coordinator: ReconnectCoordinator::new(prober.clone()),
            prober,
            controller,
            profiles,
            shutdown: Mutex::new(None),
        }
    }

    pub fn prober(&self) -> &ConnectivityProber {
        &self.prober
    }

    pub fn controller(&self) -> &RetryController {
        &self.controller
    }

    pub fn coordinator(&self) -> &ReconnectCoordinator {
        &self.coordinator
    }

    pub fn profile(&self, kind: OperationKind) -> &ExecutionConfig {
        self.profiles.for_kind(kind)
    }

    /// Start the periodic probe and the reconnect coordinator. Idempotent.
    pub fn start(&self) {
        let mut shutdown = self.shutdown.lock();
        if shutdown.is_some() {
            return;
        }
        let token = CancellationToken::new();
        // subscribe before the first probe so the coordinator sees it
        self.coordinator.spawn(token.child_token());
        self.prober.spawn_monitor(token.child_token());
        tracing::info!(
            interval_ms = self.prober.config().interval_ms,
            "remote operation services started"
        );
        *shutdown = Some(token);
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }

    /// Stop background tasks; in-flight operations are unaffected
    pub fn shutdown(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
            tracing::info!("remote operation services stopped");
        }
    }

    /// New container for one call-site, using the profile for `kind`
    pub fn container<T>(
        &self,
        label: impl Into<String>,
        kind: OperationKind,
        seed: Option<T>,
    ) -> Arc<OperationContainer<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        Arc::new(OperationContainer::new(
            label,
            self.controller.clone(),
            self.profile(kind).clone(),
            seed,
        ))
    }

    /// Register a container for reconnect re-drives
    pub fn watch<T>(
        &self,
        container: &Arc<OperationContainer<T>>,
        operation: OperationFn<T>,
    ) -> RegistrationId
    where
        T: Clone + Send + Sync + 'static,
    {
        self.coordinator.register(container, operation)
    }

    /// One-off execution without a container
    pub async fn run<T, E, F, Fut>(&self, kind: OperationKind, operation: F) -> ExecutionOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<Failure>,
    {
        self.controller.execute(operation, self.profile(kind)).await
    }
}

impl Drop for RemoteOps {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProberConfig;
    use crate::execution::{operation_fn, ErrorClass, Phase};
    use crate::network::ManualProbe;
    use std::time::Duration;

    fn service(probe: &Arc<ManualProbe>) -> RemoteOps {
        let config = ProberConfig {
            interval_ms: 20,
            probe_timeout_ms: 100,
            interface_fallback: false,
            ..Default::default()
        };
        let prober = ConnectivityProber::new(config, probe.clone(), None);
        let mut profiles = ExecutionProfiles::default();
        profiles.query = profiles.query.with_base_retry_delay_ms(5);
        profiles.auth = profiles.auth.with_base_retry_delay_ms(5);
        RemoteOps::new(prober, profiles)
    }

    #[test]
    fn test_profiles_by_kind() {
        let profiles = ExecutionProfiles::default();
        assert_eq!(profiles.for_kind(OperationKind::Mutation).timeout_ms, 15_000);
        assert_eq!(profiles.for_kind(OperationKind::Auth).max_retries, 1);
        assert_eq!(profiles.for_kind(OperationKind::Query).max_retries, 3);
    }

    #[tokio::test]
    async fn test_run_uses_kind_profile() {
        let probe = Arc::new(ManualProbe::new(true));
        let ops = service(&probe);

        let outcome = ops
            .run(OperationKind::Auth, || async {
                Err::<(), _>(Failure::new("socket closed"))
            })
            .await;

        let detail = outcome.failure().unwrap();
        assert_eq!(detail.class(), ErrorClass::Network);
        assert_eq!(detail.attempts, 2);
    }

    #[tokio::test]
    async fn test_started_service_redrives_on_reconnect() {
        let probe = Arc::new(ManualProbe::new(false));
        let ops = service(&probe);
        ops.start();
        ops.start();
        assert!(ops.is_running());

        let container = ops.container::<u32>("bucket count", OperationKind::Query, None);
        let op = operation_fn(|| async { Ok::<_, Failure>(7) });
        container.execute_shared(Arc::clone(&op)).await;
        assert!(container.state().is_network_error());
        ops.watch(&container, op);

        probe.set_reachable(true);
        let recovered = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if container.state().phase == Phase::Success {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(recovered.is_ok());
        assert_eq!(container.state().data, Some(7));

        ops.shutdown();
        assert!(!ops.is_running());
    }
}
