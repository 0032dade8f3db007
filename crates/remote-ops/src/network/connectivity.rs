//! Connectivity prober
//!
//! Owns the single [`ConnectivityStatus`]. Everything else reads it.
//! Concurrent `check_now()` calls join the probe already in flight instead
//! of issuing their own. The probe runs as its own task, so it lands even
//! when every waiter has gone away.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::probe::{
    HttpReachabilityProbe, InterfaceSignal, ProbeError, ReachabilityProbe, SocketInterfaceSignal,
};
use crate::config::ProberConfig;

/// Online/offline read model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityStatus {
    pub is_connected: bool,
    pub is_checking: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Default for ConnectivityStatus {
    /// Optimistic until the first probe lands
    fn default() -> Self {
        Self {
            is_connected: true,
            is_checking: false,
            last_checked_at: None,
        }
    }
}

type InFlightProbe = Shared<BoxFuture<'static, ConnectivityStatus>>;

struct ProberInner {
    config: ProberConfig,
    probe: Arc<dyn ReachabilityProbe>,
    interface: Option<Arc<dyn InterfaceSignal>>,
    status: RwLock<ConnectivityStatus>,
    in_flight: Mutex<Option<InFlightProbe>>,
    event_tx: broadcast::Sender<ConnectivityStatus>,
}

impl ProberInner {
    async fn run_probe(self: Arc<Self>) -> ConnectivityStatus {
        let probe_timeout = Duration::from_millis(self.config.probe_timeout_ms);
        let reachable = match timeout(probe_timeout, self.probe.probe()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(probe = self.probe.name(), error = %e, "reachability probe failed");
                self.interface_fallback().await
            }
            Err(_) => {
                let e = ProbeError::Timeout(self.config.probe_timeout_ms);
                tracing::debug!(probe = self.probe.name(), error = %e, "reachability probe failed");
                self.interface_fallback().await
            }
        };

        let status = {
            let mut status = self.status.write();
            let was_connected = status.is_connected;
            status.is_connected = reachable;
            status.is_checking = false;
            status.last_checked_at = Some(Utc::now());
            if was_connected != reachable {
                tracing::info!(connected = reachable, "connectivity changed");
            }
            *status
        };

        // Clear before publishing so subscribers reacting to the event start a fresh probe
        self.in_flight.lock().take();
        let _ = self.event_tx.send(status);
        status
    }

    /// Settle the status after the probe task died without reporting
    fn abandon_probe(&self) -> ConnectivityStatus {
        let status = {
            let mut status = self.status.write();
            status.is_checking = false;
            status.last_checked_at = Some(Utc::now());
            *status
        };
        self.in_flight.lock().take();
        let _ = self.event_tx.send(status);
        status
    }

    async fn interface_fallback(&self) -> bool {
        if !self.config.interface_fallback {
            return false;
        }
        match &self.interface {
            Some(signal) => signal.interface_up().await.unwrap_or(false),
            None => false,
        }
    }
}

/// Connectivity prober handle; clones share one status
#[derive(Clone)]
pub struct ConnectivityProber {
    inner: Arc<ProberInner>,
}

impl std::fmt::Debug for ConnectivityProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityProber")
            .field("config", &self.inner.config)
            .field("status", &*self.inner.status.read())
            .finish()
    }
}

impl ConnectivityProber {
    /// Build a prober with an explicit probe and optional interface signal
    pub fn new(
        config: ProberConfig,
        probe: Arc<dyn ReachabilityProbe>,
        interface: Option<Arc<dyn InterfaceSignal>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(ProberInner {
                config,
                probe,
                interface,
                status: RwLock::new(ConnectivityStatus::default()),
                in_flight: Mutex::new(None),
                event_tx,
            }),
        }
    }

    /// HTTP HEAD probe against `config.probe_url` with the socket interface fallback
    pub fn from_config(config: ProberConfig) -> Result<Self, ProbeError> {
        let probe = HttpReachabilityProbe::new(
            config.probe_url.clone(),
            Duration::from_millis(config.probe_timeout_ms),
        )?;
        Ok(Self::new(
            config,
            Arc::new(probe),
            Some(Arc::new(SocketInterfaceSignal::default())),
        ))
    }

    pub fn config(&self) -> &ProberConfig {
        &self.inner.config
    }

    /// Probe now, or join the probe already in flight. Never fails.
    pub async fn check_now(&self) -> ConnectivityStatus {
        let probe = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let checking = {
                        let mut status = self.inner.status.write();
                        status.is_checking = true;
                        *status
                    };
                    let _ = self.inner.event_tx.send(checking);

                    // The task clears `in_flight` under this same lock, so it
                    // cannot finish before the slot is filled.
                    let task = tokio::spawn(Arc::clone(&self.inner).run_probe());
                    let inner = Arc::clone(&self.inner);
                    let fresh = async move {
                        match task.await {
                            Ok(status) => status,
                            Err(e) => {
                                tracing::warn!(error = %e, "connectivity probe task failed");
                                inner.abandon_probe()
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };
        probe.await
    }

    /// Snapshot of the current status
    pub fn status(&self) -> ConnectivityStatus {
        *self.inner.status.read()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status.read().is_connected
    }

    pub fn is_checking(&self) -> bool {
        self.inner.status.read().is_checking
    }

    /// Every status change, including `is_checking` flips
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityStatus> {
        self.inner.event_tx.subscribe()
    }

    /// Probe on a fixed interval until `cancel_token` fires. The first tick is immediate.
    pub fn spawn_monitor(&self, cancel_token: CancellationToken) -> JoinHandle<()> {
        let prober = self.clone();
        let period = Duration::from_millis(self.inner.config.interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        tracing::debug!("connectivity monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        prober.check_now().await;
                    }
                }
            }
        })
    }
}
