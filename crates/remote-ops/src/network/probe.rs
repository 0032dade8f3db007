//! Reachability probes
//!
//! A probe is a minimal, side-effect-free request used only to decide
//! whether the network is usable. The interface signal is the weaker
//! fallback consulted when the probe itself fails.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Default reachability endpoint, answers HEAD with an empty 204
pub const DEFAULT_PROBE_URL: &str = "https://clients3.google.com/generate_204";

/// Reachability probe failure
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("Probe timed out after {0}ms")]
    Timeout(u64),
}

/// A lightweight reachability check
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Succeeds when the remote side answered at all
    async fn probe(&self) -> Result<(), ProbeError>;

    /// Short name used in logs
    fn name(&self) -> &str {
        "probe"
    }
}

/// HEAD request against a stable endpoint.
///
/// Any HTTP response counts as reachable: a 405 or 404 still proves the
/// packets made the round trip.
pub struct HttpReachabilityProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpReachabilityProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReachabilityProbe for HttpReachabilityProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        match self.client.head(&self.url).send().await {
            Ok(_) => Ok(()),
            Err(e) => Err(ProbeError::Unreachable(e.to_string())),
        }
    }

    fn name(&self) -> &str {
        &self.url
    }
}

/// Probe whose answer is set by the caller.
///
/// Used to force an offline mode and to substitute the network in tests.
#[derive(Debug)]
pub struct ManualProbe {
    reachable: AtomicBool,
    delay_ms: AtomicU64,
    calls: AtomicU32,
}

impl ManualProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            delay_ms: AtomicU64::new(0),
            calls: AtomicU32::new(0),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make every probe take `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of probes issued so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReachabilityProbe for ManualProbe {
    async fn probe(&self) -> Result<(), ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProbeError::Unreachable("manually offline".to_string()))
        }
    }

    fn name(&self) -> &str {
        "manual"
    }
}

/// Platform-reported "interface up" signal
#[async_trait]
pub trait InterfaceSignal: Send + Sync {
    /// `None` when the platform cannot tell
    async fn interface_up(&self) -> Option<bool>;
}

/// Fixed interface answer
#[derive(Debug, Clone, Copy)]
pub struct FixedInterfaceSignal(pub Option<bool>);

#[async_trait]
impl InterfaceSignal for FixedInterfaceSignal {
    async fn interface_up(&self) -> Option<bool> {
        self.0
    }
}

/// Asks the OS for a route without sending any packets.
///
/// Connecting a UDP socket only performs route selection, so success means
/// some interface is up with a route towards `target`.
pub struct SocketInterfaceSignal {
    target: SocketAddr,
}

impl SocketInterfaceSignal {
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for SocketInterfaceSignal {
    fn default() -> Self {
        Self::new(SocketAddr::from(([1, 1, 1, 1], 53)))
    }
}

#[async_trait]
impl InterfaceSignal for SocketInterfaceSignal {
    async fn interface_up(&self) -> Option<bool> {
        let bind_addr: SocketAddr = if self.target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::debug!(error = %e, "interface signal unavailable");
                return None;
            }
        };
        Some(socket.connect(self.target).await.is_ok())
    }
}
