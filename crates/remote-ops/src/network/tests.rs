//! Network module tests

use super::*;
use crate::config::ProberConfig;
use crate::execution::{AttemptError, Failure};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prober_with(probe: Arc<ManualProbe>, interface: Option<bool>) -> ConnectivityProber {
    let config = ProberConfig {
        probe_timeout_ms: 100,
        interval_ms: 20,
        ..Default::default()
    };
    ConnectivityProber::new(
        config,
        probe,
        interface.map(|up| Arc::new(FixedInterfaceSignal(Some(up))) as Arc<dyn InterfaceSignal>),
    )
}

#[test]
fn test_timeout_error_display() {
    let err = TimeoutError { timeout_ms: 5000 };
    assert!(err.to_string().contains("5000"));
}

#[tokio::test]
async fn test_run_with_deadline_success() {
    let result = run_with_deadline(async { Ok::<_, Failure>(42) }, 1000).await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test]
async fn test_run_with_deadline_propagates_failure_unchanged() {
    let result = run_with_deadline(
        async { Err::<i32, _>(Failure::named("AuthApiError", "Invalid login credentials")) },
        1000,
    )
    .await;

    match result {
        Err(AttemptError::Operation(failure)) => {
            assert_eq!(failure.name.as_deref(), Some("AuthApiError"));
            assert_eq!(failure.message, "Invalid login credentials");
        }
        other => panic!("expected operation failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_with_deadline_times_out() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&finished);

    let result = run_with_deadline(
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, Failure>(1)
        },
        10,
    )
    .await;

    match result {
        Err(AttemptError::Deadline(err)) => assert_eq!(err.timeout_ms, 10),
        other => panic!("expected deadline, got {:?}", other),
    }

    // the losing operation is dropped, its result can never surface
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(!finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_run_with_deadline_or_cancel_aborts() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        trigger.cancel();
    });

    let result = run_with_deadline_or_cancel(
        async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Failure>(())
        },
        10_000,
        &token,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_cancelable_delay() {
    assert!(cancelable_delay(Duration::from_millis(5), None).await.is_ok());

    let token = CancellationToken::new();
    token.cancel();
    assert!(cancelable_delay(Duration::from_secs(5), Some(&token))
        .await
        .is_err());
}

#[tokio::test]
async fn test_http_probe_any_response_is_reachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    let probe = HttpReachabilityProbe::new(server.uri(), Duration::from_secs(3)).unwrap();
    assert!(probe.probe().await.is_ok());
}

#[tokio::test]
async fn test_http_probe_unreachable() {
    // nothing listens on the discard port of localhost
    let probe = HttpReachabilityProbe::new("http://127.0.0.1:9", Duration::from_secs(3)).unwrap();
    assert!(matches!(
        probe.probe().await,
        Err(ProbeError::Unreachable(_))
    ));
}

#[tokio::test]
async fn test_check_now_reports_reachable() {
    let probe = Arc::new(ManualProbe::new(true));
    let prober = prober_with(Arc::clone(&probe), None);

    let status = prober.check_now().await;
    assert!(status.is_connected);
    assert!(!status.is_checking);
    assert!(status.last_checked_at.is_some());
    assert_eq!(probe.calls(), 1);
}

#[tokio::test]
async fn test_check_now_falls_back_to_interface_signal() {
    let probe = Arc::new(ManualProbe::new(false));

    let with_interface = prober_with(Arc::clone(&probe), Some(true));
    assert!(with_interface.check_now().await.is_connected);

    let without_interface = prober_with(Arc::clone(&probe), None);
    let status = without_interface.check_now().await;
    assert!(!status.is_connected);
    // unreachable outcomes still stamp the check time
    assert!(status.last_checked_at.is_some());
}

#[tokio::test]
async fn test_probe_sub_timeout_counts_as_unreachable() {
    let probe = Arc::new(ManualProbe::new(true));
    probe.set_delay(Duration::from_millis(500));
    let prober = prober_with(Arc::clone(&probe), Some(false));

    let status = prober.check_now().await;
    assert!(!status.is_connected);
}

#[tokio::test]
async fn test_concurrent_checks_coalesce() {
    let probe = Arc::new(ManualProbe::new(true));
    probe.set_delay(Duration::from_millis(30));
    let prober = prober_with(Arc::clone(&probe), None);

    let (a, b, c) = tokio::join!(prober.check_now(), prober.check_now(), prober.check_now());
    assert_eq!(probe.calls(), 1);
    assert_eq!(a, b);
    assert_eq!(b, c);

    prober.check_now().await;
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn test_is_checking_while_in_flight() {
    let probe = Arc::new(ManualProbe::new(true));
    probe.set_delay(Duration::from_millis(50));
    let prober = prober_with(Arc::clone(&probe), None);

    let background = prober.clone();
    let handle = tokio::spawn(async move { background.check_now().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(prober.is_checking());

    handle.await.unwrap();
    assert!(!prober.is_checking());
}

#[tokio::test]
async fn test_probe_completes_after_waiter_is_dropped() {
    let probe = Arc::new(ManualProbe::new(true));
    probe.set_delay(Duration::from_millis(50));
    let prober = prober_with(Arc::clone(&probe), None);

    let abandoned = tokio::time::timeout(Duration::from_millis(5), prober.check_now()).await;
    assert!(abandoned.is_err());
    assert!(prober.is_checking());

    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = prober.status();
    assert!(!status.is_checking);
    assert!(status.is_connected);
    assert!(status.last_checked_at.is_some());
    assert_eq!(probe.calls(), 1);

    // slot was released, so the next check probes again
    prober.check_now().await;
    assert_eq!(probe.calls(), 2);
}

#[tokio::test]
async fn test_subscribers_see_status_changes() {
    let probe = Arc::new(ManualProbe::new(false));
    let prober = prober_with(Arc::clone(&probe), None);
    let mut events = prober.subscribe();

    prober.check_now().await;

    let checking = events.recv().await.unwrap();
    assert!(checking.is_checking);
    let done = events.recv().await.unwrap();
    assert!(!done.is_checking);
    assert!(!done.is_connected);
}

#[tokio::test]
async fn test_monitor_probes_periodically() {
    let probe = Arc::new(ManualProbe::new(true));
    let prober = prober_with(Arc::clone(&probe), None);
    let token = CancellationToken::new();

    let handle = prober.spawn_monitor(token.clone());
    tokio::time::sleep(Duration::from_millis(70)).await;
    token.cancel();
    handle.await.unwrap();

    let calls = probe.calls();
    assert!(calls >= 2, "expected periodic probes, got {}", calls);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), calls);
}

#[tokio::test]
async fn test_socket_interface_signal_reports_loopback_route() {
    let signal = SocketInterfaceSignal::new(std::net::SocketAddr::from(([127, 0, 0, 1], 9)));
    assert_eq!(signal.interface_up().await, Some(true));
}

#[tokio::test]
async fn test_from_config_builds_http_prober() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let config = ProberConfig {
        probe_url: server.uri(),
        probe_timeout_ms: 1000,
        ..Default::default()
    };
    let prober = ConnectivityProber::from_config(config).unwrap();
    assert_eq!(prober.config().probe_url, server.uri());
    assert!(prober.status().last_checked_at.is_none());

    let status = prober.check_now().await;
    assert!(status.is_connected);
    assert!(status.last_checked_at.is_some());
}
