//! Drain behavior of a running server.
//!
//! The deadline arithmetic itself is covered with a paused clock in the
//! coordinator's unit tests; these use short real timeouts against real
//! sockets.

use std::time::{Duration, Instant};

use ncrelay_core::DrainOutcome;
use ncrelay_harness::{MarkerBackend, TestServer};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_idle_server_stops_without_waiting_for_timeout() {
    let server = TestServer::new(MarkerBackend::new())
        .unwrap()
        .shutdown_timeout(Duration::from_secs(120))
        .start()
        .await
        .unwrap();

    let start = Instant::now();
    assert_eq!(server.shutdown().await.unwrap(), DrainOutcome::Graceful);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_drain_waits_for_open_sessions() {
    let mut server = TestServer::new(MarkerBackend::new())
        .unwrap()
        .shutdown_timeout(Duration::from_secs(30))
        .start()
        .await
        .unwrap();

    let mut client = server.connect().await.unwrap();
    assert!(server.wait_for_active(1, WAIT).await);

    server.trigger_shutdown();

    // Still served while the drain is waiting
    for fill in 0..3u8 {
        let frame = client.frame(fill);
        let output = client.roundtrip(&frame).await.unwrap();
        assert_eq!(output[2..], frame[2..]);
    }

    client.finish().await.unwrap();
    assert!(client.closed_within(WAIT).await);

    let start = Instant::now();
    assert_eq!(server.join().await.unwrap(), DrainOutcome::Graceful);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_stuck_session_forces_stop_at_deadline() {
    let timeout = Duration::from_millis(300);
    let server = TestServer::new(MarkerBackend::new())
        .unwrap()
        .shutdown_timeout(timeout)
        .start()
        .await
        .unwrap();

    // Connected but never completes a frame
    let mut stuck = server.connect().await.unwrap();
    stuck.send_bytes(&[1, 2, 3]).await.unwrap();
    assert!(server.wait_for_active(1, WAIT).await);

    let start = Instant::now();
    let outcome = server.shutdown().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(outcome, DrainOutcome::Forced { abandoned: 1 });
    assert!(elapsed >= timeout, "stopped early: {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_secs(2), "stopped late: {elapsed:?}");
}

#[tokio::test]
async fn test_closed_listener_refuses_new_connections() {
    let mut server = TestServer::new(MarkerBackend::new())
        .unwrap()
        .shutdown_timeout(Duration::from_secs(30))
        .start()
        .await
        .unwrap();
    let addr = server.addr();

    let mut existing = server.connect().await.unwrap();
    assert!(server.wait_for_active(1, WAIT).await);

    server.trigger_shutdown();

    let refused = tokio::time::timeout(WAIT, async {
        loop {
            match tokio::net::TcpStream::connect(addr).await {
                Err(_) => break,
                // Raced the close; hang up so the session ends on its own
                Ok(stream) => drop(stream),
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(refused.is_ok(), "listener kept accepting after close");

    let frame = existing.frame(4);
    let output = existing.roundtrip(&frame).await.unwrap();
    assert_eq!(output[2..], frame[2..]);

    drop(existing);
    assert_eq!(server.join().await.unwrap(), DrainOutcome::Graceful);
}
