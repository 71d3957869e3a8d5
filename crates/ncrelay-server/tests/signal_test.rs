//! Termination signals delivered to the running process.
//!
//! Every test installs handlers before raising anything, so SIGTERM never
//! reaches its default disposition in this binary.

#![cfg(unix)]

use std::time::Duration;

use ncrelay_core::{DrainOutcome, EngineConfig};
use ncrelay_harness::MarkerBackend;
use ncrelay_server::{RelayConfig, Server, TerminationSignals};
use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};

const WAIT: Duration = Duration::from_secs(5);

fn raise_sigterm() {
    kill(Pid::this(), Signal::SIGTERM).unwrap();
}

#[tokio::test]
async fn test_sigterm_wakes_receiver_and_repeats_are_absorbed() {
    let mut signals = TerminationSignals::install().unwrap();

    raise_sigterm();
    tokio::time::timeout(WAIT, signals.recv()).await.unwrap();

    // A second signal mid-drain must not kill the process
    raise_sigterm();
    tokio::time::sleep(Duration::from_millis(100)).await;
    raise_sigterm();
    tokio::time::timeout(WAIT, signals.recv()).await.unwrap();
}

#[tokio::test]
async fn test_sigterm_drains_idle_server_gracefully() {
    let _keep_installed = TerminationSignals::install().unwrap();

    let model = tempfile::NamedTempFile::new().unwrap();
    let config = RelayConfig::new("127.0.0.1:0", EngineConfig::new(model.path()));
    let server = Server::bind(config, std::sync::Arc::new(MarkerBackend::new())).await.unwrap();
    let mut running = tokio::spawn(server.run());

    // The server installs its own handlers once polled; keep signalling until
    // it has seen one
    let outcome = tokio::time::timeout(WAIT, async {
        loop {
            raise_sigterm();
            tokio::select! {
                joined = &mut running => break joined,
                () = tokio::time::sleep(Duration::from_millis(50)) => {},
            }
        }
    })
    .await
    .unwrap()
    .unwrap()
    .unwrap();

    assert_eq!(outcome, DrainOutcome::Graceful);
}
