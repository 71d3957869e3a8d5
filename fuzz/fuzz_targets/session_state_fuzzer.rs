//! Fuzz target for the SessionMachine
//!
//! Drive random step sequences and compare against a reference model.
//!
//! # Invariants
//!
//! - Only Reading → Processing → Writing → Reading is ever accepted
//! - A rejected step leaves the state and counters untouched
//! - Closed is terminal and keeps the first reason
//! - bytes_in / bytes_out are always whole frames

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ncrelay_core::{CloseReason, SessionMachine, SessionState};

#[derive(Debug, Clone, Arbitrary)]
enum Step {
    Received { len: u16 },
    Processed { len: u16 },
    Written,
    Close { graceful: bool },
}

#[derive(Debug, Arbitrary)]
struct Input {
    frame_bytes: u16,
    steps: Vec<Step>,
}

fuzz_target!(|input: Input| {
    let frame_bytes = usize::from(input.frame_bytes.max(1));
    let mut machine = SessionMachine::new(frame_bytes);
    let mut first_reason: Option<CloseReason> = None;

    for step in input.steps {
        let before = machine.state();
        let stats_before = machine.stats();

        let (accepted, expected_next) = match step {
            Step::Received { len } => (
                machine.frame_received(usize::from(len)).is_ok(),
                SessionState::Processing,
            ),
            Step::Processed { len } => (
                machine.frame_processed(usize::from(len)).is_ok(),
                SessionState::Writing,
            ),
            Step::Written => (machine.frame_written().is_ok(), SessionState::Reading),
            Step::Close { graceful } => {
                let reason = if graceful {
                    CloseReason::PeerClosed
                } else {
                    CloseReason::ReadFailed("reset".to_string())
                };
                let first = machine.close(reason.clone());
                assert_eq!(first, first_reason.is_none(), "close must report first call only");
                if first {
                    first_reason = Some(reason);
                }
                assert!(machine.is_closed());
                assert_eq!(machine.close_reason(), first_reason.as_ref());
                continue;
            },
        };

        if accepted {
            let legal = matches!(
                (before, expected_next),
                (SessionState::Reading, SessionState::Processing)
                    | (SessionState::Processing, SessionState::Writing)
                    | (SessionState::Writing, SessionState::Reading)
            );
            assert!(legal, "illegal transition {before:?} -> {expected_next:?} accepted");
            assert_eq!(machine.state(), expected_next);
        } else {
            assert_eq!(machine.state(), before, "rejected step changed state");
            assert_eq!(machine.stats(), stats_before, "rejected step changed counters");
        }

        let stats = machine.stats();
        assert_eq!(stats.bytes_out, stats.frames * frame_bytes as u64);
        assert_eq!(stats.bytes_in % frame_bytes as u64, 0);
        assert!(stats.bytes_in >= stats.bytes_out);
    }
});
