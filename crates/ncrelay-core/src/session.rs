//! Session state machine.
//!
//! Tracks where one connection is in its read → process → write cycle. This is
//! a pure state machine: no sockets, no engine. The server's session task
//! performs the I/O and reports each completed step here, which rejects
//! out-of-order steps and enforces the frame-length invariant.
//!
//! # State Machine
//!
//! ```text
//!              frame_received            frame_processed
//! ┌─────────┐ ───────────────> ┌────────────┐ ─────────────> ┌─────────┐
//! │ Reading │                  │ Processing │                │ Writing │
//! └─────────┘ <─────────────────────────────────────────────── └─────────┘
//!      │                     frame_written                          │
//!      │                          │                                 │
//!      └──────────── close ───────┴──────────── close ──────────────┘
//!                                 ↓
//!                            ┌────────┐
//!                            │ Closed │
//!                            └────────┘
//! ```

use std::fmt;

use crate::error::SessionError;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for a complete input frame
    Reading,
    /// Engine is transforming the frame
    Processing,
    /// Writing the output frame back
    Writing,
    /// Terminal
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the stream on a frame boundary
    PeerClosed,
    /// Peer closed the stream in the middle of a frame
    Truncated {
        /// Bytes of the incomplete frame that did arrive
        received: usize,
        /// Bytes a frame needs
        expected: usize,
    },
    /// Reading from the socket failed
    ReadFailed(String),
    /// Engine construction or processing failed
    EngineFailed(String),
    /// Writing to the socket failed
    WriteFailed(String),
    /// The pipeline violated its own invariants
    Internal(String),
}

impl CloseReason {
    /// `true` only for an orderly end of stream.
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::PeerClosed)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "closed by peer"),
            Self::Truncated { received, expected } => {
                write!(f, "stream ended mid-frame ({received} of {expected} bytes)")
            },
            Self::ReadFailed(msg) => write!(f, "read error: {msg}"),
            Self::EngineFailed(msg) => write!(f, "engine error: {msg}"),
            Self::WriteFailed(msg) => write!(f, "write error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// Per-session traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Complete read → process → write cycles
    pub frames: u64,
    /// Bytes read from the peer in complete frames
    pub bytes_in: u64,
    /// Bytes written back to the peer
    pub bytes_out: u64,
}

/// Read → process → write cycle of one connection.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    frame_bytes: usize,
    stats: SessionStats,
    close_reason: Option<CloseReason>,
}

impl SessionMachine {
    /// New session in [`SessionState::Reading`] for frames of `frame_bytes`.
    pub fn new(frame_bytes: usize) -> Self {
        Self {
            state: SessionState::Reading,
            frame_bytes,
            stats: SessionStats::default(),
            close_reason: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frame size this session was configured with.
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Traffic so far.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Reason recorded by the first [`close`](Self::close). `None` while open.
    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    fn expect(&self, state: SessionState, operation: &'static str) -> Result<(), SessionError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition { state: self.state, operation })
        }
    }

    fn check_len(&self, len: usize) -> Result<(), SessionError> {
        if len == self.frame_bytes {
            Ok(())
        } else {
            Err(SessionError::FrameSize { expected: self.frame_bytes, actual: len })
        }
    }

    /// A complete input frame of `len` bytes arrived.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidTransition` unless Reading
    /// - `SessionError::FrameSize` if `len` is not one frame
    pub fn frame_received(&mut self, len: usize) -> Result<(), SessionError> {
        self.expect(SessionState::Reading, "frame_received")?;
        self.check_len(len)?;

        self.stats.bytes_in += len as u64;
        self.state = SessionState::Processing;
        Ok(())
    }

    /// The engine produced an output frame of `len` bytes.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidTransition` unless Processing
    /// - `SessionError::FrameSize` if output and input lengths differ
    pub fn frame_processed(&mut self, len: usize) -> Result<(), SessionError> {
        self.expect(SessionState::Processing, "frame_processed")?;
        self.check_len(len)?;

        self.state = SessionState::Writing;
        Ok(())
    }

    /// The output frame was fully written.
    ///
    /// # Errors
    ///
    /// - `SessionError::InvalidTransition` unless Writing
    pub fn frame_written(&mut self) -> Result<(), SessionError> {
        self.expect(SessionState::Writing, "frame_written")?;

        self.stats.frames += 1;
        self.stats.bytes_out += self.frame_bytes as u64;
        self.state = SessionState::Reading;
        Ok(())
    }

    /// Enter [`SessionState::Closed`].
    ///
    /// Returns `true` on the first call only; later calls keep the original
    /// reason and return `false`.
    pub fn close(&mut self, reason: CloseReason) -> bool {
        if self.state == SessionState::Closed {
            return false;
        }
        self.state = SessionState::Closed;
        self.close_reason = Some(reason);
        true
    }

    /// Whether the session reached its terminal state.
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(machine: &mut SessionMachine) {
        let n = machine.frame_bytes();
        machine.frame_received(n).unwrap();
        machine.frame_processed(n).unwrap();
        machine.frame_written().unwrap();
    }

    #[test]
    fn full_cycle_returns_to_reading() {
        let mut machine = SessionMachine::new(640);
        assert_eq!(machine.state(), SessionState::Reading);

        machine.frame_received(640).unwrap();
        assert_eq!(machine.state(), SessionState::Processing);

        machine.frame_processed(640).unwrap();
        assert_eq!(machine.state(), SessionState::Writing);

        machine.frame_written().unwrap();
        assert_eq!(machine.state(), SessionState::Reading);
        assert_eq!(machine.stats(), SessionStats { frames: 1, bytes_in: 640, bytes_out: 640 });
    }

    #[test]
    fn counters_accumulate_over_cycles() {
        let mut machine = SessionMachine::new(160);
        for _ in 0..5 {
            cycle(&mut machine);
        }
        assert_eq!(machine.stats(), SessionStats { frames: 5, bytes_in: 800, bytes_out: 800 });
    }

    #[test]
    fn second_read_before_write_is_rejected() {
        let mut machine = SessionMachine::new(640);
        machine.frame_received(640).unwrap();

        let err = machine.frame_received(640).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                state: SessionState::Processing,
                operation: "frame_received"
            }
        );
        assert_eq!(machine.state(), SessionState::Processing);
    }

    #[test]
    fn write_without_processing_is_rejected() {
        let mut machine = SessionMachine::new(640);
        assert!(matches!(
            machine.frame_written(),
            Err(SessionError::InvalidTransition { state: SessionState::Reading, .. })
        ));
    }

    #[test]
    fn output_length_must_match_input() {
        let mut machine = SessionMachine::new(640);
        machine.frame_received(640).unwrap();

        let err = machine.frame_processed(320).unwrap_err();
        assert_eq!(err, SessionError::FrameSize { expected: 640, actual: 320 });
        assert_eq!(machine.state(), SessionState::Processing);
    }

    #[test]
    fn short_input_frame_is_rejected() {
        let mut machine = SessionMachine::new(640);
        let err = machine.frame_received(100).unwrap_err();
        assert_eq!(err, SessionError::FrameSize { expected: 640, actual: 100 });
        assert_eq!(machine.stats().bytes_in, 0);
    }

    #[test]
    fn close_from_every_state() {
        for steps in 0..3 {
            let mut machine = SessionMachine::new(4);
            if steps >= 1 {
                machine.frame_received(4).unwrap();
            }
            if steps >= 2 {
                machine.frame_processed(4).unwrap();
            }

            assert!(machine.close(CloseReason::PeerClosed));
            assert!(machine.is_closed());
        }
    }

    #[test]
    fn close_is_idempotent_and_keeps_first_reason() {
        let mut machine = SessionMachine::new(640);

        assert!(machine.close(CloseReason::WriteFailed("broken pipe".to_string())));
        assert!(!machine.close(CloseReason::PeerClosed));
        assert_eq!(
            machine.close_reason(),
            Some(&CloseReason::WriteFailed("broken pipe".to_string()))
        );
    }

    #[test]
    fn closed_session_accepts_no_frames() {
        let mut machine = SessionMachine::new(640);
        machine.close(CloseReason::PeerClosed);

        assert!(machine.frame_received(640).is_err());
        assert_eq!(machine.state(), SessionState::Closed);
    }

    #[test]
    fn only_peer_close_is_graceful() {
        assert!(CloseReason::PeerClosed.is_graceful());
        assert!(!CloseReason::Truncated { received: 10, expected: 640 }.is_graceful());
        assert!(!CloseReason::ReadFailed("reset".to_string()).is_graceful());
        assert!(!CloseReason::EngineFailed("boom".to_string()).is_graceful());
    }

    #[test]
    fn close_reason_display() {
        let reason = CloseReason::Truncated { received: 100, expected: 640 };
        assert_eq!(reason.to_string(), "stream ended mid-frame (100 of 640 bytes)");
        assert_eq!(CloseReason::PeerClosed.to_string(), "closed by peer");
    }
}
