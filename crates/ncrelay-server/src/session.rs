//! Per-connection session task.
//!
//! One task per accepted stream owns the socket, the engine, and the frame
//! buffers. The task walks the [`SessionMachine`] through read → process →
//! write until the peer hangs up or any step fails, so at most one frame of a
//! session is in flight at a time and engine calls on one instance never
//! overlap.
//!
//! With [`EngineDispatch::Offload`] the engine and both buffers move onto the
//! blocking pool for each call and come back with the result.

use std::{io, sync::Arc};

use bytes::BytesMut;
use ncrelay_core::{
    CloseReason, ConnectionGuard, EngineBackend, EngineError, FrameProcessor, NoiseEngine,
    SessionMachine,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    task,
};

use crate::config::{EngineDispatch, SessionSettings};

/// Result of filling the input buffer.
#[derive(Debug)]
enum ReadOutcome {
    /// A complete frame is in the buffer
    Frame,
    /// Peer closed on a frame boundary
    Eof,
    /// Peer closed after this many bytes of a frame
    Truncated(usize),
    /// Socket error
    Failed(io::Error),
}

/// Run one session to completion.
///
/// The guard is released exactly once when the session closes, whatever the
/// reason.
pub(crate) async fn run<B: EngineBackend>(
    stream: TcpStream,
    guard: ConnectionGuard,
    backend: Arc<B>,
    settings: Arc<SessionSettings>,
) {
    let peer = stream.peer_addr().map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());

    let created = match settings.dispatch {
        EngineDispatch::Inline => backend.create(&settings.engine),
        EngineDispatch::Offload => {
            let settings = Arc::clone(&settings);
            let backend = Arc::clone(&backend);
            task::spawn_blocking(move || backend.create(&settings.engine))
                .await
                .unwrap_or_else(|e| Err(EngineError::Create(format!("constructor panicked: {e}"))))
        },
    };

    let spec = settings.engine.frame_spec();
    let mut session = Session::new(stream, peer, guard, spec.frame_bytes(), settings.dispatch);

    match created {
        Ok(engine) => {
            session.processor = Some(FrameProcessor::new(
                engine,
                spec,
                settings.suppression,
                settings.engine.stats_enabled,
            ));
            tracing::debug!("Session {} ready ({})", session.peer, spec);
            let reason = session.serve().await;
            session.close(reason);
        },
        Err(e) => session.close(CloseReason::EngineFailed(e.to_string())),
    }
}

struct Session<E: NoiseEngine> {
    stream: TcpStream,
    peer: String,
    processor: Option<FrameProcessor<E>>,
    input: BytesMut,
    output: BytesMut,
    machine: SessionMachine,
    guard: ConnectionGuard,
    dispatch: EngineDispatch,
}

impl<E: NoiseEngine> Session<E> {
    fn new(
        stream: TcpStream,
        peer: String,
        guard: ConnectionGuard,
        frame_bytes: usize,
        dispatch: EngineDispatch,
    ) -> Self {
        Self {
            stream,
            peer,
            processor: None,
            input: BytesMut::zeroed(frame_bytes),
            output: BytesMut::zeroed(frame_bytes),
            machine: SessionMachine::new(frame_bytes),
            guard,
            dispatch,
        }
    }

    /// Cycle frames until something ends the session.
    async fn serve(&mut self) -> CloseReason {
        loop {
            match self.read_frame().await {
                ReadOutcome::Frame => {},
                ReadOutcome::Eof => return CloseReason::PeerClosed,
                ReadOutcome::Truncated(received) => {
                    return CloseReason::Truncated { received, expected: self.machine.frame_bytes() };
                },
                ReadOutcome::Failed(e) => return CloseReason::ReadFailed(e.to_string()),
            }

            let len = self.input.len();
            if let Err(e) = self.machine.frame_received(len) {
                return CloseReason::Internal(e.to_string());
            }

            if let Err(reason) = self.process().await {
                return reason;
            }

            if let Err(e) = self.machine.frame_processed(self.output.len()) {
                return CloseReason::Internal(e.to_string());
            }

            if let Err(e) = self.stream.write_all(&self.output).await {
                return CloseReason::WriteFailed(e.to_string());
            }

            if let Err(e) = self.machine.frame_written() {
                return CloseReason::Internal(e.to_string());
            }
        }
    }

    /// Fill the input buffer with exactly one frame.
    async fn read_frame(&mut self) -> ReadOutcome {
        let mut filled = 0;
        while filled < self.input.len() {
            match self.stream.read(&mut self.input[filled..]).await {
                Ok(0) if filled == 0 => return ReadOutcome::Eof,
                Ok(0) => return ReadOutcome::Truncated(filled),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
        ReadOutcome::Frame
    }

    /// Run the input frame through the engine into the output buffer.
    async fn process(&mut self) -> Result<(), CloseReason> {
        match self.dispatch {
            EngineDispatch::Inline => {
                let processor = self.processor.as_mut().ok_or_else(missing_engine)?;
                processor
                    .process_frames(&self.input, &mut self.output)
                    .map(|_| ())
                    .map_err(|e| CloseReason::EngineFailed(e.to_string()))
            },
            EngineDispatch::Offload => {
                let mut processor = self.processor.take().ok_or_else(missing_engine)?;
                let input = std::mem::take(&mut self.input);
                let mut output = std::mem::take(&mut self.output);

                let joined = task::spawn_blocking(move || {
                    let result = processor.process_frames(&input, &mut output);
                    (processor, input, output, result)
                })
                .await;

                let (processor, input, output, result) = joined.map_err(|e| {
                    CloseReason::EngineFailed(format!("engine call did not complete: {e}"))
                })?;

                self.processor = Some(processor);
                self.input = input;
                self.output = output;
                result.map(|_| ()).map_err(|e| CloseReason::EngineFailed(e.to_string()))
            },
        }
    }

    /// Close the session, destroy its engine, and release its slot.
    fn close(&mut self, reason: CloseReason) {
        if !self.machine.close(reason.clone()) {
            return;
        }

        let energy = self.processor.take().and_then(|p| p.energy());
        let Some(snapshot) = self.guard.release() else {
            return;
        };
        let stats = self.machine.stats();

        if reason.is_graceful() {
            tracing::info!(
                peer = %self.peer,
                active = snapshot.active,
                total = snapshot.total,
                frames = stats.frames,
                bytes_in = stats.bytes_in,
                bytes_out = stats.bytes_out,
                "Session {}",
                reason
            );
        } else {
            tracing::error!(
                peer = %self.peer,
                active = snapshot.active,
                total = snapshot.total,
                frames = stats.frames,
                "Session closed: {}",
                reason
            );
        }

        if let Some(energy) = energy {
            tracing::info!(
                peer = %self.peer,
                frames = energy.frames,
                "Average energy: voice {:.1}, noise {:.1}",
                energy.mean_voice,
                energy.mean_noise
            );
        }
    }
}

fn missing_engine() -> CloseReason {
    CloseReason::Internal("engine not available".to_string())
}
