//! Error types for the relay core.
//!
//! Strongly-typed errors per layer: configuration (rejected before the server
//! starts), engine (construction and per-frame processing), frame validation
//! (batch sizing), and session state transitions.

use thiserror::Error;

use crate::session::SessionState;

/// Invalid configuration values.
///
/// Fatal at startup. Fix the configuration and restart.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Suppression level outside `0.0..=100.0` (or NaN)
    #[error("noise suppression level must be between 0 and 100, got {0}")]
    SuppressionOutOfRange(f32),

    /// Sample rate the engine does not support
    #[error("unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Frame duration the engine does not support
    #[error("unsupported frame duration: {0} ms")]
    UnsupportedFrameDuration(u32),

    /// Model path was empty
    #[error("model path cannot be empty")]
    EmptyModelPath,

    /// Output rate differs from input rate
    #[error("output rate {output} Hz must equal input rate {input} Hz")]
    RateMismatch {
        /// Configured input rate
        input: u32,
        /// Configured output rate
        output: u32,
    },

    /// Connection limit of zero would reject every connection
    #[error("max connections must be at least 1")]
    ZeroConnectionLimit,

    /// Drain polling interval of zero would spin
    #[error("shutdown poll interval must be non-zero")]
    ZeroPollInterval,
}

/// Errors reported by a noise-cancellation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Global engine initialization failed
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// The model could not be loaded
    #[error("failed to load model '{path}': {reason}")]
    ModelLoad {
        /// Model reference that failed
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Engine rejected its configuration
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Engine construction failed for another reason
    #[error("engine construction failed: {0}")]
    Create(String),

    /// Buffer does not match the configured frame size
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize {
        /// Configured frame size in bytes
        expected: usize,
        /// Size actually passed
        actual: usize,
    },

    /// Processing a frame failed
    #[error("frame processing failed: {0}")]
    Process(String),
}

/// Errors from validating and processing a batch of frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Input and output buffers differ in length
    #[error("input ({input} bytes) and output ({output} bytes) must have the same length")]
    LengthMismatch {
        /// Input length
        input: usize,
        /// Output length
        output: usize,
    },

    /// Length is not a whole number of samples
    #[error("length {len} is not a multiple of the {sample_width}-byte sample width")]
    UnalignedSamples {
        /// Buffer length
        len: usize,
        /// Bytes per sample
        sample_width: usize,
    },

    /// Buffer holds less than one frame
    #[error("{len} bytes is too small for one {frame_bytes}-byte frame")]
    ShorterThanFrame {
        /// Buffer length
        len: usize,
        /// Bytes per frame
        frame_bytes: usize,
    },

    /// Buffer ends with an incomplete frame
    #[error("{trailing} trailing bytes do not form a complete {frame_bytes}-byte frame")]
    PartialTrailingFrame {
        /// Buffer length
        len: usize,
        /// Bytes per frame
        frame_bytes: usize,
        /// Bytes past the last complete frame
        trailing: usize,
    },

    /// The engine failed on one of the frames
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Errors from session state machine operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation not valid in the current state
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidTransition {
        /// State when the operation was attempted
        state: SessionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// A frame of the wrong size passed through the pipeline
    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize {
        /// Configured frame size
        expected: usize,
        /// Observed size
        actual: usize,
    },
}
