//! Core logic of the noise-cancellation relay.
//!
//! Everything here is free of network I/O so it can be tested without
//! sockets. The server crate wraps these pieces with Tokio.
//!
//! # Components
//!
//! - [`FrameSpec`]: frame geometry shared out of band by both peers
//! - [`NoiseEngine`] / [`EngineBackend`]: the opaque engine as a capability
//! - [`FrameProcessor`]: validated frame batches through one engine
//! - [`SessionMachine`]: read → process → write cycle of one connection
//! - [`ConnectionRegistry`]: atomic admission counters
//! - [`DrainPlan`]: deadline-bounded shutdown decisions
//! - [`Environment`]: clock abstraction for deterministic tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audio;
pub mod engine;
pub mod env;
pub mod error;
pub mod processor;
pub mod registry;
pub mod session;
pub mod shutdown;

pub use audio::{FrameDuration, FrameSpec, SampleFormat, SampleRate};
pub use engine::{
    BackendGuard, BypassBackend, BypassEngine, EngineBackend, EngineConfig, FrameStats,
    NoiseEngine, SuppressionLevel, TrackedBackend, TrackedEngine,
};
pub use env::Environment;
pub use error::{ConfigError, EngineError, FrameError, SessionError};
pub use processor::{EnergySummary, FrameProcessor};
pub use registry::{AdmissionDenied, ConnectionGuard, ConnectionRegistry, RegistrySnapshot};
pub use session::{CloseReason, SessionMachine, SessionState, SessionStats};
pub use shutdown::{
    DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT, DrainDecision, DrainOutcome, DrainPlan,
};
