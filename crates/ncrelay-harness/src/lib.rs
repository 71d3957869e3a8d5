//! Test harness for the noise-cancellation relay.
//!
//! Stub engines with observable behavior, an async frame client, and a
//! fixture that runs a real [`ncrelay_server::Server`] on a loopback port.
//!
//! # Stub engines
//!
//! - [`MarkerBackend`]: stamps every output frame with a per-session marker,
//!   so cross-talk between sessions is visible
//! - [`FailingBackend`]: fails construction or fails on poisoned frames
//! - [`SlowBackend`]: blocks the calling thread on trigger frames

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod engines;
pub mod fixture;

pub use client::FrameClient;
pub use engines::{
    EngineCounters, FailingBackend, MarkerBackend, POISON_BYTE, SLOW_BYTE, SlowBackend,
};
pub use fixture::{RunningServer, TestServer};
