//! Production Environment implementation using the Tokio clock.
//!
//! `SystemEnv` reads time from `tokio::time::Instant` rather than
//! `std::time::Instant`. In production the two agree; under a paused test
//! runtime the Tokio clock is virtual, which lets drain deadlines be asserted
//! to the exact tick.

use std::time::Duration;

use ncrelay_core::env::Environment;

/// Production environment backed by the Tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
